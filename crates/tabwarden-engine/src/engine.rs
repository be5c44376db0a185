//! Engine instance: shared state, startup, and background run loops.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use tabwarden_db::workspace_repository::WorkspaceRepository;
use tabwarden_db::{Store, UNASSIGNED_WORKSPACE_ID};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::groups::GroupEvent;
use crate::host::HostClient;

/// The engine owns the store and a host adapter and serializes all tab
/// management behind a single instance. Methods take `&self`; the engine is
/// designed for a single-threaded async runtime where operations interleave
/// at await points but never run in parallel.
pub struct Engine {
    pub(crate) store: Store,
    pub(crate) host: Arc<dyn HostClient>,
    pub(crate) config: EngineConfig,
    pub(crate) reconciling: AtomicBool,
}

impl Engine {
    pub fn new(
        store: Store,
        host: Arc<dyn HostClient>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Validation)?;
        Ok(Self {
            store,
            host,
            config,
            reconciling: AtomicBool::new(false),
        })
    }

    /// Access to the underlying store, mainly for tests and tooling.
    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Bring the store up to date and converge against the live environment.
    /// Called once before any run loop starts.
    pub async fn startup(&self) -> Result<(), EngineError> {
        let applied = self.store.migrate_up()?;
        if applied > 0 {
            info!(applied, "applied store migrations");
        }

        let sync = self.sync_groups_at_startup().await?;
        info!(
            updated = sync.updated,
            created = sync.created,
            archived = sync.archived,
            "startup group sync complete"
        );

        if let Some(summary) = self.reconcile().await? {
            info!(
                updated = summary.updated,
                adopted = summary.adopted,
                created = summary.created,
                removed = summary.removed,
                deduped = summary.deduped,
                "startup reconcile complete"
            );
        }
        Ok(())
    }

    /// The workspace all record-level operations target when none is given:
    /// the active workspace, or the unassigned sentinel when there is none.
    pub(crate) fn target_workspace_id(&self) -> Result<i64, EngineError> {
        let workspaces = WorkspaceRepository::new(&self.store);
        let active = workspaces.active_workspace()?;
        Ok(active.map(|w| w.id).unwrap_or(UNASSIGNED_WORKSPACE_ID))
    }

    /// Whether a live tab URL is the permanently-open anchor surface. The
    /// anchor survives every teardown and cleaning pass.
    pub(crate) fn is_anchor_url(&self, url: &str) -> bool {
        url.starts_with(&self.config.anchor_url)
    }

    /// Reconcile on a fixed interval until `shutdown` flips to true or the
    /// sender side goes away.
    pub async fn run_periodic_reconcile(
        &self,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.reconcile().await {
                        warn!(error = %err, "periodic reconcile failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Single-consumer loop over live group lifecycle events. Event handling
    /// never overlaps; the loop ends when the sender side closes.
    pub async fn run_group_events(&self, mut events: mpsc::UnboundedReceiver<GroupEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(err) = self.handle_group_event(event).await {
                warn!(error = %err, "group event handling failed");
            }
        }
    }
}
