//! Reconciler: converges stored active tab records for the target workspace
//! against a fresh live enumeration.
//!
//! Matching runs in priority order: external id first, then URL adoption,
//! then new-record creation, then removal of records nothing matched, then a
//! duplicate-external-id sweep. Store writes are batched per step, so a
//! failure in a later step never undoes an earlier one.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use tabwarden_db::tab_repository::{NewTab, Tab, TabLiveFields, TabRepository};
use tabwarden_db::ItemStatus;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::host::LiveTab;

/// Per-step write counts of one reconcile pass. All zeros means the mirror
/// was already converged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Records whose live-side fields were refreshed via external id match.
    pub updated: usize,
    /// Records re-pointed at a live item through URL adoption.
    pub adopted: usize,
    /// Brand-new records for live items nothing matched.
    pub created: usize,
    /// Records deleted because no live item matched them.
    pub removed: usize,
    /// Duplicate records removed in the external-id sweep.
    pub deduped: usize,
}

impl ReconcileSummary {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// Clears the in-flight flag when a pass ends, error paths included.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    /// Run one reconcile pass. Re-entrant calls while a pass is in flight
    /// return `Ok(None)` without doing anything; overlapping passes would
    /// double-process the same diffs.
    pub async fn reconcile(&self) -> Result<Option<ReconcileSummary>, EngineError> {
        if self.reconciling.swap(true, Ordering::SeqCst) {
            debug!("reconcile already in flight, skipping");
            return Ok(None);
        }
        let _guard = InFlightGuard {
            flag: &self.reconciling,
        };
        let summary = self.reconcile_inner().await?;
        if !summary.is_noop() {
            debug!(
                updated = summary.updated,
                adopted = summary.adopted,
                created = summary.created,
                removed = summary.removed,
                deduped = summary.deduped,
                "reconcile pass applied changes"
            );
        }
        Ok(Some(summary))
    }

    async fn reconcile_inner(&self) -> Result<ReconcileSummary, EngineError> {
        let workspace_id = self.target_workspace_id()?;
        // The anchor surface is engine UI, not workspace content; it never
        // enters the mirror.
        let live: Vec<LiveTab> = self
            .host
            .list_tabs()
            .await?
            .into_iter()
            .filter(|tab| !self.is_anchor_url(&tab.url))
            .collect();

        let tabs = TabRepository::new(&self.store);
        let stored = tabs.list_by_status(workspace_id, ItemStatus::Active)?;

        let mut summary = ReconcileSummary::default();
        let mut matched: HashSet<usize> = HashSet::new();

        let mut by_external: HashMap<i64, Vec<usize>> = HashMap::new();
        for (idx, record) in stored.iter().enumerate() {
            if let Some(external_id) = record.external_id {
                by_external.entry(external_id).or_default().push(idx);
            }
        }

        // Step 1: primary match by external id. When a host race left several
        // records holding the same external id, all of them count as matched
        // here (the duplicate sweep below resolves them); only the preferred
        // record receives the live fields.
        let mut unmatched_live: Vec<&LiveTab> = Vec::new();
        for live_tab in &live {
            let candidates = match by_external.get(&live_tab.id) {
                Some(candidates) => candidates,
                None => {
                    unmatched_live.push(live_tab);
                    continue;
                }
            };
            for &idx in candidates {
                matched.insert(idx);
            }
            let keeper = candidates
                .iter()
                .copied()
                .min_by(|&a, &b| keeper_first(&stored[a], &stored[b]));
            let keeper = match keeper {
                Some(idx) => &stored[idx],
                None => continue,
            };
            let fields = live_fields(live_tab);
            if keeper.differs_from(&fields) {
                match tabs.update_live_fields(&keeper.stable_id, &fields) {
                    Ok(()) => summary.updated += 1,
                    Err(err) => {
                        warn!(stable_id = %keeper.stable_id, error = %err, "reconcile update failed");
                    }
                }
            }
        }

        // Step 2: URL adoption. A live item with no external-id match takes
        // over the first unmatched record sharing its URL; this preserves the
        // stable identity when the host detached and recreated the item.
        let mut still_unmatched: Vec<&LiveTab> = Vec::new();
        for live_tab in unmatched_live {
            if live_tab.url.is_empty() {
                still_unmatched.push(live_tab);
                continue;
            }
            let adopted = stored
                .iter()
                .enumerate()
                .find(|&(idx, record)| !matched.contains(&idx) && record.url == live_tab.url);
            match adopted {
                Some((idx, record)) => {
                    matched.insert(idx);
                    match tabs.update_live_fields(&record.stable_id, &live_fields(live_tab)) {
                        Ok(()) => summary.adopted += 1,
                        Err(err) => {
                            warn!(stable_id = %record.stable_id, error = %err, "reconcile adoption failed");
                        }
                    }
                }
                None => still_unmatched.push(live_tab),
            }
        }

        // Step 3: live items still unmatched become new records.
        for live_tab in still_unmatched {
            let new = NewTab {
                external_id: Some(live_tab.id),
                window_id: live_tab.window_id,
                group_id: live_tab.group_id,
                workspace_id,
                tab_index: live_tab.index,
                url: live_tab.url.clone(),
                title: live_tab.title.clone(),
                pinned: live_tab.pinned,
            };
            match tabs.insert(new) {
                Ok(_) => summary.created += 1,
                Err(err) => warn!(url = %live_tab.url, error = %err, "reconcile insert failed"),
            }
        }

        // Step 4: delete records no live item matched. Their absence means the
        // user closed them while this workspace was live, so they are not
        // archived for later rematerialization.
        let stale: Vec<String> = stored
            .iter()
            .enumerate()
            .filter(|&(idx, _)| !matched.contains(&idx))
            .map(|(_, record)| record.stable_id.clone())
            .collect();
        if !stale.is_empty() {
            match tabs.delete_many(&stale) {
                Ok(count) => summary.removed += count,
                Err(err) => warn!(error = %err, "reconcile removal failed"),
            }
        }

        // Step 5: duplicate sweep. Any external id still on more than one
        // active record keeps only the preferred record.
        let converged = tabs.list_by_status(workspace_id, ItemStatus::Active)?;
        let mut groups: HashMap<i64, Vec<&Tab>> = HashMap::new();
        for record in &converged {
            if let Some(external_id) = record.external_id {
                groups.entry(external_id).or_default().push(record);
            }
        }
        for (external_id, mut records) in groups {
            if records.len() < 2 {
                continue;
            }
            records.sort_by(|a, b| keeper_first(a, b));
            let extra: Vec<String> = records[1..]
                .iter()
                .map(|record| record.stable_id.clone())
                .collect();
            match tabs.delete_many(&extra) {
                Ok(count) => {
                    summary.deduped += count;
                    debug!(external_id, count, "removed duplicate records");
                }
                Err(err) => warn!(external_id, error = %err, "reconcile dedup failed"),
            }
        }

        Ok(summary)
    }
}

fn live_fields(tab: &LiveTab) -> TabLiveFields {
    TabLiveFields {
        external_id: Some(tab.id),
        window_id: tab.window_id,
        group_id: tab.group_id,
        tab_index: tab.index,
        url: tab.url.clone(),
        title: tab.title.clone(),
        pinned: tab.pinned,
    }
}

/// Ordering that puts the record to keep first: most recently updated wins,
/// ties broken by lowest stable id. The duplicate-cleaning pass applies the
/// same rule.
pub(crate) fn keeper_first(a: &Tab, b: &Tab) -> CmpOrdering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.stable_id.cmp(&b.stable_id))
}
