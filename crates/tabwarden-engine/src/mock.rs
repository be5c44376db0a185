//! In-memory host for testing.
//!
//! Models enough live-environment behavior for the engine's semantics to be
//! observable: closing a window's last tab closes the window, emptied groups
//! disappear, indices stay contiguous per window. Records every call and can
//! inject failures or block enumeration on a gate.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::HostError;
use crate::host::{CreateTab, GroupUpdate, HostClient, LiveGroup, LiveTab, LiveWindow};

/// A recorded call to the mock host.
#[derive(Debug, Clone)]
pub enum HostCall {
    ListTabs,
    ListGroups,
    ListWindows,
    CreateTab(CreateTab),
    CloseTabs(Vec<i64>),
    MoveTab { tab_id: i64, index: i64 },
    GroupTabs { window_id: i64, tab_ids: Vec<i64> },
    UpdateGroup { group_id: i64, update: GroupUpdate },
    UngroupTabs(Vec<i64>),
    CreateWindow { focused: bool },
    GetWindow(i64),
    FocusWindow(i64),
}

#[derive(Debug, Default)]
struct HostState {
    tabs: BTreeMap<i64, LiveTab>,
    groups: BTreeMap<i64, LiveGroup>,
    windows: BTreeMap<i64, LiveWindow>,
    next_tab_id: i64,
    next_group_id: i64,
    next_window_id: i64,
}

/// Mock implementation of `HostClient` for testing.
pub struct InMemoryHost {
    state: Mutex<HostState>,
    calls: Mutex<Vec<HostCall>>,
    /// URL whose next `create_tab` is refused, one-shot.
    create_failure: Mutex<Option<String>>,
    /// When set, the next enumeration blocks until the gate is notified.
    enumerate_gate: Mutex<Option<Arc<Notify>>>,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HostState {
                next_tab_id: 1,
                next_group_id: 1,
                next_window_id: 1,
                ..HostState::default()
            }),
            calls: Mutex::new(Vec::new()),
            create_failure: Mutex::new(None),
            enumerate_gate: Mutex::new(None),
        }
    }

    /// Pre-populate a window.
    pub fn with_window(self, window: LiveWindow) -> Self {
        {
            let mut state = self.state();
            state.next_window_id = state.next_window_id.max(window.id + 1);
            state.windows.insert(window.id, window);
        }
        self
    }

    /// Pre-populate a tab. Its window must be seeded too for the state to be
    /// coherent.
    pub fn with_tab(self, tab: LiveTab) -> Self {
        {
            let mut state = self.state();
            state.next_tab_id = state.next_tab_id.max(tab.id + 1);
            state.tabs.insert(tab.id, tab);
        }
        self
    }

    /// Pre-populate a group.
    pub fn with_group(self, group: LiveGroup) -> Self {
        {
            let mut state = self.state();
            state.next_group_id = state.next_group_id.max(group.id + 1);
            state.groups.insert(group.id, group);
        }
        self
    }

    /// Refuse the next `create_tab` for this URL.
    pub fn with_create_failure(self, url: &str) -> Self {
        match self.create_failure.lock() {
            Ok(mut guard) => *guard = Some(url.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(url.to_string()),
        }
        self
    }

    /// Block the next enumeration call until `gate` is notified.
    pub fn with_enumerate_gate(self, gate: Arc<Notify>) -> Self {
        match self.enumerate_gate.lock() {
            Ok(mut guard) => *guard = Some(gate),
            Err(poisoned) => *poisoned.into_inner() = Some(gate),
        }
        self
    }

    /// Current tabs in window-then-index order.
    pub fn tabs(&self) -> Vec<LiveTab> {
        sorted_tabs(&self.state())
    }

    pub fn groups(&self) -> Vec<LiveGroup> {
        self.state().groups.values().cloned().collect()
    }

    pub fn windows(&self) -> Vec<LiveWindow> {
        self.state().windows.values().copied().collect()
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<HostCall> {
        match self.calls.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn state(&self) -> MutexGuard<'_, HostState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record(&self, call: HostCall) {
        match self.calls.lock() {
            Ok(mut guard) => guard.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    fn take_gate(&self) -> Option<Arc<Notify>> {
        match self.enumerate_gate.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn take_create_failure(&self, url: &str) -> bool {
        let mut guard = match self.create_failure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.as_deref() == Some(url) {
            *guard = None;
            true
        } else {
            false
        }
    }
}

/// Helper to build a live tab with defaults for the uninteresting fields.
pub fn live_tab(id: i64, window_id: i64, index: i64, url: &str) -> LiveTab {
    LiveTab {
        id,
        window_id,
        group_id: None,
        index,
        url: url.to_string(),
        title: url.to_string(),
        pinned: false,
        active: false,
    }
}

fn sorted_tabs(state: &HostState) -> Vec<LiveTab> {
    let mut tabs: Vec<LiveTab> = state.tabs.values().cloned().collect();
    tabs.sort_by(|a, b| {
        a.window_id
            .cmp(&b.window_id)
            .then(a.index.cmp(&b.index))
            .then(a.id.cmp(&b.id))
    });
    tabs
}

/// Re-number a window's tabs 0..n preserving their relative order.
fn reindex_window(state: &mut HostState, window_id: i64) {
    let mut order: Vec<(i64, i64)> = state
        .tabs
        .values()
        .filter(|tab| tab.window_id == window_id)
        .map(|tab| (tab.index, tab.id))
        .collect();
    order.sort_unstable();
    for (position, (_, tab_id)) in order.into_iter().enumerate() {
        if let Some(tab) = state.tabs.get_mut(&tab_id) {
            tab.index = position as i64;
        }
    }
}

/// Drop groups with no members and windows with no tabs, the way a real host
/// does when the last occupant goes away.
fn prune(state: &mut HostState) {
    let used_groups: HashSet<i64> = state.tabs.values().filter_map(|tab| tab.group_id).collect();
    state.groups.retain(|group_id, _| used_groups.contains(group_id));
    let occupied: HashSet<i64> = state.tabs.values().map(|tab| tab.window_id).collect();
    state.windows.retain(|window_id, _| occupied.contains(window_id));
}

#[async_trait]
impl HostClient for InMemoryHost {
    async fn list_tabs(&self) -> Result<Vec<LiveTab>, HostError> {
        self.record(HostCall::ListTabs);
        if let Some(gate) = self.take_gate() {
            gate.notified().await;
        }
        Ok(sorted_tabs(&self.state()))
    }

    async fn list_groups(&self) -> Result<Vec<LiveGroup>, HostError> {
        self.record(HostCall::ListGroups);
        if let Some(gate) = self.take_gate() {
            gate.notified().await;
        }
        Ok(self.state().groups.values().cloned().collect())
    }

    async fn list_windows(&self) -> Result<Vec<LiveWindow>, HostError> {
        self.record(HostCall::ListWindows);
        Ok(self.state().windows.values().copied().collect())
    }

    async fn create_tab(&self, request: CreateTab) -> Result<LiveTab, HostError> {
        self.record(HostCall::CreateTab(request.clone()));
        if self.take_create_failure(&request.url) {
            return Err(HostError::Unavailable(format!(
                "tab creation refused for {}",
                request.url
            )));
        }

        let mut state = self.state();
        if !state.windows.contains_key(&request.window_id) {
            return Err(HostError::MissingItem {
                id: request.window_id,
            });
        }
        let id = state.next_tab_id;
        state.next_tab_id += 1;

        let window_len = state
            .tabs
            .values()
            .filter(|tab| tab.window_id == request.window_id)
            .count() as i64;
        let position = request.index.unwrap_or(window_len).clamp(0, window_len);
        for tab in state.tabs.values_mut() {
            if tab.window_id == request.window_id && tab.index >= position {
                tab.index += 1;
            }
        }
        if request.active {
            for tab in state.tabs.values_mut() {
                if tab.window_id == request.window_id {
                    tab.active = false;
                }
            }
        }
        let tab = LiveTab {
            id,
            window_id: request.window_id,
            group_id: None,
            index: position,
            url: request.url.clone(),
            title: request.url.clone(),
            pinned: request.pinned,
            active: request.active,
        };
        state.tabs.insert(id, tab.clone());
        Ok(tab)
    }

    async fn close_tabs(&self, tab_ids: &[i64]) -> Result<(), HostError> {
        self.record(HostCall::CloseTabs(tab_ids.to_vec()));
        let mut state = self.state();
        let mut touched: BTreeSet<i64> = BTreeSet::new();
        for tab_id in tab_ids {
            if let Some(tab) = state.tabs.remove(tab_id) {
                touched.insert(tab.window_id);
            }
        }
        for window_id in touched {
            reindex_window(&mut state, window_id);
        }
        prune(&mut state);
        Ok(())
    }

    async fn move_tab(&self, tab_id: i64, index: i64) -> Result<(), HostError> {
        self.record(HostCall::MoveTab { tab_id, index });
        let mut state = self.state();
        let window_id = match state.tabs.get(&tab_id) {
            Some(tab) => tab.window_id,
            None => return Err(HostError::MissingItem { id: tab_id }),
        };
        let window_len = state
            .tabs
            .values()
            .filter(|tab| tab.window_id == window_id)
            .count() as i64;
        let target = index.clamp(0, window_len - 1);
        // Nudge the moved tab just past (or before) its slot, then re-number.
        if let Some(tab) = state.tabs.get_mut(&tab_id) {
            tab.index = if target > tab.index {
                2 * target + 1
            } else {
                2 * target - 1
            };
        }
        for tab in state.tabs.values_mut() {
            if tab.window_id == window_id && tab.id != tab_id {
                tab.index *= 2;
            }
        }
        reindex_window(&mut state, window_id);
        Ok(())
    }

    async fn group_tabs(&self, window_id: i64, tab_ids: &[i64]) -> Result<i64, HostError> {
        self.record(HostCall::GroupTabs {
            window_id,
            tab_ids: tab_ids.to_vec(),
        });
        let mut state = self.state();
        if !state.windows.contains_key(&window_id) {
            return Err(HostError::MissingItem { id: window_id });
        }
        let group_id = state.next_group_id;
        state.next_group_id += 1;

        let mut grouped = 0;
        let mut vacated: BTreeSet<i64> = BTreeSet::new();
        for &tab_id in tab_ids {
            let old_window = match state.tabs.get(&tab_id) {
                Some(tab) => tab.window_id,
                None => continue,
            };
            if old_window != window_id {
                let end = state
                    .tabs
                    .values()
                    .filter(|tab| tab.window_id == window_id)
                    .map(|tab| tab.index + 1)
                    .max()
                    .unwrap_or(0);
                if let Some(tab) = state.tabs.get_mut(&tab_id) {
                    tab.window_id = window_id;
                    tab.index = end;
                }
                vacated.insert(old_window);
            }
            if let Some(tab) = state.tabs.get_mut(&tab_id) {
                tab.group_id = Some(group_id);
            }
            grouped += 1;
        }
        if grouped == 0 {
            return Err(HostError::Protocol("no tabs left to group".into()));
        }
        for old_window in vacated {
            reindex_window(&mut state, old_window);
        }
        let group = LiveGroup {
            id: group_id,
            window_id,
            title: String::new(),
            color: "grey".to_string(),
            collapsed: false,
        };
        state.groups.insert(group_id, group);
        Ok(group_id)
    }

    async fn update_group(&self, group_id: i64, update: GroupUpdate) -> Result<(), HostError> {
        self.record(HostCall::UpdateGroup {
            group_id,
            update: update.clone(),
        });
        let mut state = self.state();
        let group = state
            .groups
            .get_mut(&group_id)
            .ok_or(HostError::MissingItem { id: group_id })?;
        if let Some(title) = update.title {
            group.title = title;
        }
        if let Some(color) = update.color {
            group.color = color;
        }
        if let Some(collapsed) = update.collapsed {
            group.collapsed = collapsed;
        }
        Ok(())
    }

    async fn ungroup_tabs(&self, tab_ids: &[i64]) -> Result<(), HostError> {
        self.record(HostCall::UngroupTabs(tab_ids.to_vec()));
        let mut state = self.state();
        for tab_id in tab_ids {
            if let Some(tab) = state.tabs.get_mut(tab_id) {
                tab.group_id = None;
            }
        }
        let used_groups: HashSet<i64> =
            state.tabs.values().filter_map(|tab| tab.group_id).collect();
        state.groups.retain(|group_id, _| used_groups.contains(group_id));
        Ok(())
    }

    async fn create_window(&self, focused: bool) -> Result<LiveWindow, HostError> {
        self.record(HostCall::CreateWindow { focused });
        let mut state = self.state();
        let id = state.next_window_id;
        state.next_window_id += 1;
        if focused {
            for window in state.windows.values_mut() {
                window.focused = false;
            }
        }
        let window = LiveWindow { id, focused };
        state.windows.insert(id, window);
        Ok(window)
    }

    async fn get_window(&self, window_id: i64) -> Result<LiveWindow, HostError> {
        self.record(HostCall::GetWindow(window_id));
        self.state()
            .windows
            .get(&window_id)
            .copied()
            .ok_or(HostError::MissingItem { id: window_id })
    }

    async fn focus_window(&self, window_id: i64) -> Result<(), HostError> {
        self.record(HostCall::FocusWindow(window_id));
        let mut state = self.state();
        if !state.windows.contains_key(&window_id) {
            return Err(HostError::MissingItem { id: window_id });
        }
        for window in state.windows.values_mut() {
            window.focused = window.id == window_id;
        }
        Ok(())
    }
}
