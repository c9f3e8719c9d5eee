//! Process-wide state container
//!
//! Holds the sync registry, the comms channel status and the handle to
//! the background context. [`Store::dispatch`] is the only way to mutate
//! it; each dispatched action is traced and broadcast to subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use crate::codec::FetchResponse;
use crate::error::FetchSyncError;
use crate::sync::{SyncId, SyncRecord, SyncRegistry};
use crate::transport::BackgroundHandle;

const ACTION_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsStatus {
    Closed,
    Open,
}

/// State of the handshake channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommsChannel {
    pub status: CommsStatus,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Default for CommsChannel {
    fn default() -> Self {
        Self {
            status: CommsStatus::Closed,
            opened_at: None,
        }
    }
}

impl CommsChannel {
    pub fn is_open(&self) -> bool {
        self.status == CommsStatus::Open
    }
}

#[derive(Debug, Clone, Default)]
pub struct State {
    pub syncs: SyncRegistry,
    pub comms: CommsChannel,
    pub background: Option<BackgroundHandle>,
}

#[derive(Debug, Clone)]
pub enum Action {
    SetBackgroundContext(Option<BackgroundHandle>),
    SetCommsStatus(CommsStatus),
    AddSync(SyncRecord),
    /// Union with syncs the background context already knows
    AddSyncs(Vec<SyncRecord>),
    MarkSyncOpen(SyncId),
    SetSyncResponse {
        id: SyncId,
        response: Option<FetchResponse>,
    },
    RemoveSync(SyncId),
    /// Clear the registry. Every drained sync settles with `Cancelled`
    /// under the same write lock, so none can slip in unsettled.
    RemoveAllSyncs,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SetBackgroundContext(_) => "SET_BACKGROUND_CONTEXT",
            Action::SetCommsStatus(_) => "SET_COMMS_STATUS",
            Action::AddSync(_) => "ADD_SYNC",
            Action::AddSyncs(_) => "ADD_SYNCS",
            Action::MarkSyncOpen(_) => "MARK_SYNC_OPEN",
            Action::SetSyncResponse { .. } => "SET_SYNC_RESPONSE",
            Action::RemoveSync(_) => "REMOVE_SYNC",
            Action::RemoveAllSyncs => "REMOVE_ALL_SYNCS",
        }
    }
}

#[derive(Clone)]
pub struct Store {
    state: Arc<RwLock<State>>,
    actions: broadcast::Sender<Action>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let (actions, _) = broadcast::channel(ACTION_LOG_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(State::default())),
            actions,
        }
    }

    pub fn dispatch(&self, action: Action) {
        tracing::debug!(action = action.name(), "dispatch");
        {
            let mut state = self.state.write();
            reduce(&mut state, &action);
        }
        // No subscribers is fine
        let _ = self.actions.send(action);
    }

    /// Owned snapshot of the current state
    pub fn get_state(&self) -> State {
        self.state.read().clone()
    }

    /// Borrow the state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&State) -> R) -> R {
        f(&self.state.read())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Action> {
        self.actions.subscribe()
    }
}

fn reduce(state: &mut State, action: &Action) {
    match action {
        Action::SetBackgroundContext(handle) => {
            state.background = handle.clone();
        }
        Action::SetCommsStatus(status) => {
            state.comms.status = *status;
            state.comms.opened_at = match status {
                CommsStatus::Open => Some(Utc::now()),
                CommsStatus::Closed => None,
            };
        }
        Action::AddSync(record) => {
            state.syncs.add(record.clone());
        }
        Action::AddSyncs(records) => {
            let added = state.syncs.merge(records.iter().cloned());
            tracing::debug!(added, offered = records.len(), "merged known syncs");
        }
        Action::MarkSyncOpen(id) => {
            if let Some(record) = state.syncs.get_mut(id) {
                record.registered = true;
            }
        }
        Action::SetSyncResponse { id, response } => {
            if let Some(record) = state.syncs.get_mut(id) {
                record.response = response.clone();
            }
        }
        Action::RemoveSync(id) => {
            state.syncs.remove(id);
        }
        Action::RemoveAllSyncs => {
            let drained = state.syncs.remove_all();
            for record in &drained {
                record.settle(Err(FetchSyncError::Cancelled));
            }
            tracing::debug!(cancelled = drained.len(), "cancelled all syncs");
        }
    }
}
