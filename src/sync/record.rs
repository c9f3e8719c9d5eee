use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::codec::{FetchResponse, SerializedRequest};
use crate::error::FetchSyncError;

/// Final outcome of a sync
pub type SyncOutcome = Result<FetchResponse, FetchSyncError>;

/// Globally unique sync identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(Uuid);

impl SyncId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SyncId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle of a sync. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Created locally, registration not yet acknowledged
    Pending,
    /// Registered with the background context
    Open,
    /// Outcome delivered
    Settled,
}

/// Settle-once result slot shared by every clone of a sync
pub struct Completion {
    sender: Mutex<Option<oneshot::Sender<SyncOutcome>>>,
    outcome: Shared<BoxFuture<'static, SyncOutcome>>,
}

impl Completion {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = oneshot::channel();
        let outcome = rx
            .map(|received| received.unwrap_or(Err(FetchSyncError::ChannelClosed)))
            .boxed()
            .shared();

        Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            outcome,
        })
    }

    /// Deliver the outcome. Returns false if already settled.
    pub fn settle(&self, outcome: SyncOutcome) -> bool {
        match self.sender.lock().take() {
            Some(tx) => {
                // Awaiters may all be gone; the outcome is still final
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }

    pub fn outcome(&self) -> Shared<BoxFuture<'static, SyncOutcome>> {
        self.outcome.clone()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

/// Wire form of a sync, exchanged with the background context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncDescriptor {
    pub id: SyncId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub request: SerializedRequest,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// A unit of deferred request work
#[derive(Clone)]
pub struct SyncRecord {
    pub id: SyncId,
    pub name: Option<String>,
    pub request: SerializedRequest,
    pub created_at: DateTime<Utc>,
    /// Latest delivered response; named syncs only
    pub response: Option<FetchResponse>,
    pub(crate) registered: bool,
    completion: Arc<Completion>,
}

impl SyncRecord {
    pub fn new(name: Option<String>, request: SerializedRequest) -> Self {
        Self {
            id: SyncId::new(),
            name,
            request,
            created_at: Utc::now(),
            response: None,
            registered: false,
            completion: Completion::new(),
        }
    }

    /// Rebuild a record the background context already knows about
    pub fn from_descriptor(descriptor: SyncDescriptor) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name,
            request: descriptor.request,
            created_at: descriptor.created_at,
            response: None,
            registered: true,
            completion: Completion::new(),
        }
    }

    pub fn descriptor(&self) -> SyncDescriptor {
        SyncDescriptor {
            id: self.id,
            name: self.name.clone(),
            request: self.request.clone(),
            created_at: self.created_at,
        }
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }

    pub fn status(&self) -> SyncStatus {
        if self.completion.is_settled() {
            SyncStatus::Settled
        } else if self.registered {
            SyncStatus::Open
        } else {
            SyncStatus::Pending
        }
    }

    pub fn settle(&self, outcome: SyncOutcome) -> bool {
        self.completion.settle(outcome)
    }

    pub fn outcome(&self) -> Shared<BoxFuture<'static, SyncOutcome>> {
        self.completion.outcome()
    }
}

impl fmt::Debug for SyncRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("created_at", &self.created_at)
            .field("response", &self.response)
            .field("status", &self.status())
            .finish()
    }
}
