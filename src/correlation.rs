//! Request/reply correlation
//!
//! Each outbound message gets a fresh correlation id and a one-shot
//! completion slot. The first reply carrying that id settles the slot;
//! later replies find nothing and are discarded. Once the inbound stream
//! ends the correlator is closed and new sends fail at once.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::error::{FetchSyncError, Result};
use crate::protocol::{reply_error, ClientMessage, OutboundFrame};
use crate::store::Store;

#[derive(Debug, Default)]
pub struct Correlator {
    pending: DashMap<Uuid, oneshot::Sender<Value>>,
    closed: AtomicBool,
}

/// Removes the pending entry if the caller stops waiting
struct PendingGuard<'a> {
    pending: &'a DashMap<Uuid, oneshot::Sender<Value>>,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send one message and wait for its reply.
    ///
    /// No deadline applies here; wrap in `tokio::time::timeout` if needed.
    pub async fn send(&self, store: &Store, message: ClientMessage) -> Result<Value> {
        if self.is_closed() {
            return Err(FetchSyncError::ChannelClosed);
        }
        let context = store
            .read(|state| state.background.as_ref().and_then(|handle| handle.upgrade()))
            .ok_or(FetchSyncError::NoBackgroundContext)?;

        let frame = OutboundFrame::new(message);
        let id = frame.correlation_id;
        let kind = frame.message.kind();

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            id,
        };
        // A close racing the insert has either cleared this entry or is seen here
        if self.is_closed() {
            return Err(FetchSyncError::ChannelClosed);
        }

        tracing::debug!(%id, kind, "posting message");
        context.post_message(frame)?;
        drop(context);

        let body = rx.await.map_err(|_| FetchSyncError::ChannelClosed)?;
        match reply_error(&body) {
            Some(error) => {
                tracing::debug!(%id, kind, %error, "message rejected");
                Err(FetchSyncError::Rejected(error.clone()))
            }
            None => Ok(body),
        }
    }

    /// Deliver a reply. Returns false if nothing was waiting for it.
    pub fn resolve(&self, id: Uuid, body: Value) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(body).is_ok(),
            None => {
                tracing::debug!(%id, "discarding reply for completed or unknown request");
                false
            }
        }
    }

    /// Fail every in-flight request, and every later one, with `ChannelClosed`
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let abandoned = self.pending.len();
        self.pending.clear();
        if abandoned > 0 {
            tracing::warn!(abandoned, "background channel closed with requests in flight");
        }
    }

    /// Accept sends again, for a fresh inbound stream
    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}
