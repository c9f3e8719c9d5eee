//! Channel handshake
//!
//! Opens the comms channel with the background context and re-imports
//! the named syncs it already knows. The acknowledgment races a
//! deadline; whichever side takes the ack slot first decides the outcome.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{FetchSyncError, Result};
use crate::protocol::{ClientMessage, OutboundFrame};
use crate::store::{Action, CommsStatus, Store};
use crate::sync::{SyncDescriptor, SyncRecord};

#[derive(Debug, Default)]
pub struct Handshake {
    ack: Mutex<Option<oneshot::Sender<Vec<SyncDescriptor>>>>,
}

impl Handshake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand an acknowledgment to the waiting handshake.
    /// Returns false if none is waiting (late or duplicate ack).
    pub fn acknowledge(&self, syncs: Vec<SyncDescriptor>) -> bool {
        match self.ack.lock().take() {
            Some(tx) => tx.send(syncs).is_ok(),
            None => {
                tracing::warn!("discarding handshake acknowledgment: no handshake in progress");
                false
            }
        }
    }

    pub fn in_progress(&self) -> bool {
        self.ack.lock().is_some()
    }

    pub async fn open(&self, store: &Store, timeout: Duration) -> Result<()> {
        let context = store
            .read(|state| state.background.as_ref().and_then(|handle| handle.upgrade()))
            .ok_or(FetchSyncError::NoBackgroundContext)?;

        let (tx, rx) = oneshot::channel();
        *self.ack.lock() = Some(tx);

        tracing::debug!(timeout_ms = timeout.as_millis() as u64, "opening comms channel");
        if let Err(err) = context.post_message(OutboundFrame::new(ClientMessage::OpenComms)) {
            self.ack.lock().take();
            return Err(err);
        }
        drop(context);

        tokio::select! {
            received = rx => {
                let syncs = received.map_err(|_| FetchSyncError::ChannelClosed)?;
                let known = syncs.len();
                store.dispatch(Action::SetCommsStatus(CommsStatus::Open));
                store.dispatch(Action::AddSyncs(
                    syncs.into_iter().map(SyncRecord::from_descriptor).collect(),
                ));
                tracing::info!(known, "comms channel open");
                Ok(())
            }
            _ = tokio::time::sleep(timeout) => {
                // Taking the slot shuts out an ack racing the deadline
                self.ack.lock().take();
                store.dispatch(Action::SetCommsStatus(CommsStatus::Closed));
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "connecting to the background context timed out");
                Err(FetchSyncError::HandshakeTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BackgroundHandle, MemoryHost};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_no_background_context_fails_immediately() {
        let handshake = Handshake::new();
        let result = handshake.open(&Store::new(), Duration::from_secs(60)).await;
        assert_eq!(result, Err(FetchSyncError::NoBackgroundContext));
        assert!(!handshake.in_progress());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_channel_closed() {
        let (host, mut worker) = MemoryHost::new();
        let context = host.context();
        let store = Store::new();
        store.dispatch(Action::SetBackgroundContext(Some(BackgroundHandle::new(&context))));
        let handshake = Handshake::new();

        let result = handshake.open(&store, Duration::from_millis(2000)).await;
        assert_eq!(result, Err(FetchSyncError::HandshakeTimeout { timeout_ms: 2000 }));
        assert!(!store.read(|s| s.comms.is_open()));

        // The open request was sent; a late ack is ignored
        assert_eq!(worker.try_next_frame().unwrap().message, ClientMessage::OpenComms);
        assert!(!handshake.acknowledge(vec![]));
        assert!(!store.read(|s| s.comms.is_open()));
    }

    #[tokio::test]
    async fn test_ack_opens_and_merges_known_syncs() {
        let (host, mut worker) = MemoryHost::new();
        let context = host.context();
        let store = Store::new();
        store.dispatch(Action::SetBackgroundContext(Some(BackgroundHandle::new(&context))));

        let local = SyncRecord::new(Some("daily".into()), json!({"url": "https://api/daily"}));
        store.dispatch(Action::AddSync(local.clone()));

        let handshake = Arc::new(Handshake::new());
        let opening = {
            let handshake = handshake.clone();
            let store = store.clone();
            tokio::spawn(async move { handshake.open(&store, Duration::from_secs(2)).await })
        };

        worker.next_frame().await.unwrap();
        let remote = SyncRecord::new(Some("weekly".into()), json!({"url": "https://api/weekly"}));
        assert!(handshake.acknowledge(vec![local.descriptor(), remote.descriptor()]));

        assert_eq!(opening.await.unwrap(), Ok(()));
        let state = store.get_state();
        assert!(state.comms.is_open());
        assert_eq!(state.syncs.names(), vec!["daily".to_string(), "weekly".to_string()]);
    }
}
