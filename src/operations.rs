//! Registry operations that talk to the background context
//!
//! Local state changes first; the network message follows. Cancellation
//! is optimistic: nothing is rolled back if the background side fails.

use crate::correlation::Correlator;
use crate::error::{FetchSyncError, Result};
use crate::protocol::ClientMessage;
use crate::store::{Action, Store};
use crate::sync::SyncRecord;

/// Track `record` and register it with the background context.
///
/// A sync already tracked is not added again, but the registration
/// message is always sent. A rejected registration settles the sync's
/// future with the rejection instead of failing this call.
pub async fn register_sync(store: &Store, correlator: &Correlator, record: &SyncRecord) -> Result<()> {
    if !store.read(|state| state.syncs.contains(&record.id)) {
        store.dispatch(Action::AddSync(record.clone()));
    }

    match correlator
        .send(store, ClientMessage::RegisterSync(record.descriptor()))
        .await
    {
        Ok(_) => {
            store.dispatch(Action::MarkSyncOpen(record.id));
            tracing::debug!(id = %record.id, name = record.name.as_deref(), "sync registered");
        }
        Err(err) => {
            tracing::warn!(id = %record.id, error = %err, "sync registration failed");
            record.settle(Err(err));
            if !record.is_named() {
                store.dispatch(Action::RemoveSync(record.id));
            }
        }
    }
    Ok(())
}

pub async fn cancel_sync(store: &Store, correlator: &Correlator, record: &SyncRecord) -> Result<()> {
    store.dispatch(Action::RemoveSync(record.id));
    record.settle(Err(FetchSyncError::Cancelled));

    correlator
        .send(store, ClientMessage::CancelSync { id: record.id })
        .await
        .map(|_| ())
}

/// Clearing and settling happen in one dispatch, so a sync registered
/// concurrently is either cancelled here or survives untouched.
pub async fn cancel_all_syncs(store: &Store, correlator: &Correlator) -> Result<()> {
    store.dispatch(Action::RemoveAllSyncs);

    correlator
        .send(store, ClientMessage::CancelAllSyncs)
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SyncStatus;
    use crate::transport::{BackgroundContext, BackgroundHandle, MemoryHost, MemoryWorker};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        store: Store,
        correlator: Arc<Correlator>,
        worker: MemoryWorker,
        _context: Arc<dyn BackgroundContext>,
    }

    fn fixture() -> Fixture {
        let (host, worker) = MemoryHost::new();
        let context = host.context();
        let store = Store::new();
        store.dispatch(Action::SetBackgroundContext(Some(BackgroundHandle::new(&context))));
        Fixture {
            store,
            correlator: Arc::new(Correlator::new()),
            worker,
            _context: context,
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_still_sends() {
        let mut fx = fixture();
        let record = SyncRecord::new(None, json!({"url": "https://api/x"}));

        for _ in 0..2 {
            let task = {
                let store = fx.store.clone();
                let correlator = fx.correlator.clone();
                let record = record.clone();
                tokio::spawn(async move { register_sync(&store, &correlator, &record).await })
            };
            let frame = fx.worker.next_frame().await.unwrap();
            assert_eq!(frame.message, ClientMessage::RegisterSync(record.descriptor()));
            fx.correlator.resolve(frame.correlation_id, json!({}));
            task.await.unwrap().unwrap();
        }

        assert_eq!(fx.store.read(|s| s.syncs.len()), 1);
        let stored = fx.store.read(|s| s.syncs.get_by_id(&record.id).cloned()).unwrap();
        assert_eq!(stored.status(), SyncStatus::Open);
    }

    #[tokio::test]
    async fn test_rejected_registration_rejects_sync() {
        let mut fx = fixture();
        let record = SyncRecord::new(None, json!({}));

        let task = {
            let store = fx.store.clone();
            let correlator = fx.correlator.clone();
            let record = record.clone();
            tokio::spawn(async move { register_sync(&store, &correlator, &record).await })
        };
        let frame = fx.worker.next_frame().await.unwrap();
        fx.correlator.resolve(frame.correlation_id, json!({"error": "no quota"}));

        assert!(task.await.unwrap().is_ok());
        assert_eq!(record.outcome().await, Err(FetchSyncError::Rejected(json!("no quota"))));
        assert!(fx.store.read(|s| s.syncs.is_empty()));
    }

    #[tokio::test]
    async fn test_cancel_all_is_optimistic() {
        let mut fx = fixture();
        let pending = SyncRecord::new(Some("daily".into()), json!({}));
        fx.store.dispatch(Action::AddSync(pending.clone()));

        let task = {
            let store = fx.store.clone();
            let correlator = fx.correlator.clone();
            tokio::spawn(async move { cancel_all_syncs(&store, &correlator).await })
        };

        // Cleared and settled before the background side answers
        let frame = fx.worker.next_frame().await.unwrap();
        assert_eq!(frame.message, ClientMessage::CancelAllSyncs);
        assert!(fx.store.read(|s| s.syncs.is_empty()));
        assert_eq!(pending.outcome().await, Err(FetchSyncError::Cancelled));

        fx.correlator.resolve(frame.correlation_id, json!({"error": "busy"}));
        assert!(task.await.unwrap().is_err());
        assert!(fx.store.read(|s| s.syncs.is_empty()));
    }

    #[tokio::test]
    async fn test_cancel_single_sync() {
        let mut fx = fixture();
        let keep = SyncRecord::new(Some("keep".into()), json!({}));
        let drop_me = SyncRecord::new(Some("drop".into()), json!({}));
        fx.store.dispatch(Action::AddSync(keep.clone()));
        fx.store.dispatch(Action::AddSync(drop_me.clone()));

        let task = {
            let store = fx.store.clone();
            let correlator = fx.correlator.clone();
            let record = drop_me.clone();
            tokio::spawn(async move { cancel_sync(&store, &correlator, &record).await })
        };
        let frame = fx.worker.next_frame().await.unwrap();
        assert_eq!(frame.message, ClientMessage::CancelSync { id: drop_me.id });
        fx.correlator.resolve(frame.correlation_id, json!({}));
        task.await.unwrap().unwrap();

        assert_eq!(fx.store.read(|s| s.syncs.names()), vec!["keep".to_string()]);
        assert_eq!(keep.status(), SyncStatus::Pending);
        assert_eq!(drop_me.status(), SyncStatus::Settled);
    }
}
