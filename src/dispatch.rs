//! Push dispatch
//!
//! Turns a completion notice from the background context into the
//! settlement of one sync. Named syncs stay registered and cache their
//! latest response; anonymous syncs are dropped once settled.
//!
//! The notice type is checked before the sync lookup, so a notice of an
//! unknown type is reported as `UnknownMessageType` even when its id
//! matches no sync.

use serde_json::Value;

use crate::codec::ResponseCodec;
use crate::error::{FetchSyncError, Result};
use crate::protocol::{PushMessage, PUSH_FAILURE, PUSH_SUCCESS};
use crate::store::{Action, Store};

/// What a push delivery did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Resolved,
    Rejected,
    /// Sync unknown or already cancelled
    Ignored,
}

pub fn receive_push(store: &Store, codec: &dyn ResponseCodec, payload: &str) -> Result<PushOutcome> {
    let message = PushMessage::parse(payload)?;
    let kind = message.kind.as_str();
    if kind != PUSH_SUCCESS && kind != PUSH_FAILURE {
        return Err(FetchSyncError::UnknownMessageType(message.kind));
    }

    let id = message.data.id;
    let Some(record) = store.read(|state| state.syncs.get_by_id(&id).cloned()) else {
        tracing::debug!(%id, kind, "push for unknown sync ignored");
        return Ok(PushOutcome::Ignored);
    };

    // A delivery carrying an error is never a success
    let error = message.data.error.filter(|error| !error.is_null());
    if kind == PUSH_SUCCESS && error.is_none() {
        let response = codec.deserialize(message.data.response.as_ref().unwrap_or(&Value::Null))?;
        // Cache first so a woken caller already sees the response
        if record.is_named() {
            store.dispatch(Action::SetSyncResponse {
                id,
                response: Some(response.clone()),
            });
        } else {
            store.dispatch(Action::RemoveSync(id));
        }
        if !record.settle(Ok(response)) {
            tracing::debug!(%id, "sync already settled; refreshed cached response");
        }
        tracing::debug!(%id, name = record.name.as_deref(), "sync succeeded");
        Ok(PushOutcome::Resolved)
    } else {
        let reason = error.unwrap_or(Value::Null);
        if record.is_named() {
            store.dispatch(Action::SetSyncResponse { id, response: None });
        } else {
            store.dispatch(Action::RemoveSync(id));
        }
        record.settle(Err(FetchSyncError::Rejected(reason)));
        tracing::debug!(%id, name = record.name.as_deref(), "sync failed");
        Ok(PushOutcome::Rejected)
    }
}
