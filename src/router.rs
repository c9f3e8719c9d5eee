//! Inbound frame routing
//!
//! One task drains the registration's inbound stream and hands each
//! frame to its consumer by `kind`. A bad push only costs that push.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::ResponseCodec;
use crate::correlation::Correlator;
use crate::dispatch::{self, PushOutcome};
use crate::error::FetchSyncError;
use crate::handshake::Handshake;
use crate::protocol::InboundFrame;
use crate::store::{Action, CommsStatus, Store};

#[derive(Clone)]
pub struct Router {
    pub store: Store,
    pub correlator: Arc<Correlator>,
    pub handshake: Arc<Handshake>,
    pub codec: Arc<dyn ResponseCodec>,
}

impl Router {
    pub fn route(&self, frame: InboundFrame) {
        match frame {
            InboundFrame::Reply { correlation_id, body } => {
                self.correlator.resolve(correlation_id, body);
            }
            InboundFrame::HandshakeAck { syncs } => {
                self.handshake.acknowledge(syncs);
            }
            InboundFrame::Push { payload } => {
                match dispatch::receive_push(&self.store, self.codec.as_ref(), &payload) {
                    Ok(PushOutcome::Ignored) => {
                        tracing::debug!("push for untracked sync");
                    }
                    Ok(_) => {}
                    Err(err @ FetchSyncError::UnknownMessageType(_)) => {
                        tracing::error!(error = %err, "push protocol mismatch; delivery dropped");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "push delivery dropped");
                    }
                }
            }
        }
    }

    pub fn spawn(self, mut inbound: mpsc::UnboundedReceiver<InboundFrame>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                self.route(frame);
            }
            tracing::warn!("background context stream ended");
            self.correlator.close();
            self.store.dispatch(Action::SetCommsStatus(CommsStatus::Closed));
            self.store.dispatch(Action::SetBackgroundContext(None));
        })
    }
}
