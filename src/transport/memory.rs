//! In-process host
//!
//! The background context is a pair of channels. The [`MemoryWorker`]
//! end sees every frame the client posts and answers through a
//! [`WorkerPort`], either scripted by hand (tests) or through
//! [`MemoryWorker::serve`], which performs each registered request once.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{BackgroundContext, BackgroundHandle, Capabilities, Host, Registration};
use crate::codec::JsonCodec;
use crate::config::InitConfig;
use crate::error::{FetchSyncError, Result};
use crate::fetch::Fetcher;
use crate::protocol::{ClientMessage, InboundFrame, OutboundFrame, PushMessage};
use crate::sync::{SyncDescriptor, SyncId};

struct MemoryContext {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    updates: Arc<AtomicUsize>,
}

impl BackgroundContext for MemoryContext {
    fn post_message(&self, frame: OutboundFrame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| FetchSyncError::Transport("background worker stopped".into()))
    }

    fn update(&self) {
        self.updates.fetch_add(1, Ordering::SeqCst);
    }
}

struct HostState {
    capabilities: Capabilities,
    controlled: AtomicBool,
    context: Mutex<Option<Arc<MemoryContext>>>,
    client: Mutex<Option<mpsc::UnboundedSender<InboundFrame>>>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    registrations: AtomicUsize,
    updates: Arc<AtomicUsize>,
}

impl HostState {
    fn context(&self) -> Arc<MemoryContext> {
        self.context
            .lock()
            .get_or_insert_with(|| {
                Arc::new(MemoryContext {
                    outbound: self.outbound.clone(),
                    updates: self.updates.clone(),
                })
            })
            .clone()
    }
}

pub struct MemoryHost {
    state: Arc<HostState>,
}

impl MemoryHost {
    pub fn new() -> (Self, MemoryWorker) {
        Self::with_capabilities(Capabilities::full())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> (Self, MemoryWorker) {
        let (outbound, frames) = mpsc::unbounded_channel();
        let state = Arc::new(HostState {
            capabilities,
            controlled: AtomicBool::new(true),
            context: Mutex::new(None),
            client: Mutex::new(None),
            outbound,
            registrations: AtomicUsize::new(0),
            updates: Arc::new(AtomicUsize::new(0)),
        });

        let worker = MemoryWorker {
            frames,
            port: WorkerPort {
                state: state.clone(),
            },
        };
        (Self { state }, worker)
    }

    /// Registrations complete without an active controller, as on a
    /// first load before the background context takes control
    pub fn without_controller(self) -> Self {
        self.state.controlled.store(false, Ordering::SeqCst);
        self
    }

    /// The running background context (started on demand)
    pub fn context(&self) -> Arc<dyn BackgroundContext> {
        self.state.context()
    }

    /// Stop the background context; outstanding handles go dead
    pub fn terminate(&self) {
        self.state.context.lock().take();
    }

    pub fn registrations(&self) -> usize {
        self.state.registrations.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.state.updates.load(Ordering::SeqCst)
    }
}

impl Host for MemoryHost {
    fn capabilities(&self) -> Capabilities {
        self.state.capabilities
    }

    fn register<'a>(&'a self, config: &'a InitConfig) -> BoxFuture<'a, Result<Registration>> {
        Box::pin(async move {
            self.state.registrations.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(
                worker_url = %config.worker_url,
                scope = config.worker_options.scope.as_deref(),
                "registering in-process background context"
            );

            let (tx, inbound) = mpsc::unbounded_channel();
            *self.state.client.lock() = Some(tx);

            let controller = if self.state.controlled.load(Ordering::SeqCst) {
                let context: Arc<dyn BackgroundContext> = self.state.context();
                Some(BackgroundHandle::new(&context))
            } else {
                None
            };

            Ok(Registration { controller, inbound })
        })
    }
}

/// Background side of a [`MemoryHost`]
pub struct MemoryWorker {
    frames: mpsc::UnboundedReceiver<OutboundFrame>,
    port: WorkerPort,
}

impl MemoryWorker {
    pub async fn next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.recv().await
    }

    pub fn try_next_frame(&mut self) -> Option<OutboundFrame> {
        self.frames.try_recv().ok()
    }

    pub fn port(&self) -> WorkerPort {
        self.port.clone()
    }

    /// Answer the protocol until the client side goes away, performing
    /// each registered request once through `fetcher`
    pub async fn serve(mut self, fetcher: Arc<dyn Fetcher>) {
        let mut named: IndexMap<SyncId, SyncDescriptor> = IndexMap::new();

        while let Some(frame) = self.frames.recv().await {
            let id = frame.correlation_id;
            let sent = match frame.message {
                ClientMessage::OpenComms => self.port.acknowledge(named.values().cloned().collect()),
                ClientMessage::RegisterSync(descriptor) => {
                    if descriptor.name.is_some() {
                        named.insert(descriptor.id, descriptor.clone());
                    }
                    let port = self.port.clone();
                    let fetcher = fetcher.clone();
                    tokio::spawn(async move { perform(port, fetcher, descriptor).await });
                    self.port.reply(id, json!({}))
                }
                ClientMessage::CancelSync { id: sync } => {
                    named.shift_remove(&sync);
                    self.port.reply(id, json!({}))
                }
                ClientMessage::CancelAllSyncs => {
                    named.clear();
                    self.port.reply(id, json!({}))
                }
            };

            if let Err(err) = sent {
                tracing::warn!(error = %err, "in-process worker lost its client");
            }
        }
    }
}

async fn perform(port: WorkerPort, fetcher: Arc<dyn Fetcher>, descriptor: SyncDescriptor) {
    let outcome = match JsonCodec.decode_request(&descriptor.request) {
        Ok(request) => fetcher.fetch(&request).await,
        Err(err) => Err(err),
    };

    let message = match outcome.and_then(|response| JsonCodec.encode_response(&response)) {
        Ok(response) => PushMessage::success(descriptor.id, response),
        Err(err) => PushMessage::failure(descriptor.id, Value::String(err.to_string())),
    };
    if let Err(err) = port.push(message) {
        tracing::warn!(id = %descriptor.id, error = %err, "could not deliver sync result");
    }
}

/// Sends frames from the background side to the registered client
#[derive(Clone)]
pub struct WorkerPort {
    state: Arc<HostState>,
}

impl WorkerPort {
    pub fn send(&self, frame: InboundFrame) -> Result<()> {
        let client = self.state.client.lock().clone().ok_or(FetchSyncError::ChannelClosed)?;
        client.send(frame).map_err(|_| FetchSyncError::ChannelClosed)
    }

    pub fn reply(&self, correlation_id: Uuid, body: Value) -> Result<()> {
        self.send(InboundFrame::Reply { correlation_id, body })
    }

    pub fn acknowledge(&self, syncs: Vec<SyncDescriptor>) -> Result<()> {
        self.send(InboundFrame::HandshakeAck { syncs })
    }

    pub fn push(&self, message: PushMessage) -> Result<()> {
        self.send(message.into_frame()?)
    }

    pub fn push_raw(&self, payload: impl Into<String>) -> Result<()> {
        self.send(InboundFrame::Push {
            payload: payload.into(),
        })
    }

    /// Drop the client stream, as if the background context went away
    pub fn disconnect(&self) {
        self.state.client.lock().take();
    }
}
