//! Host platform and background context seams
//!
//! A [`Host`] probes capabilities and registers the background context.
//! The registered context is reachable through a weak
//! [`BackgroundHandle`]; its replies and pushes arrive as
//! [`InboundFrame`]s on the registration's inbound stream.

pub mod memory;
pub mod websocket;

use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::config::InitConfig;
use crate::error::Result;
use crate::protocol::{InboundFrame, OutboundFrame};

pub use memory::{MemoryHost, MemoryWorker, WorkerPort};
pub use websocket::WsHost;

/// What the host platform can do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Can register a separately scheduled background context
    pub background_context: bool,
    /// Can defer and retry work until it succeeds
    pub deferred_retry: bool,
}

impl Capabilities {
    pub fn full() -> Self {
        Self {
            background_context: true,
            deferred_retry: true,
        }
    }

    pub fn none() -> Self {
        Self {
            background_context: false,
            deferred_retry: false,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn missing(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if !self.background_context {
            missing.push("Background Contexts".to_string());
        }
        if !self.deferred_retry {
            missing.push("Deferred Retry".to_string());
        }
        missing
    }
}

/// The running background context, as seen from the requesting side
pub trait BackgroundContext: Send + Sync {
    fn post_message(&self, frame: OutboundFrame) -> Result<()>;

    /// Ask the context to refresh itself
    fn update(&self) {}
}

/// Weak reference to the active background context
#[derive(Clone)]
pub struct BackgroundHandle(Weak<dyn BackgroundContext>);

impl BackgroundHandle {
    pub fn new(context: &Arc<dyn BackgroundContext>) -> Self {
        Self(Arc::downgrade(context))
    }

    pub fn upgrade(&self) -> Option<Arc<dyn BackgroundContext>> {
        self.0.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for BackgroundHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Result of registering the background context
pub struct Registration {
    /// Active controller, if the host already has one
    pub controller: Option<BackgroundHandle>,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

pub trait Host: Send + Sync {
    fn capabilities(&self) -> Capabilities;

    fn register<'a>(&'a self, config: &'a InitConfig) -> BoxFuture<'a, Result<Registration>>;
}
