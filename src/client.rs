//! Public operation facade
//!
//! [`FetchSync`] owns the store and every collaborator. `initialize`
//! registers the background context and runs the handshake; every other
//! operation waits for that handshake before touching the registry.
//! Without host support, calls fall through to direct fetches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::codec::{FetchRequest, FetchResponse, JsonCodec, RequestCodec, ResponseCodec};
use crate::config::InitConfig;
use crate::correlation::Correlator;
use crate::error::{FetchSyncError, Result};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::handshake::Handshake;
use crate::operations;
use crate::router::Router;
use crate::store::{Action, Store};
use crate::sync::{SyncId, SyncOutcome, SyncRecord, SyncStatus};
use crate::transport::Host;

/// Resolves once the handshake completes (or fails)
pub type Ready = Shared<BoxFuture<'static, Result<()>>>;

/// A request to run in the background, optionally named
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCall {
    pub name: Option<String>,
    pub request: FetchRequest,
}

impl SyncCall {
    /// One-shot sync, forgotten once settled
    pub fn anonymous(request: FetchRequest) -> Self {
        Self { name: None, request }
    }

    /// Persistent sync that caches its latest response
    pub fn named(name: impl Into<String>, request: FetchRequest) -> Self {
        Self {
            name: Some(name.into()),
            request,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(FetchSyncError::InvalidArgument("sync name must not be empty".into()));
            }
        }
        self.request.validate()
    }
}

/// Caller's view of a tracked sync
#[derive(Debug, Clone)]
pub struct SyncHandle {
    record: SyncRecord,
}

impl SyncHandle {
    pub fn id(&self) -> SyncId {
        self.record.id
    }

    pub fn name(&self) -> Option<&str> {
        self.record.name.as_deref()
    }

    /// Latest cached response, as of when this handle was obtained
    pub fn response(&self) -> Option<&FetchResponse> {
        self.record.response.as_ref()
    }

    pub fn status(&self) -> SyncStatus {
        self.record.status()
    }

    /// First outcome of the sync; later deliveries only refresh `response`
    pub async fn outcome(&self) -> SyncOutcome {
        self.record.outcome().await
    }
}

/// What to cancel
#[derive(Debug, Clone)]
pub enum CancelTarget {
    Name(String),
    Handle(SyncHandle),
}

impl From<&str> for CancelTarget {
    fn from(name: &str) -> Self {
        CancelTarget::Name(name.to_string())
    }
}

impl From<String> for CancelTarget {
    fn from(name: String) -> Self {
        CancelTarget::Name(name)
    }
}

impl From<SyncHandle> for CancelTarget {
    fn from(handle: SyncHandle) -> Self {
        CancelTarget::Handle(handle)
    }
}

struct Inner {
    store: Store,
    host: Arc<dyn Host>,
    correlator: Arc<Correlator>,
    handshake: Arc<Handshake>,
    request_codec: Arc<dyn RequestCodec>,
    response_codec: Arc<dyn ResponseCodec>,
    fetcher: Arc<dyn Fetcher>,
    ready: Mutex<Option<Ready>>,
    /// Why the last initialization failed, until the next attempt
    failure: Mutex<Option<FetchSyncError>>,
    degraded: AtomicBool,
    warned: AtomicBool,
    router: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(router) = self.router.lock().take() {
            router.abort();
        }
    }
}

pub struct FetchSyncBuilder {
    host: Arc<dyn Host>,
    request_codec: Arc<dyn RequestCodec>,
    response_codec: Arc<dyn ResponseCodec>,
    fetcher: Option<Arc<dyn Fetcher>>,
    store: Store,
}

impl FetchSyncBuilder {
    pub fn request_codec(mut self, codec: Arc<dyn RequestCodec>) -> Self {
        self.request_codec = codec;
        self
    }

    pub fn response_codec(mut self, codec: Arc<dyn ResponseCodec>) -> Self {
        self.response_codec = codec;
        self
    }

    /// Fetcher used for direct calls in degraded mode
    pub fn fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn store(mut self, store: Store) -> Self {
        self.store = store;
        self
    }

    pub fn build(self) -> FetchSync {
        FetchSync {
            inner: Arc::new(Inner {
                store: self.store,
                host: self.host,
                correlator: Arc::new(Correlator::new()),
                handshake: Arc::new(Handshake::new()),
                request_codec: self.request_codec,
                response_codec: self.response_codec,
                fetcher: self.fetcher.unwrap_or_else(|| Arc::new(HttpFetcher::new())),
                ready: Mutex::new(None),
                failure: Mutex::new(None),
                degraded: AtomicBool::new(false),
                warned: AtomicBool::new(false),
                router: Mutex::new(None),
            }),
        }
    }
}

/// Entry point for durable background requests
#[derive(Clone)]
pub struct FetchSync {
    inner: Arc<Inner>,
}

impl FetchSync {
    pub fn new(host: Arc<dyn Host>) -> Self {
        Self::builder(host).build()
    }

    pub fn builder(host: Arc<dyn Host>) -> FetchSyncBuilder {
        FetchSyncBuilder {
            host,
            request_codec: Arc::new(JsonCodec),
            response_codec: Arc::new(JsonCodec),
            fetcher: None,
            store: Store::new(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// True once initialization found the host lacking; permanent
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::SeqCst)
    }

    /// Register the background context and open the comms channel.
    ///
    /// Misuse fails here, before any asynchronous work. On success the
    /// work is already running; the returned future reports its outcome.
    /// A failed initialization may be retried.
    pub fn initialize(&self, config: InitConfig) -> Result<Ready> {
        let mut slot = self.inner.ready.lock();
        if slot.is_some() {
            return Err(FetchSyncError::AlreadyInitialized);
        }
        config.validate()?;

        let capabilities = self.inner.host.capabilities();
        if !capabilities.is_supported() {
            let missing = capabilities.missing();
            self.inner.degraded.store(true, Ordering::SeqCst);
            if !self.inner.warned.swap(true, Ordering::SeqCst) {
                tracing::warn!(
                    "environment does not support {}; requests will be forwarded directly",
                    missing.join(", ")
                );
            }
            return Err(FetchSyncError::UnsupportedEnvironment { missing });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| FetchSyncError::NoRuntime)?;

        let (tx, rx) = oneshot::channel();
        let ready: Ready = rx
            .map(|outcome| outcome.unwrap_or(Err(FetchSyncError::ChannelClosed)))
            .boxed()
            .shared();
        *slot = Some(ready.clone());
        self.inner.failure.lock().take();
        drop(slot);

        let inner = self.inner.clone();
        let attempt = ready.clone();
        runtime.spawn(async move {
            let outcome = start(&inner, &config).await;
            if let Err(err) = &outcome {
                tracing::warn!(error = %err, "initialization failed");
                let mut slot = inner.ready.lock();
                if slot.as_ref().is_some_and(|current| current.ptr_eq(&attempt)) {
                    *slot = None;
                    *inner.failure.lock() = Some(err.clone());
                }
            }
            let _ = tx.send(outcome);
        });

        Ok(ready)
    }

    /// Readiness gate shared by every operation except `initialize`.
    /// After a failed initialization, operations see that failure until
    /// `initialize` is called again.
    fn readiness(&self) -> Result<Ready> {
        let ready = self.inner.ready.lock();
        match ready.as_ref() {
            Some(ready) => Ok(ready.clone()),
            None => Err(self
                .inner
                .failure
                .lock()
                .clone()
                .unwrap_or(FetchSyncError::Uninitialized)),
        }
    }

    async fn wait_ready(&self) -> Result<()> {
        let ready = self.readiness()?;
        ready.await
    }

    /// Register `call` with the background context and return its handle
    /// without waiting for the outcome
    pub async fn register(&self, call: SyncCall) -> Result<SyncHandle> {
        call.validate()?;
        if self.is_degraded() {
            let response = self.fetch_directly(&call.request).await;
            let record = SyncRecord::new(call.name, serde_json::Value::Null);
            record.settle(response);
            return Ok(SyncHandle { record });
        }
        self.wait_ready().await?;

        let request = self.inner.request_codec.serialize(&call.request).await?;
        let record = SyncRecord::new(call.name, request);
        operations::register_sync(&self.inner.store, &self.inner.correlator, &record).await?;

        let record = self
            .inner
            .store
            .read(|state| state.syncs.get_by_id(&record.id).cloned())
            .unwrap_or(record);
        Ok(SyncHandle { record })
    }

    /// Run `call` in the background and wait for its first outcome
    pub async fn call(&self, call: SyncCall) -> Result<FetchResponse> {
        call.validate()?;
        if self.is_degraded() {
            return self.fetch_directly(&call.request).await;
        }
        let handle = self.register(call).await?;
        handle.outcome().await
    }

    /// Look up a tracked sync by id or name
    pub async fn get(&self, key: &str) -> Result<Option<SyncHandle>> {
        if self.is_degraded() {
            return Ok(None);
        }
        self.wait_ready().await?;
        Ok(self
            .inner
            .store
            .read(|state| state.syncs.get(key).cloned())
            .map(|record| SyncHandle { record }))
    }

    /// Names of all named syncs, in registration order
    pub async fn list(&self) -> Result<Vec<String>> {
        if self.is_degraded() {
            return Ok(Vec::new());
        }
        self.wait_ready().await?;
        Ok(self.inner.store.read(|state| state.syncs.names()))
    }

    pub async fn cancel(&self, target: impl Into<CancelTarget>) -> Result<()> {
        let target = target.into();
        if self.is_degraded() {
            return Ok(());
        }
        self.wait_ready().await?;

        let record = match &target {
            CancelTarget::Name(name) => self
                .inner
                .store
                .read(|state| state.syncs.find_by_name(name).cloned())
                .ok_or_else(|| FetchSyncError::SyncNotFound(name.clone()))?,
            CancelTarget::Handle(handle) => handle.record.clone(),
        };
        operations::cancel_sync(&self.inner.store, &self.inner.correlator, &record).await
    }

    pub async fn cancel_all(&self) -> Result<()> {
        if self.is_degraded() {
            return Ok(());
        }
        self.wait_ready().await?;
        operations::cancel_all_syncs(&self.inner.store, &self.inner.correlator).await
    }

    async fn fetch_directly(&self, request: &FetchRequest) -> Result<FetchResponse> {
        tracing::debug!(url = %request.url, "forwarding request directly");
        self.inner.fetcher.fetch(request).await
    }
}

async fn start(inner: &Inner, config: &InitConfig) -> Result<()> {
    let registration = inner.host.register(config).await.map_err(|err| {
        tracing::warn!("failed to register the background context");
        err
    })?;

    if config.force_update {
        if let Some(context) = registration.controller.as_ref().and_then(|handle| handle.upgrade()) {
            context.update();
        }
    }

    inner
        .store
        .dispatch(Action::SetBackgroundContext(registration.controller));
    inner.correlator.reopen();

    let router = Router {
        store: inner.store.clone(),
        correlator: inner.correlator.clone(),
        handshake: inner.handshake.clone(),
        codec: inner.response_codec.clone(),
    }
    .spawn(registration.inbound);
    if let Some(previous) = inner.router.lock().replace(router) {
        previous.abort();
    }

    inner
        .handshake
        .open(&inner.store, config.handshake_timeout())
        .await
}
