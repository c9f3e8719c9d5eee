//! # Fetch Sync - Durable Background Requests
//!
//! Hands network requests to a separately scheduled background context
//! so they survive the requester going away, and coordinates the results.
//!
//! ## Features
//!
//! - **Sync registry**: outstanding syncs by id, with named syncs that
//!   persist and cache their latest response
//! - **Handshake**: one-time channel open with a 2000ms deadline that
//!   re-imports the named syncs the background context already knows
//! - **Correlation**: exactly one reply per request over any transport
//! - **Push dispatch**: completion notices settle each sync exactly once
//! - **Degraded mode**: without host support, requests go straight to
//!   the network
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fetch_sync::{FetchRequest, FetchSync, InitConfig, SyncCall, WsHost};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = FetchSync::new(Arc::new(WsHost::new()));
//!     client.initialize(InitConfig::new("ws://127.0.0.1:7710/sync"))?.await?;
//!
//!     let report = client
//!         .call(SyncCall::named("dailyReport", FetchRequest::get("https://api.example.com/report")))
//!         .await?;
//!     println!("{} {}", report.status, report.body);
//!
//!     // Later, without another round trip
//!     if let Some(sync) = client.get("dailyReport").await? {
//!         println!("cached: {:?}", sync.response());
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod fetch;
pub mod handshake;
pub mod logging;
pub mod operations;
pub mod protocol;
pub mod router;
pub mod store;
pub mod sync;
pub mod transport;

// Re-export main types for library consumers
pub use client::{CancelTarget, FetchSync, FetchSyncBuilder, Ready, SyncCall, SyncHandle};
pub use codec::{FetchRequest, FetchResponse, JsonCodec, RequestCodec, ResponseCodec};
pub use config::InitConfig;
pub use error::{FetchSyncError, Result};
pub use fetch::{Fetcher, HttpFetcher};
pub use store::{Action, CommsStatus, State, Store};
pub use sync::{SyncId, SyncRecord, SyncRegistry, SyncStatus};
pub use transport::{Capabilities, Host, MemoryHost, MemoryWorker, WsHost};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
