//! Error Handling
//!
//! A single error type covers every failure the coordination layer can
//! surface, from environment probing through per-sync rejections.
//! Errors are `Clone` because one outcome is frequently observed by many
//! awaiters (the readiness future, a named sync's completion).

use serde_json::Value;
use thiserror::Error;

/// Errors produced by the sync coordination layer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchSyncError {
    /// Required host capabilities are missing; the process runs degraded
    #[error("environment does not support {}", .missing.join(", "))]
    UnsupportedEnvironment { missing: Vec<String> },

    #[error("initialize() called multiple times")]
    AlreadyInitialized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A call was made with a malformed request or name
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no background context is available")]
    NoBackgroundContext,

    #[error("connecting to the background context timed out after {timeout_ms}ms")]
    HandshakeTimeout { timeout_ms: u64 },

    #[error("initialize first by calling initialize(<config>)")]
    Uninitialized,

    #[error("unknown response type '{0}'")]
    UnknownMessageType(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("background context registration failed: {0}")]
    Registration(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// The channel to the background context closed before a reply arrived
    #[error("channel to the background context closed")]
    ChannelClosed,

    /// Failure reported by the background context for a single sync
    #[error("rejected by background context: {0}")]
    Rejected(Value),

    #[error("sync was cancelled")]
    Cancelled,

    #[error("sync not found: {0}")]
    SyncNotFound(String),

    /// Direct network fetch failed (degraded mode)
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("no async runtime available")]
    NoRuntime,
}

/// Broad classification used for logging and by callers deciding
/// whether an operation is worth re-invoking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Host capabilities or runtime missing (permanent for the process)
    Environment,

    /// Bad configuration or arguments (fix the call)
    Configuration,

    /// Lifecycle misuse: initialize twice, use before initialize
    Lifecycle,

    /// Background context unreachable or slow (may be retried)
    Channel,

    /// Background context and this layer disagree on the wire format
    Protocol,

    /// Outcome of a single sync
    Sync,
}

impl ErrorCategory {
    /// Whether re-invoking the failed operation can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Channel)
    }
}

impl FetchSyncError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            FetchSyncError::UnsupportedEnvironment { .. } | FetchSyncError::NoRuntime => {
                ErrorCategory::Environment
            }
            FetchSyncError::InvalidConfig(_) | FetchSyncError::InvalidArgument(_) => {
                ErrorCategory::Configuration
            }
            FetchSyncError::AlreadyInitialized | FetchSyncError::Uninitialized => {
                ErrorCategory::Lifecycle
            }
            FetchSyncError::NoBackgroundContext
            | FetchSyncError::HandshakeTimeout { .. }
            | FetchSyncError::Registration(_)
            | FetchSyncError::Transport(_)
            | FetchSyncError::ChannelClosed => ErrorCategory::Channel,
            FetchSyncError::UnknownMessageType(_)
            | FetchSyncError::MalformedMessage(_)
            | FetchSyncError::Codec(_) => ErrorCategory::Protocol,
            FetchSyncError::Rejected(_)
            | FetchSyncError::Cancelled
            | FetchSyncError::SyncNotFound(_)
            | FetchSyncError::Fetch(_) => ErrorCategory::Sync,
        }
    }
}

pub type Result<T, E = FetchSyncError> = std::result::Result<T, E>;
