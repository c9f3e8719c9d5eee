//! Request and response codecs
//!
//! The background context only ever sees serialized requests and hands
//! back serialized responses. The codecs here define that boundary.

use std::collections::BTreeMap;

use futures::future::{self, BoxFuture};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{FetchSyncError, Result};

/// Serialized form of a [`FetchRequest`] as stored on a sync
pub type SerializedRequest = Value;

/// A network request to be performed by the background context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl FetchRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new("POST", url).with_body(body)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Check that the request can be handed to the background context
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url)
            .map_err(|e| FetchSyncError::InvalidArgument(format!("invalid url '{}': {e}", self.url)))?;
        if self.method.trim().is_empty() {
            return Err(FetchSyncError::InvalidArgument("empty request method".into()));
        }
        Ok(())
    }
}

/// Result of a network request, as reported by the background context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl FetchResponse {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| FetchSyncError::Codec(e.to_string()))
    }
}

/// Serializes requests before they are registered. May be asynchronous;
/// a failure aborts registration before any message is sent.
pub trait RequestCodec: Send + Sync {
    fn serialize<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<SerializedRequest>>;
}

/// Deserializes responses delivered by the background context.
/// Must be synchronous and pure.
pub trait ResponseCodec: Send + Sync {
    fn deserialize(&self, response: &Value) -> Result<FetchResponse>;
}

/// Plain JSON encoding of both directions
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl RequestCodec for JsonCodec {
    fn serialize<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<SerializedRequest>> {
        Box::pin(future::ready(self.encode_request(request)))
    }
}

impl ResponseCodec for JsonCodec {
    fn deserialize(&self, response: &Value) -> Result<FetchResponse> {
        // An empty delivery is still a successful one
        if response.is_null() {
            return Ok(FetchResponse::default());
        }
        serde_json::from_value(response.clone()).map_err(|e| FetchSyncError::Codec(e.to_string()))
    }
}

impl JsonCodec {
    /// Synchronous form of [`RequestCodec::serialize`]
    pub fn encode_request(&self, request: &FetchRequest) -> Result<SerializedRequest> {
        serde_json::to_value(request).map_err(|e| FetchSyncError::Codec(e.to_string()))
    }

    /// Inverse of [`RequestCodec::serialize`], used by background workers
    pub fn decode_request(&self, request: &SerializedRequest) -> Result<FetchRequest> {
        serde_json::from_value(request.clone()).map_err(|e| FetchSyncError::Codec(e.to_string()))
    }

    /// Inverse of [`ResponseCodec::deserialize`], used by background workers
    pub fn encode_response(&self, response: &FetchResponse) -> Result<Value> {
        serde_json::to_value(response).map_err(|e| FetchSyncError::Codec(e.to_string()))
    }
}
