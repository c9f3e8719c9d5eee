//! Direct network fetches
//!
//! Used when the host cannot run background syncs, and by background
//! workers that actually perform registered requests.

use futures::future::BoxFuture;

use crate::codec::{FetchRequest, FetchResponse};
use crate::error::{FetchSyncError, Result};

pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>>;
}

/// reqwest-backed fetcher
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> BoxFuture<'a, Result<FetchResponse>> {
        Box::pin(async move {
            let method = reqwest::Method::from_bytes(request.method.as_bytes())
                .map_err(|e| FetchSyncError::InvalidArgument(format!("invalid method: {e}")))?;

            let mut builder = self.client.request(method, &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }
            if let Some(body) = &request.body {
                builder = builder.body(body.clone());
            }

            let response = builder
                .send()
                .await
                .map_err(|e| FetchSyncError::Fetch(e.to_string()))?;

            let status = response.status();
            let url = response.url().to_string();
            let headers = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|value| (name.as_str().to_string(), value.to_string()))
                })
                .collect();
            let body = response
                .text()
                .await
                .map_err(|e| FetchSyncError::Fetch(e.to_string()))?;

            tracing::debug!(%url, status = status.as_u16(), "fetched");
            Ok(FetchResponse {
                url,
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
                headers,
                body,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_method_rejected_before_sending() {
        let fetcher = HttpFetcher::new();
        let request = FetchRequest::new("BAD METHOD", "http://127.0.0.1:9/");
        assert!(matches!(
            fetcher.fetch(&request).await,
            Err(FetchSyncError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_fetch_error() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let fetcher = HttpFetcher::new();
        let request = FetchRequest::get(format!("http://127.0.0.1:{port}/"));
        assert!(matches!(fetcher.fetch(&request).await, Err(FetchSyncError::Fetch(_))));
    }
}
