use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::{BackgroundContext, BackgroundHandle, Capabilities, Host, Registration};
use crate::config::InitConfig;
use crate::error::{FetchSyncError, Result};
use crate::protocol::{InboundFrame, OutboundFrame};

struct WsContext {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

impl BackgroundContext for WsContext {
    fn post_message(&self, frame: OutboundFrame) -> Result<()> {
        self.outbound
            .send(frame)
            .map_err(|_| FetchSyncError::Transport("websocket connection closed".into()))
    }
}

/// Host whose background context is a daemon reachable over WebSocket
/// at the configured `worker_url`. Outbound frames are JSON text;
/// inbound frames may be JSON text or CBOR binary.
#[derive(Default)]
pub struct WsHost {
    context: Mutex<Option<Arc<WsContext>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WsHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the connection; outstanding handles go dead
    pub fn disconnect(&self) {
        self.context.lock().take();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

impl Drop for WsHost {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl Host for WsHost {
    fn capabilities(&self) -> Capabilities {
        Capabilities::full()
    }

    fn register<'a>(&'a self, config: &'a InitConfig) -> BoxFuture<'a, Result<Registration>> {
        Box::pin(async move {
            let url = Url::parse(&config.worker_url)
                .map_err(|e| FetchSyncError::Registration(format!("invalid ws url: {e}")))?;
            let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| FetchSyncError::Registration(e.to_string()))?;
            tracing::info!(%url, scope = config.worker_options.scope.as_deref(), "connected to background context");

            let (mut ws_tx, mut ws_rx) = ws_stream.split();
            let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<OutboundFrame>();
            let (inbound_tx, inbound) = mpsc::unbounded_channel();

            // Spawn forwarder for local -> remote
            let forward = tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::error!(error = %err, "failed to encode frame");
                            continue;
                        }
                    };
                    if ws_tx.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                let _ = ws_tx.close().await;
            });

            // Spawn receiver for remote -> local
            let recv = tokio::spawn(async move {
                while let Some(msg) = ws_rx.next().await {
                    let frame = match msg {
                        Ok(Message::Text(text)) => serde_json::from_str::<InboundFrame>(text.as_str())
                            .map_err(|e| e.to_string()),
                        Ok(Message::Binary(bin)) => {
                            serde_cbor::from_slice::<InboundFrame>(&bin).map_err(|e| e.to_string())
                        }
                        Ok(Message::Close(_)) => break,
                        Ok(Message::Frame(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                        Err(err) => {
                            tracing::warn!(error = %err, "background context connection failed");
                            break;
                        }
                    };

                    match frame {
                        Ok(frame) => {
                            if inbound_tx.send(frame).is_err() {
                                break;
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "dropping undecodable frame"),
                    }
                }
            });

            let context = Arc::new(WsContext { outbound });
            let handle = {
                let context: Arc<dyn BackgroundContext> = context.clone();
                BackgroundHandle::new(&context)
            };

            *self.context.lock() = Some(context);
            let mut tasks = self.tasks.lock();
            tasks.retain(|task| !task.is_finished());
            tasks.push(forward);
            tasks.push(recv);

            Ok(Registration {
                controller: Some(handle),
                inbound,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_fails_registration() {
        let host = WsHost::new();
        let result = host.register(&InitConfig::new("not a url")).await;
        assert!(matches!(result, Err(FetchSyncError::Registration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_daemon_fails_registration() {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let host = WsHost::new();
        let result = host.register(&InitConfig::new(format!("ws://127.0.0.1:{port}/sync"))).await;
        assert!(matches!(result, Err(FetchSyncError::Registration(_))));
    }
}
