use std::sync::Arc;
use std::time::Duration;

use fetch_sync::protocol::{ClientMessage, InboundFrame, OutboundFrame, PushMessage};
use fetch_sync::{FetchRequest, FetchSync, FetchSyncError, InitConfig, SyncCall, WsHost};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

/// How the scripted daemon treats a registration
#[derive(Clone, Copy)]
enum Daemon {
    /// Reply, then push the result as a CBOR frame
    Answer,
    /// Drop the connection without replying
    Hangup,
}

async fn spawn_daemon(mode: Daemon) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut write, mut read) = ws.split();

        while let Some(Ok(msg)) = read.next().await {
            let Message::Text(text) = msg else { continue };
            let frame: OutboundFrame = serde_json::from_str(text.as_str()).unwrap();

            let reply = match frame.message {
                ClientMessage::OpenComms => InboundFrame::HandshakeAck { syncs: vec![] },
                ClientMessage::RegisterSync(descriptor) => {
                    if let Daemon::Hangup = mode {
                        return;
                    }
                    let reply = InboundFrame::Reply {
                        correlation_id: frame.correlation_id,
                        body: json!({}),
                    };
                    write
                        .send(Message::Text(serde_json::to_string(&reply).unwrap().into()))
                        .await
                        .unwrap();

                    let push = PushMessage::success(
                        descriptor.id,
                        json!({"url": "https://api/report", "status": 200, "body": "from daemon"}),
                    )
                    .into_frame()
                    .unwrap();
                    let bytes = serde_cbor::to_vec(&push).unwrap();
                    write.send(Message::Binary(bytes.into())).await.unwrap();
                    continue;
                }
                ClientMessage::CancelSync { .. } | ClientMessage::CancelAllSyncs => InboundFrame::Reply {
                    correlation_id: frame.correlation_id,
                    body: json!({}),
                },
            };
            write
                .send(Message::Text(serde_json::to_string(&reply).unwrap().into()))
                .await
                .unwrap();
        }
    });

    format!("ws://127.0.0.1:{port}/sync")
}

#[tokio::test]
async fn ws_named_sync_roundtrip() {
    let url = spawn_daemon(Daemon::Answer).await;
    let client = FetchSync::new(Arc::new(WsHost::new()));

    let ready = client.initialize(InitConfig::new(url)).unwrap();
    timeout(Duration::from_secs(5), ready).await.unwrap().unwrap();

    let response = timeout(
        Duration::from_secs(5),
        client.call(SyncCall::named("report", FetchRequest::get("https://api/report"))),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.body, "from daemon");

    let cached = client.get("report").await.unwrap().unwrap();
    assert_eq!(cached.response(), Some(&response));

    timeout(Duration::from_secs(5), client.cancel_all())
        .await
        .unwrap()
        .unwrap();
    assert!(client.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn ws_hangup_fails_in_flight_registration() {
    let url = spawn_daemon(Daemon::Hangup).await;
    let client = FetchSync::new(Arc::new(WsHost::new()));

    let ready = client.initialize(InitConfig::new(url)).unwrap();
    timeout(Duration::from_secs(5), ready).await.unwrap().unwrap();

    let outcome = timeout(
        Duration::from_secs(5),
        client.call(SyncCall::anonymous(FetchRequest::get("https://api/x"))),
    )
    .await
    .unwrap();
    assert_eq!(outcome, Err(FetchSyncError::ChannelClosed));
}
