//! End-to-end test over a real socket: axum server, in-memory store and
//! tokio-tungstenite viewers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use loudmouth::persistence::MemoryCommentStore;
use loudmouth::server::{CommentServer, ServerConfig};
use loudmouth::MediaKey;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Viewer = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    server: Arc<CommentServer>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(CommentServer::new(
            ServerConfig::with_addr(addr),
            Arc::new(MemoryCommentStore::new()),
        ));

        let (tx, rx) = oneshot::channel::<()>();
        let serving = Arc::clone(&server);
        tokio::spawn(async move {
            serving
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            server,
            shutdown: Some(tx),
        }
    }

    async fn connect(&self, media_id: &str) -> Viewer {
        let url = format!("ws://{}/ws?media_id={}", self.addr, media_id);
        let (viewer, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        viewer
    }

    async fn wait_for_clients(&self, media_id: &str, count: usize) {
        let key = MediaKey::new(media_id).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let joined = self
                    .server
                    .registry()
                    .hub_stats(&key)
                    .await
                    .map(|stats| stats.client_count)
                    .unwrap_or(0);
                if joined == count {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("clients never joined");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn send(viewer: &mut Viewer, frame: Value) {
    viewer.send(Message::text(frame.to_string())).await.unwrap();
}

async fn next_batch(viewer: &mut Viewer) -> Vec<Value> {
    let message = tokio::time::timeout(Duration::from_secs(5), viewer.next())
        .await
        .expect("no frame received")
        .expect("stream ended")
        .unwrap();
    let text = message.into_text().unwrap();
    serde_json::from_str::<Vec<Value>>(text.as_str()).unwrap()
}

async fn assert_silent(viewer: &mut Viewer) {
    let next = tokio::time::timeout(Duration::from_millis(200), viewer.next()).await;
    assert!(next.is_err(), "unexpected frame: {next:?}");
}

#[tokio::test]
async fn test_live_fan_out_and_replay() {
    let server = TestServer::start().await;
    let mut alice = server.connect("abc").await;
    let mut bob = server.connect("abc").await;
    server.wait_for_clients("abc", 2).await;

    send(
        &mut alice,
        json!({"message": "hi", "poster": 1, "time_of_media": 100, "media_id": "abc"}),
    )
    .await;

    for viewer in [&mut alice, &mut bob] {
        let batch = next_batch(viewer).await;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0]["comment_id"], 1);
        assert_eq!(batch[0]["message"], "hi");
        assert_eq!(batch[0]["poster"], 1);
        assert_eq!(batch[0]["time_of_media"], 100);
        assert!(batch[0]["created_at"].is_string());
    }

    send(
        &mut bob,
        json!({"message": "", "poster": "PING_POSTER", "time_of_media": 105, "media_id": "abc"}),
    )
    .await;

    let replay = next_batch(&mut bob).await;
    assert_eq!(replay.len(), 1);
    assert_eq!(replay[0]["comment_id"], 1);
    assert_silent(&mut alice).await;

    send(
        &mut bob,
        json!({"message": "", "poster": "PING_POSTER", "time_of_media": 500, "media_id": "abc"}),
    )
    .await;
    assert!(next_batch(&mut bob).await.is_empty());
}

#[tokio::test]
async fn test_media_are_isolated() {
    let server = TestServer::start().await;
    let mut watching_abc = server.connect("abc").await;
    let mut watching_xyz = server.connect("xyz").await;
    server.wait_for_clients("abc", 1).await;
    server.wait_for_clients("xyz", 1).await;

    send(
        &mut watching_abc,
        json!({"message": "only abc", "poster": "ana", "time_of_media": 3}),
    )
    .await;

    let batch = next_batch(&mut watching_abc).await;
    assert_eq!(batch[0]["poster"], "ana");
    assert_silent(&mut watching_xyz).await;
}

#[tokio::test]
async fn test_last_viewer_leaving_retires_hub() {
    let server = TestServer::start().await;
    let mut viewer = server.connect("abc").await;
    server.wait_for_clients("abc", 1).await;

    viewer.close(None).await.unwrap();

    let key = MediaKey::new("abc").unwrap();
    tokio::time::timeout(Duration::from_secs(5), async {
        while server.server.registry().hub_count().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("hub never retired");
    assert!(server.server.registry().hub(&key).await.is_none());
}

#[tokio::test]
async fn test_missing_media_id_is_rejected() {
    let server = TestServer::start().await;

    let url = format!("ws://{}/ws", server.addr);
    let err = tokio_tungstenite::connect_async(url).await.unwrap_err();

    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 400),
        other => panic!("expected an HTTP rejection, got {other:?}"),
    }
}
