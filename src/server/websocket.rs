//! WebSocket transport for viewer sessions

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};

use crate::protocol::OutboundFrame;
use crate::session::{CommentSink, CommentSource, ConnectionError};

/// Split an upgraded socket into the halves used by a session and its hub
pub fn split(socket: WebSocket) -> (WsSink, WsSource) {
    let (sink, stream) = socket.split();
    (WsSink { inner: sink }, WsSource { inner: stream })
}

/// Outbound half: writes each frame as one text message
pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl CommentSink for WsSink {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ConnectionError> {
        self.inner
            .send(Message::Text(frame.text().to_owned().into()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        // The peer may already be gone
        let _ = self.inner.close().await;
    }
}

/// Inbound half: yields text frames, skipping control frames
pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl CommentSource for WsSource {
    async fn recv(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            match self.inner.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_str().to_owned())),
                Some(Ok(Message::Binary(data))) => {
                    return String::from_utf8(data.to_vec())
                        .map(Some)
                        .map_err(|_| ConnectionError::UnsupportedFrame);
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Err(e)) => return Err(ConnectionError::Transport(e.to_string())),
            }
        }
    }
}
