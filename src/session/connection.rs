//! Connection abstraction
//!
//! A viewer's connection is split in two halves: the [`CommentSource`] read by
//! the viewer's own receive loop, and the [`CommentSink`] owned by the hub that
//! fans comments out to it. The WebSocket adapter lives in `server::websocket`;
//! [`ChannelSink`] is an in-process sink backed by an mpsc channel.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::{OutboundFrame, OutboundMessage};

/// Error type for connection operations
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The peer is gone or the sink was already closed
    #[error("connection closed")]
    Closed,

    /// Delivery did not complete within the configured bound
    #[error("send timed out")]
    Timeout,

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The peer sent something that is not a text frame
    #[error("unsupported frame")]
    UnsupportedFrame,
}

/// Outbound half of a viewer connection
#[async_trait]
pub trait CommentSink: Send + 'static {
    /// Deliver one frame to the viewer
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ConnectionError>;

    /// Close the connection; further sends fail
    async fn close(&mut self);
}

/// Inbound half of a viewer connection
#[async_trait]
pub trait CommentSource: Send {
    /// Wait for the next text frame
    ///
    /// Returns `Ok(None)` once the peer has closed the connection normally.
    async fn recv(&mut self) -> Result<Option<String>, ConnectionError>;
}

/// Sink that forwards every delivered batch into an mpsc channel
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Vec<OutboundMessage>>>,
}

impl ChannelSink {
    /// Create a sink and the receiver observing it
    ///
    /// The receiver yields `None` once the sink is closed (or dropped).
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Vec<OutboundMessage>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }
}

#[async_trait]
impl CommentSink for ChannelSink {
    async fn send(&mut self, frame: &OutboundFrame) -> Result<(), ConnectionError> {
        let tx = self.tx.as_ref().ok_or(ConnectionError::Closed)?;
        tx.send(frame.messages().to_vec())
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

/// Source fed by an mpsc channel; dropping the sender closes it
pub struct ChannelSource {
    rx: mpsc::Receiver<String>,
}

impl ChannelSource {
    /// Create a source and the sender feeding it
    pub fn new(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl CommentSource for ChannelSource {
    async fn recv(&mut self) -> Result<Option<String>, ConnectionError> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::protocol::Poster;

    use super::*;

    fn frame() -> OutboundFrame {
        OutboundFrame::single(OutboundMessage {
            comment_id: 1,
            message: "hello".into(),
            poster: Poster::Id(3),
            time_of_media: 12,
            created_at: Utc::now(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_channel_sink_delivers() {
        let (mut sink, mut rx) = ChannelSink::new(4);

        sink.send(&frame()).await.unwrap();

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].message, "hello");
    }

    #[tokio::test]
    async fn test_channel_sink_close() {
        let (mut sink, mut rx) = ChannelSink::new(4);

        sink.close().await;

        assert!(matches!(sink.send(&frame()).await, Err(ConnectionError::Closed)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_receiver_dropped() {
        let (mut sink, rx) = ChannelSink::new(4);
        drop(rx);

        assert!(matches!(sink.send(&frame()).await, Err(ConnectionError::Closed)));
    }
}
