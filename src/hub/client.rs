//! Per-connection client state owned by a hub

use std::fmt;
use std::time::{Duration, Instant};

use crate::protocol::{OutboundFrame, ReplayWindow};
use crate::session::{CommentSink, ConnectionError};

/// Process-unique identifier of a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(u64);

impl ClientId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered viewer as seen by its hub
pub struct Client {
    id: ClientId,
    window: ReplayWindow,
    sink: Box<dyn CommentSink>,
    joined_at: Instant,
}

impl Client {
    /// Create a client that delivers through `sink`
    pub fn new(id: ClientId, sink: Box<dyn CommentSink>) -> Self {
        Self {
            id,
            window: ReplayWindow::default(),
            sink,
            joined_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Last replay window requested by this client
    pub fn window(&self) -> ReplayWindow {
        self.window
    }

    /// Time since the client registered
    pub fn connected_for(&self) -> Duration {
        self.joined_at.elapsed()
    }

    pub(crate) fn set_window(&mut self, window: ReplayWindow) {
        self.window = window;
    }

    /// Deliver a frame, failing if it takes longer than `limit`
    pub(crate) async fn deliver(
        &mut self,
        frame: &OutboundFrame,
        limit: Duration,
    ) -> Result<(), ConnectionError> {
        match tokio::time::timeout(limit, self.sink.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout),
        }
    }

    pub(crate) async fn close(&mut self) {
        self.sink.close().await;
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
