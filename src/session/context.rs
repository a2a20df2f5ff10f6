//! Session context
//!
//! Per-connection state kept by a viewer's receive loop.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use crate::hub::ClientId;
use crate::protocol::ReplayWindow;
use crate::registry::MediaKey;

/// State of one viewer connection, owned by its receive loop
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Media the connection is bound to
    pub media_key: MediaKey,

    /// Client id assigned by the hub (None until joined)
    pub client_id: Option<ClientId>,

    /// Remote peer address, when known
    pub peer_addr: Option<SocketAddr>,

    /// Last replay window this viewer asked for
    pub window: ReplayWindow,

    /// Live comments forwarded to the hub
    pub posts_forwarded: u64,

    /// Replay requests forwarded to the hub
    pub replays_requested: u64,

    /// Connection start time
    pub connected_at: Instant,
}

impl SessionContext {
    /// Create a new context
    pub fn new(media_key: MediaKey) -> Self {
        Self {
            media_key,
            client_id: None,
            peer_addr: None,
            window: ReplayWindow::default(),
            posts_forwarded: 0,
            replays_requested: 0,
            connected_at: Instant::now(),
        }
    }

    /// Get session duration
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
