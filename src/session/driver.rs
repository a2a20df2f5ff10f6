//! Viewer receive loop
//!
//! Joins the hub of the connection's media, then forwards every decoded frame
//! to it until the connection ends. The client is always unregistered when the
//! loop exits, whether the peer closed, the transport failed, a frame was
//! malformed, or the future itself was dropped.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::hub::{ClientId, HubHandle, Membership};
use crate::protocol::InboundMessage;
use crate::registry::{HubRegistry, MediaKey, RegistryError};

use super::connection::{CommentSink, CommentSource};
use super::context::SessionContext;

/// Why a session's receive loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer closed the connection
    PeerClosed,
    /// The transport reported an error
    ConnectionError,
    /// The peer sent a frame that could not be decoded
    Malformed,
    /// The hub stopped accepting events (e.g. it dropped this client)
    HubClosed,
}

/// Drives one viewer connection
pub struct ClientSession<S> {
    registry: Arc<HubRegistry>,
    source: S,
    context: SessionContext,
}

impl<S: CommentSource> ClientSession<S> {
    /// Create a session for a connection bound to `media_key`
    pub fn new(registry: Arc<HubRegistry>, media_key: MediaKey, source: S) -> Self {
        Self {
            registry,
            source,
            context: SessionContext::new(media_key),
        }
    }

    /// Record the remote address for logging
    pub fn with_peer(mut self, peer_addr: SocketAddr) -> Self {
        self.context.peer_addr = Some(peer_addr);
        self
    }

    /// Get the session context
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Join the hub, run the receive loop, then leave the hub
    pub async fn run(&mut self, sink: Box<dyn CommentSink>) -> Result<SessionEnd, RegistryError> {
        let membership = self.registry.join(&self.context.media_key, sink).await?;
        self.context.client_id = Some(membership.client_id);

        tracing::info!(
            media = %self.context.media_key,
            client_id = %membership.client_id,
            peer = ?self.context.peer_addr,
            "Client connected"
        );

        let guard = LeaveGuard::new(&membership);
        let end = self.receive_loop(&membership).await;
        guard.leave().await;

        tracing::info!(
            media = %self.context.media_key,
            client_id = %membership.client_id,
            reason = ?end,
            posts = self.context.posts_forwarded,
            replays = self.context.replays_requested,
            duration_secs = self.context.duration().as_secs(),
            "Client disconnected"
        );

        Ok(end)
    }

    async fn receive_loop(&mut self, membership: &Membership) -> SessionEnd {
        loop {
            let text = match self.source.recv().await {
                Ok(Some(text)) => text,
                Ok(None) => return SessionEnd::PeerClosed,
                Err(e) => {
                    tracing::warn!(
                        media = %self.context.media_key,
                        client_id = %membership.client_id,
                        error = %e,
                        "Connection error"
                    );
                    return SessionEnd::ConnectionError;
                }
            };

            let message = match InboundMessage::decode(&text, &self.context.media_key) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(
                        media = %self.context.media_key,
                        client_id = %membership.client_id,
                        error = %e,
                        "Malformed frame, closing connection"
                    );
                    return SessionEnd::Malformed;
                }
            };

            let forwarded = match message {
                InboundMessage::Post(post) => {
                    self.context.posts_forwarded += 1;
                    membership.hub.ingest(post).await
                }
                InboundMessage::Replay(request) => {
                    let window = request.window(self.registry.config().replay_radius);
                    self.context.window = window;
                    self.context.replays_requested += 1;
                    membership.hub.replay(membership.client_id, window).await
                }
            };

            if forwarded.is_err() {
                return SessionEnd::HubClosed;
            }
        }
    }
}

/// Unregisters a client when dropped, unless it already left
struct LeaveGuard {
    hub: Option<HubHandle>,
    client_id: ClientId,
}

impl LeaveGuard {
    fn new(membership: &Membership) -> Self {
        Self {
            hub: Some(membership.hub.clone()),
            client_id: membership.client_id,
        }
    }

    async fn leave(mut self) {
        if let Some(hub) = self.hub.take() {
            if hub.unregister(self.client_id).await.is_err() {
                tracing::debug!(client_id = %self.client_id, "Hub already closed on leave");
            }
        }
    }
}

impl Drop for LeaveGuard {
    fn drop(&mut self) {
        let Some(hub) = self.hub.take() else {
            return;
        };
        let client_id = self.client_id;

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = hub.unregister(client_id).await;
            });
        }
    }
}
