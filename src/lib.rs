//! # loudmouth
//!
//! Real-time, timeline-anchored comments for viewers of shared media.
//!
//! Viewers open a WebSocket scoped to a media id, post comments anchored to a
//! playback position and receive both live comments from everyone watching the
//! same media and, when they seek, the history recorded around their new
//! position.
//!
//! ## Architecture
//!
//! ```text
//!  viewer ──ws──► session ──► HubHandle ──► Hub (one task per media)
//!                                             │
//!                                             ├──► CommentStore (insert / range)
//!                                             └──► every viewer's CommentSink
//! ```
//!
//! - [`registry::HubRegistry`] creates a hub on the first connection for a
//!   media and drops it when the last viewer leaves.
//! - [`hub`] applies joins, leaves, live comments and replays one at a time.
//! - [`persistence::CommentStore`] is the storage port, backed by PostgreSQL or
//!   by memory.
//! - [`server`] exposes it all over axum.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use loudmouth::persistence::MemoryCommentStore;
//! use loudmouth::server::{CommentServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> loudmouth::Result<()> {
//!     let server = CommentServer::new(
//!         ServerConfig::default(),
//!         Arc::new(MemoryCommentStore::new()),
//!     );
//!     server.run().await
//! }
//! ```

pub mod error;
pub mod hub;
pub mod persistence;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use error::{Error, Result};
pub use persistence::{CommentStore, MemoryCommentStore, PgCommentStore};
pub use protocol::{InboundMessage, OutboundMessage, Poster, ReplayWindow};
pub use registry::{HubConfig, HubRegistry, MediaKey};
pub use server::{CommentServer, ServerConfig};
