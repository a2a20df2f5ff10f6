//! HTTP and WebSocket server
//!
//! Exposes viewer sessions over `GET /ws` plus the REST comment routes, all on
//! one axum router.

pub mod config;
pub mod listener;
pub mod routes;
pub mod websocket;

pub use config::{ConfigError, ServerConfig};
pub use listener::CommentServer;
pub use routes::{router, ApiError, AppState};
