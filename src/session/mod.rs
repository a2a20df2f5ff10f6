//! Viewer sessions
//!
//! A session owns one viewer connection for its whole life: it joins the hub of
//! the connection's media, turns inbound frames into hub events and leaves the
//! hub when the connection ends. The transport is abstracted behind
//! [`CommentSource`] and [`CommentSink`], so sessions run the same over a
//! WebSocket or over in-process channels.

pub mod connection;
pub mod context;
pub mod driver;

pub use connection::{ChannelSink, ChannelSource, CommentSink, CommentSource, ConnectionError};
pub use context::SessionContext;
pub use driver::{ClientSession, SessionEnd};
