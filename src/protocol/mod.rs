//! Comment wire protocol
//!
//! JSON frames exchanged with viewers over their WebSocket connection.

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{
    InboundMessage, OutboundFrame, OutboundMessage, Post, Poster, ReplayRequest, ReplayWindow,
    DEFAULT_REPLAY_RADIUS, REPLAY_SENTINEL, UNPERSISTED_COMMENT_ID,
};
