//! Comment wire messages
//!
//! Inbound frames are JSON objects:
//!
//! ```json
//! {"message": "hi", "poster": 42, "time_of_media": 100, "media_id": "abc"}
//! ```
//!
//! A frame whose `poster` equals [`REPLAY_SENTINEL`] is a replay request for the
//! history around `time_of_media`. The sentinel is resolved here, at decode time,
//! so the rest of the crate only ever sees the tagged [`InboundMessage`].
//!
//! Outbound frames are always JSON arrays of comments, one element for a live
//! comment and any number for a replay.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persistence::{Comment, InsertedComment};
use crate::registry::MediaKey;

use super::error::ProtocolError;

/// Poster value that marks a replay request on the wire
pub const REPLAY_SENTINEL: &str = "PING_POSTER";

/// Half-width of the replay window around the requested position
pub const DEFAULT_REPLAY_RADIUS: i64 = 10;

/// Comment id sent when the comment could not be persisted
pub const UNPERSISTED_COMMENT_ID: i64 = 0;

/// Identity of whoever posted a comment
///
/// Clients send either a numeric user id or a display name; the value is echoed
/// back in the form it arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Poster {
    /// Numeric user id
    Id(i64),
    /// Free-form display name
    Name(String),
}

impl Poster {
    /// Rebuild a poster from its stored text form
    ///
    /// Stored values are JSON, so `42` is an id and `"42"` a name. Text that is
    /// not valid JSON is read as a bare name.
    pub fn from_stored(stored: &str) -> Self {
        serde_json::from_str(stored).unwrap_or_else(|_| Poster::Name(stored.to_string()))
    }

    /// Text form used by the persistence layer; keeps the id/name distinction
    pub fn to_stored(&self) -> String {
        match self {
            Poster::Id(id) => id.to_string(),
            Poster::Name(name) => serde_json::Value::String(name.clone()).to_string(),
        }
    }

    fn is_replay_sentinel(&self) -> bool {
        matches!(self, Poster::Name(name) if name == REPLAY_SENTINEL)
    }
}

impl fmt::Display for Poster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Poster::Id(id) => write!(f, "{}", id),
            Poster::Name(name) => f.write_str(name),
        }
    }
}

/// Inclusive range of media positions a client wants history for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayWindow {
    /// Lower bound (inclusive, never negative)
    pub min_time_of_media: i64,
    /// Upper bound (inclusive, never negative)
    pub max_time_of_media: i64,
}

impl ReplayWindow {
    /// Window of `radius` on each side of `time_of_media`, clamped at zero
    pub fn around(time_of_media: i64, radius: i64) -> Self {
        Self {
            min_time_of_media: time_of_media.saturating_sub(radius).max(0),
            max_time_of_media: time_of_media.saturating_add(radius).max(0),
        }
    }

    /// Whether `time_of_media` falls inside the window
    pub fn contains(&self, time_of_media: i64) -> bool {
        (self.min_time_of_media..=self.max_time_of_media).contains(&time_of_media)
    }
}

/// A comment posted by a viewer, to be stored and broadcast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// Comment text
    pub message: String,
    /// Who posted it
    pub poster: Poster,
    /// Playback position the comment is anchored to
    pub time_of_media: i64,
    /// Media the comment belongs to
    pub media_key: MediaKey,
}

/// A viewer asking for history around a playback position (e.g. after a seek)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayRequest {
    /// Playback position the viewer moved to
    pub time_of_media: i64,
    /// Media the request is for
    pub media_key: MediaKey,
}

impl ReplayRequest {
    /// Window of history this request covers
    pub fn window(&self, radius: i64) -> ReplayWindow {
        ReplayWindow::around(self.time_of_media, radius)
    }
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// New live comment
    Post(Post),
    /// History request
    Replay(ReplayRequest),
}

#[derive(Debug, Deserialize)]
struct WireInbound {
    #[serde(default)]
    message: String,
    poster: Poster,
    time_of_media: i64,
    #[serde(default)]
    media_id: Option<String>,
}

impl InboundMessage {
    /// Decode a text frame received on a connection bound to `connection_key`
    ///
    /// The media key of the frame is always the connection's: a frame naming a
    /// different media is rerouted to the one its connection belongs to.
    pub fn decode(text: &str, connection_key: &MediaKey) -> Result<Self, ProtocolError> {
        let wire: WireInbound = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;

        if let Some(claimed) = wire.media_id.as_deref() {
            if !claimed.is_empty() && claimed != connection_key.as_str() {
                tracing::debug!(
                    media = %connection_key,
                    claimed = claimed,
                    "Inbound frame names another media, using the connection's"
                );
            }
        }

        if wire.poster.is_replay_sentinel() {
            return Ok(InboundMessage::Replay(ReplayRequest {
                time_of_media: wire.time_of_media,
                media_key: connection_key.clone(),
            }));
        }

        Ok(InboundMessage::Post(Post {
            message: wire.message,
            poster: wire.poster,
            time_of_media: wire.time_of_media,
            media_key: connection_key.clone(),
        }))
    }
}

/// A comment as delivered to viewers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Storage id, or [`UNPERSISTED_COMMENT_ID`]
    pub comment_id: i64,
    /// Comment text
    pub message: String,
    /// Who posted it
    pub poster: Poster,
    /// Playback position the comment is anchored to
    pub time_of_media: i64,
    /// When the comment was stored
    pub created_at: DateTime<Utc>,
}

impl OutboundMessage {
    /// Live comment that was stored successfully
    pub fn persisted(post: &Post, inserted: InsertedComment) -> Self {
        Self {
            comment_id: inserted.id,
            message: post.message.clone(),
            poster: post.poster.clone(),
            time_of_media: post.time_of_media,
            created_at: inserted.created_at,
        }
    }

    /// Live comment whose insert failed; carries the sentinel id
    pub fn unpersisted(post: &Post, now: DateTime<Utc>) -> Self {
        Self {
            comment_id: UNPERSISTED_COMMENT_ID,
            message: post.message.clone(),
            poster: post.poster.clone(),
            time_of_media: post.time_of_media,
            created_at: now,
        }
    }
}

impl From<Comment> for OutboundMessage {
    fn from(comment: Comment) -> Self {
        Self {
            comment_id: comment.id,
            message: comment.message,
            poster: comment.poster,
            time_of_media: comment.time_of_media,
            created_at: comment.created_at,
        }
    }
}

/// An encoded batch of outbound comments
///
/// Encoded once and shared by every recipient of a fan-out.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    messages: Vec<OutboundMessage>,
    text: String,
}

impl OutboundFrame {
    /// Encode a batch as a JSON array
    pub fn encode(messages: Vec<OutboundMessage>) -> Result<Self, ProtocolError> {
        let text = serde_json::to_string(&messages).map_err(ProtocolError::Encode)?;
        Ok(Self { messages, text })
    }

    /// Encode a single live comment (still sent as a one-element array)
    pub fn single(message: OutboundMessage) -> Result<Self, ProtocolError> {
        Self::encode(vec![message])
    }

    /// Comments in this frame
    pub fn messages(&self) -> &[OutboundMessage] {
        &self.messages
    }

    /// JSON text of this frame
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of comments in this frame
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the frame holds no comments
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
