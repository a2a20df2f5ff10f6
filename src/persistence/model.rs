//! Stored comment records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{Post, Poster};
use crate::registry::MediaKey;

/// A stored comment; immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    /// Storage-assigned id
    pub id: i64,
    /// Playback position the comment is anchored to
    pub time_of_media: i64,
    /// Media the comment belongs to
    #[serde(rename = "media_id")]
    pub media_key: MediaKey,
    /// Who posted it
    pub poster: Poster,
    /// Comment text
    pub message: String,
    /// Storage-assigned creation time
    pub created_at: DateTime<Utc>,
}

/// Fields of a comment about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub media_key: MediaKey,
    pub time_of_media: i64,
    pub poster: Poster,
    pub message: String,
}

impl From<&Post> for NewComment {
    fn from(post: &Post) -> Self {
        Self {
            media_key: post.media_key.clone(),
            time_of_media: post.time_of_media,
            poster: post.poster.clone(),
            message: post.message.clone(),
        }
    }
}

/// What storage assigns to a freshly inserted comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertedComment {
    pub id: i64,
    pub created_at: DateTime<Utc>,
}
