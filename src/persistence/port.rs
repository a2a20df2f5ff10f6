//! Storage port consumed by the hubs and the HTTP routes

use async_trait::async_trait;

use crate::registry::MediaKey;

use super::error::StoreError;
use super::model::{Comment, InsertedComment, NewComment};

/// Comment storage
///
/// Implementations must be safe to share between every hub of the process.
/// Calls are awaited inline by a hub's event loop, so a slow call delays every
/// other event of that hub (and only that hub).
#[async_trait]
pub trait CommentStore: Send + Sync + 'static {
    /// Register a media key if it is not known yet
    async fn ensure_media(&self, media_key: &MediaKey) -> Result<(), StoreError>;

    /// Store a new comment and return its assigned id and creation time
    async fn insert_comment(&self, comment: &NewComment) -> Result<InsertedComment, StoreError>;

    /// Comments of `media_key` with `min_time <= time_of_media <= max_time`,
    /// in insertion order
    async fn comments_in_range(
        &self,
        media_key: &MediaKey,
        min_time: i64,
        max_time: i64,
    ) -> Result<Vec<Comment>, StoreError>;
}
