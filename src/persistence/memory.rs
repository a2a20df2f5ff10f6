//! In-process comment store
//!
//! Keeps media and comments in memory for tests, demos and single-process
//! deployments that do not need history across restarts.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::protocol::ReplayWindow;
use crate::registry::MediaKey;

use super::error::StoreError;
use super::model::{Comment, InsertedComment, NewComment};
use super::port::CommentStore;

#[derive(Default)]
struct MemoryState {
    media: HashSet<MediaKey>,
    comments: Vec<Comment>,
    next_id: i64,
}

/// Comment store backed by process memory
#[derive(Default)]
pub struct MemoryCommentStore {
    state: RwLock<MemoryState>,
}

impl MemoryCommentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored comments
    pub async fn comment_count(&self) -> usize {
        self.state.read().await.comments.len()
    }

    /// Whether a media key has been registered
    pub async fn has_media(&self, media_key: &MediaKey) -> bool {
        self.state.read().await.media.contains(media_key)
    }
}

#[async_trait]
impl CommentStore for MemoryCommentStore {
    async fn ensure_media(&self, media_key: &MediaKey) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.media.insert(media_key.clone()) {
            tracing::debug!(media = %media_key, "Media registered");
        }
        Ok(())
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<InsertedComment, StoreError> {
        let mut state = self.state.write().await;

        if !state.media.contains(&comment.media_key) {
            return Err(StoreError::MediaNotFound(comment.media_key.to_string()));
        }

        state.next_id += 1;
        let inserted = InsertedComment {
            id: state.next_id,
            created_at: Utc::now(),
        };

        state.comments.push(Comment {
            id: inserted.id,
            time_of_media: comment.time_of_media,
            media_key: comment.media_key.clone(),
            poster: comment.poster.clone(),
            message: comment.message.clone(),
            created_at: inserted.created_at,
        });

        Ok(inserted)
    }

    async fn comments_in_range(
        &self,
        media_key: &MediaKey,
        min_time: i64,
        max_time: i64,
    ) -> Result<Vec<Comment>, StoreError> {
        let state = self.state.read().await;

        if !state.media.contains(media_key) {
            return Err(StoreError::MediaNotFound(media_key.to_string()));
        }

        let window = ReplayWindow {
            min_time_of_media: min_time,
            max_time_of_media: max_time,
        };

        Ok(state
            .comments
            .iter()
            .filter(|c| &c.media_key == media_key)
            .filter(|c| window.contains(c.time_of_media))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::protocol::Poster;

    use super::*;

    fn comment(media: &MediaKey, time_of_media: i64, message: &str) -> NewComment {
        NewComment {
            media_key: media.clone(),
            time_of_media,
            poster: Poster::Id(1),
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn test_insert_requires_media() {
        let store = MemoryCommentStore::new();
        let media = MediaKey::new("abc").unwrap();

        let result = store.insert_comment(&comment(&media, 1, "early")).await;
        assert!(matches!(result, Err(StoreError::MediaNotFound(_))));

        store.ensure_media(&media).await.unwrap();
        let inserted = store.insert_comment(&comment(&media, 1, "ok")).await.unwrap();
        assert_eq!(inserted.id, 1);
        assert!(store.has_media(&media).await);
    }

    #[tokio::test]
    async fn test_ensure_media_is_idempotent() {
        let store = MemoryCommentStore::new();
        let media = MediaKey::new("abc").unwrap();

        tokio_test::assert_ok!(store.ensure_media(&media).await);
        tokio_test::assert_ok!(store.ensure_media(&media).await);
        assert!(store.has_media(&media).await);
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_ordered() {
        let store = MemoryCommentStore::new();
        let media = MediaKey::new("abc").unwrap();
        let other = MediaKey::new("other").unwrap();
        store.ensure_media(&media).await.unwrap();
        store.ensure_media(&other).await.unwrap();

        store.insert_comment(&comment(&media, 115, "upper")).await.unwrap();
        store.insert_comment(&comment(&media, 94, "below")).await.unwrap();
        store.insert_comment(&comment(&media, 95, "lower")).await.unwrap();
        store.insert_comment(&comment(&other, 100, "elsewhere")).await.unwrap();
        store.insert_comment(&comment(&media, 116, "above")).await.unwrap();

        let found = store.comments_in_range(&media, 95, 115).await.unwrap();
        let messages: Vec<_> = found.iter().map(|c| c.message.as_str()).collect();

        assert_eq!(messages, vec!["upper", "lower"]);
        assert_eq!(store.comment_count().await, 5);
    }

    #[tokio::test]
    async fn test_range_for_unknown_media() {
        let store = MemoryCommentStore::new();
        let media = MediaKey::new("ghost").unwrap();

        tokio_test::assert_err!(store.comments_in_range(&media, 0, 10).await);
    }
}
