//! PostgreSQL comment store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::protocol::Poster;
use crate::registry::MediaKey;

use super::error::StoreError;
use super::model::{Comment, InsertedComment, NewComment};
use super::port::CommentStore;

/// Tables used by [`PgCommentStore`]
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS media (
    id            BIGSERIAL PRIMARY KEY,
    media_host_id TEXT NOT NULL UNIQUE,
    title         TEXT NOT NULL,
    media_type    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comments (
    id            BIGSERIAL PRIMARY KEY,
    time_of_media BIGINT NOT NULL,
    media_id      BIGINT NOT NULL REFERENCES media (id),
    poster        TEXT NOT NULL,
    message       TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS comments_media_time_idx ON comments (media_id, time_of_media);
"#;

/// Title given to media registered implicitly by a viewer connecting
pub const PLACEHOLDER_TITLE: &str = "CHANGE_THIS_TITLE";

/// Media type given to media registered implicitly by a viewer connecting
pub const PLACEHOLDER_MEDIA_TYPE: &str = "CHANGE_THIS_MEDIA_TYPE";

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    time_of_media: i64,
    media_host_id: String,
    poster: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl CommentRow {
    fn into_comment(self) -> Option<Comment> {
        Some(Comment {
            id: self.id,
            time_of_media: self.time_of_media,
            media_key: MediaKey::new(self.media_host_id)?,
            poster: Poster::from_stored(&self.poster),
            message: self.message,
            created_at: self.created_at,
        })
    }
}

/// Comment store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgCommentStore {
    pool: PgPool,
}

impl PgCommentStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a new pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "Connected to database");
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn media_id(&self, media_key: &MediaKey) -> Result<i64, StoreError> {
        sqlx::query_scalar::<_, i64>("SELECT id FROM media WHERE media_host_id = $1")
            .bind(media_key.as_str())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::MediaNotFound(media_key.to_string()))
    }
}

#[async_trait]
impl CommentStore for PgCommentStore {
    async fn ensure_media(&self, media_key: &MediaKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO media (media_host_id, title, media_type) \
             VALUES ($1, $2, $3) \
             ON CONFLICT DO NOTHING",
        )
        .bind(media_key.as_str())
        .bind(PLACEHOLDER_TITLE)
        .bind(PLACEHOLDER_MEDIA_TYPE)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<InsertedComment, StoreError> {
        let media_id = self.media_id(&comment.media_key).await?;

        let (id, created_at) = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            "INSERT INTO comments (media_id, time_of_media, poster, message) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, created_at",
        )
        .bind(media_id)
        .bind(comment.time_of_media)
        .bind(comment.poster.to_stored())
        .bind(&comment.message)
        .fetch_one(&self.pool)
        .await?;

        Ok(InsertedComment { id, created_at })
    }

    async fn comments_in_range(
        &self,
        media_key: &MediaKey,
        min_time: i64,
        max_time: i64,
    ) -> Result<Vec<Comment>, StoreError> {
        let media_id = self.media_id(media_key).await?;

        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT c.id, c.time_of_media, m.media_host_id, c.poster, c.message, c.created_at \
             FROM comments c \
             JOIN media m ON m.id = c.media_id \
             WHERE c.media_id = $1 AND c.time_of_media BETWEEN $2 AND $3 \
             ORDER BY c.id",
        )
        .bind(media_id)
        .bind(min_time)
        .bind(max_time)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(CommentRow::into_comment).collect())
    }
}
