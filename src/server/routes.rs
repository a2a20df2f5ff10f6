//! HTTP routes
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | liveness text |
//! | `GET /ws?media_id=<key>` | upgrade to a viewer session for `<key>` |
//! | `POST /make-comment` | store a comment without live fan-out |
//! | `GET /get-comments` | comments of a media at one exact position |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::persistence::{Comment, CommentStore, NewComment, StoreError};
use crate::protocol::Poster;
use crate::registry::{HubRegistry, MediaKey};
use crate::session::ClientSession;

use super::websocket;

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    registry: Arc<HubRegistry>,
    limiter: Option<Arc<Semaphore>>,
}

impl AppState {
    /// Create the state; `max_connections == 0` leaves viewer sessions unlimited
    pub fn new(registry: Arc<HubRegistry>, max_connections: usize) -> Self {
        let limiter = (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections)));
        Self { registry, limiter }
    }

    pub fn registry(&self) -> &Arc<HubRegistry> {
        &self.registry
    }

    fn store(&self) -> &Arc<dyn CommentStore> {
        self.registry.store()
    }

    fn admit(&self) -> Result<Option<OwnedSemaphorePermit>, ApiError> {
        match &self.limiter {
            Some(limiter) => Arc::clone(limiter)
                .try_acquire_owned()
                .map(Some)
                .map_err(|_| ApiError::unavailable("Too many connections")),
            None => Ok(None),
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/ws", get(ws_handler))
        .route("/make-comment", post(make_comment))
        .route("/get-comments", get(get_comments))
        .with_state(state)
}

/// Error answered as `{"error": "<message>"}`
#[derive(Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MediaNotFound(_) => Self::bad_request("Error finding media in database"),
            other => {
                tracing::error!(error = %other, "Storage request failed");
                Self::internal("Error querying database")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection, "Rejected request body");
        Self::bad_request("Invalid body")
    }
}

async fn hello() -> &'static str {
    "Hello world!"
}

#[derive(Debug, Deserialize)]
struct WsParams {
    media_id: Option<String>,
}

async fn ws_handler(
    State(state): State<AppState>,
    ConnectInfo(peer_addr): ConnectInfo<SocketAddr>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let media_key = params
        .media_id
        .and_then(MediaKey::new)
        .ok_or_else(|| ApiError::bad_request("media_id is required"))?;

    let permit = state.admit().inspect_err(|_| {
        tracing::warn!(peer = %peer_addr, media = %media_key, "Connection rejected: limit reached");
    })?;

    if let Err(e) = state.store().ensure_media(&media_key).await {
        tracing::error!(media = %media_key, error = %e, "Failed to register media");
        return Err(ApiError::internal("Error registering media"));
    }

    let registry = Arc::clone(state.registry());
    Ok(ws.on_upgrade(move |socket| async move {
        let _permit = permit;
        let (sink, source) = websocket::split(socket);
        let mut session = ClientSession::new(registry, media_key, source).with_peer(peer_addr);

        if let Err(e) = session.run(Box::new(sink)).await {
            tracing::warn!(peer = %peer_addr, error = %e, "Session failed to join");
        }
    }))
}

#[derive(Debug, Deserialize)]
struct MakeCommentRequest {
    media_id: String,
    time_of_media: i64,
    message: String,
    poster: Poster,
}

async fn make_comment(
    State(state): State<AppState>,
    body: Result<Json<MakeCommentRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(request) = body?;
    let media_key = MediaKey::new(request.media_id)
        .ok_or_else(|| ApiError::bad_request("Error finding media in database"))?;

    let inserted = state
        .store()
        .insert_comment(&NewComment {
            media_key,
            time_of_media: request.time_of_media,
            poster: request.poster,
            message: request.message,
        })
        .await?;

    tracing::debug!(comment_id = inserted.id, "Comment stored via REST");

    Ok(Json(json!({ "message": "ok" })))
}

#[derive(Debug, Deserialize)]
struct GetCommentsRequest {
    media_id: String,
    time_of_media: i64,
}

#[derive(Debug, Serialize)]
struct GetCommentsResponse {
    results: Vec<Comment>,
}

async fn get_comments(
    State(state): State<AppState>,
    body: Result<Json<GetCommentsRequest>, JsonRejection>,
) -> Result<Json<GetCommentsResponse>, ApiError> {
    let Json(request) = body?;
    let media_key = MediaKey::new(request.media_id)
        .ok_or_else(|| ApiError::bad_request("Error finding media in database"))?;

    let results = state
        .store()
        .comments_in_range(&media_key, request.time_of_media, request.time_of_media)
        .await?;

    Ok(Json(GetCommentsResponse { results }))
}
