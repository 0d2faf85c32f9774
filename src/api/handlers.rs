//! Axum handlers for the wish endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::{ProxyError, VideoError};
use crate::wish::{GenerationResult, VideoJobReference, VideoPrompt, WishDetails};

/// Failure body: `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "detail": self.detail })),
        )
            .into_response()
    }
}

impl From<VideoError> for ApiError {
    fn from(err: VideoError) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            detail: format!("Video generation failed: {}", err),
        }
    }
}

impl From<ProxyError> for ApiError {
    fn from(err: ProxyError) -> Self {
        let status = if err.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            detail: format!("Video proxy failed: {}", err),
        }
    }
}

/// Query string of `/proxy-video`.
#[derive(Debug, Deserialize)]
pub struct ProxyParams {
    pub uri: String,
}

/// POST /generate-transcript - Write a Santa letter. Never fails.
pub async fn generate_transcript(
    State(state): State<Arc<AppState>>,
    Json(details): Json<WishDetails>,
) -> Json<GenerationResult> {
    Json(state.transcripts.generate(&details).await)
}

/// POST /generate-video - Render a clip and return its relay reference.
pub async fn generate_video(
    State(state): State<Arc<AppState>>,
    Json(prompt): Json<VideoPrompt>,
) -> Result<Json<VideoJobReference>, ApiError> {
    match state.videos.submit(&prompt).await {
        Ok(reference) => Ok(Json(reference)),
        Err(e) => {
            tracing::error!(error = %e, "Video generation failed");
            Err(e.into())
        }
    }
}

/// GET /proxy-video?uri=... - Stream a finished clip.
pub async fn proxy_video(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ProxyParams>,
) -> Result<Response, ApiError> {
    let media = state.proxy.open(&params.uri).await.map_err(|e| {
        tracing::error!(error = %e, "Video proxy failed");
        ApiError::from(e)
    })?;

    let mut response = Response::new(Body::from_stream(media.body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(media.content_type),
    );
    if let Some(length) = media.content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(response)
}

/// GET /health - Liveness plus the active generation mode.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "mode": state.mode.as_str(),
    }))
}
