use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect},
    Json,
};
use std::sync::Arc;

use crate::api::handlers::ErrorResponse;
use crate::storage::Storage;

pub struct RedirectState {
    pub storage: Arc<dyn Storage>,
}

/// Resolve a short id and redirect to the tracking endpoint
pub async fn redirect_short(
    State(state): State<Arc<RedirectState>>,
    Path(short_id): Path<String>,
) -> impl IntoResponse {
    match state.storage.resolve_short(&short_id).await {
        Ok(Some(original_url)) => {
            let target = format!(
                "/api/track-image?image_url={}",
                urlencoding::encode(&original_url)
            );
            Redirect::temporary(&target).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "URL not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(short_id = %short_id, error = %e, "failed to resolve short id");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            )
                .into_response()
        }
    }
}
