use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{health_check, shorten_url, track_image, upload_image, AppState};
use super::stats::{detail_stats, list_stats, refresh_stats, set_promotion};

pub fn create_api_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    // Body limit sits above the upload cap so oversized files are rejected
    // with the validation error instead of a generic 413
    let body_limit = state.upload.max_bytes + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/upload", post(upload_image))
        .route("/shorten", post(shorten_url))
        .route("/track-image", get(track_image))
        .route("/stats", get(list_stats))
        .route("/stats/detail", get(detail_stats))
        .route("/stats/refresh", post(refresh_stats))
        .route("/stats/promotion", put(set_promotion))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}
