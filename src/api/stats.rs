//! Stats dashboard handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::host_of;
use crate::models::{DetailedStats, ImageSummary};

use super::handlers::{AppState, ErrorResponse, SuccessResponse};

const MAX_PAGE_SIZE: i64 = 100;
const TOP_REFERRERS: i64 = 10;
const RECENT_RECORDS: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
    pub search: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct DetailQuery {
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct PromotionRequest {
    pub image_url: String,
    pub promotion: String,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct StatsPage {
    pub data: Vec<ImageSummary>,
    pub pagination: Pagination,
}

fn total_pages(total: i64, limit: i64) -> i64 {
    (total + limit - 1) / limit
}

/// Paginated summary listing with optional promotion-label search
pub async fn list_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsPage>, (StatusCode, Json<ErrorResponse>)> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * limit;
    let search = query.search.as_deref().filter(|s| !s.is_empty());

    let total = state
        .storage
        .count_summaries(search)
        .await
        .map_err(list_error)?;
    let data = state
        .storage
        .list_summaries(limit, offset, search)
        .await
        .map_err(list_error)?;

    Ok(Json(StatsPage {
        data,
        pagination: Pagination {
            total,
            page,
            limit,
            total_pages: total_pages(total, limit),
        },
    }))
}

fn list_error(e: anyhow::Error) -> (StatusCode, Json<ErrorResponse>) {
    tracing::error!(error = %e, "failed to list stats");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "Failed to retrieve statistics".to_string(),
        }),
    )
}

/// Detailed per-URL statistics
pub async fn detail_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DetailQuery>,
) -> Result<Json<DetailedStats>, (StatusCode, Json<ErrorResponse>)> {
    let self_host = host_of(&state.public_base_url);

    match state
        .storage
        .detailed_stats(&query.image_url, self_host, TOP_REFERRERS, RECENT_RECORDS)
        .await
    {
        Ok(Some(stats)) => Ok(Json(stats)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "URL not found".to_string(),
            }),
        )),
        Err(e) => {
            tracing::error!(url = %query.image_url, error = %e, "failed to load detailed stats");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to retrieve detailed statistics".to_string(),
                }),
            ))
        }
    }
}

/// Rebuild the precomputed summary table
pub async fn refresh_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    match state.storage.refresh_summary().await {
        Ok(()) => Ok(Json(SuccessResponse {
            message: "Statistics refreshed".to_string(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "failed to refresh summary");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to refresh statistics".to_string(),
                }),
            ))
        }
    }
}

/// Set or replace the promotion label for a URL
pub async fn set_promotion(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PromotionRequest>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    if payload.image_url.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "image_url cannot be empty".to_string(),
            }),
        ));
    }

    match state
        .storage
        .set_promotion(&payload.image_url, &payload.promotion, Utc::now().timestamp())
        .await
    {
        Ok(()) => Ok(Json(SuccessResponse {
            message: "Promotion updated".to_string(),
        })),
        Err(e) => {
            tracing::error!(url = %payload.image_url, error = %e, "failed to set promotion");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to update promotion".to_string(),
                }),
            ))
        }
    }
}
