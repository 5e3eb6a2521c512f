use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::config::UploadConfig;
use crate::storage::{Storage, StorageError};
use crate::tracking::{extract_fingerprint, TrackError, Tracker};
use crate::uploads::{self, ObjectStore, UploadError};

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub objects: Arc<dyn ObjectStore>,
    pub tracker: Tracker,
    pub upload: UploadConfig,
    pub public_base_url: String,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct UploadResponse {
    #[serde(rename = "imageUrl")]
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct ShortenRequest {
    pub image_url: String,
}

#[derive(Serialize)]
pub struct ShortenResponse {
    pub short_url: String,
}

#[derive(Deserialize)]
pub struct TrackQuery {
    pub image_url: Option<String>,
}

const SHORT_ID_LEN: usize = 7;
const SHORT_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

/// Generate a random short id over the URL-safe alphabet
pub fn generate_short_id() -> String {
    let mut rng = rand::rng();
    (0..SHORT_ID_LEN)
        .map(|_| SHORT_ID_ALPHABET[rng.random_range(0..SHORT_ID_ALPHABET.len())] as char)
        .collect()
}

/// Accept a multipart image upload, store it, and return its public URL
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, Json<ErrorResponse>)> {
    let mut file: Option<(String, axum::body::Bytes, Option<String>)> = None;
    let mut promotion: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("Invalid multipart request: {}", e),
                    }),
                ));
            }
        };

        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let declared = field.content_type().map(|t| t.to_string());
                let data = field.bytes().await.map_err(|e| {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse {
                            error: format!("Failed to read file field: {}", e),
                        }),
                    )
                })?;
                file = Some((filename, data, declared));
            }
            Some("promotion") => {
                promotion = field.text().await.ok().filter(|p| !p.is_empty());
            }
            _ => {}
        }
    }

    let (filename, data, declared) = file.ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: UploadError::MissingFile.to_string(),
            }),
        )
    })?;

    let content_type = declared.unwrap_or_else(|| {
        mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string()
    });

    if let Err(e) = uploads::validate_upload(&content_type, data.len(), &state.upload) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        ));
    }

    let name = uploads::object_name(&filename, Utc::now().timestamp_millis());
    if let Err(e) = state.objects.put(&name, &data).await {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to store image: {}", e),
            }),
        ));
    }

    let image_url = format!("{}/files/{}", state.public_base_url, name);

    // Seed the access log with count 0; failure does not fail the upload
    if let Err(err) = state
        .storage
        .seed_access_log(&image_url, promotion.as_deref(), Utc::now().timestamp())
        .await
    {
        warn!(url = %image_url, error = %err, "failed to seed access log for upload");
    }

    Ok(Json(UploadResponse { image_url }))
}

/// Create (or return the existing) short link for an image URL
pub async fn shorten_url(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ShortenRequest>,
) -> Result<Json<ShortenResponse>, (StatusCode, Json<ErrorResponse>)> {
    if !payload.image_url.starts_with("https://") {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Valid image_url is required".to_string(),
            }),
        ));
    }

    let short_id = generate_short_id();
    let now = Utc::now().timestamp();

    match state
        .storage
        .lookup_or_create_short(&payload.image_url, &short_id, now)
        .await
    {
        Ok(url) => Ok(Json(ShortenResponse {
            short_url: format!("{}/i/{}", state.public_base_url, url.short_id),
        })),
        Err(StorageError::Conflict) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to shorten URL".to_string(),
            }),
        )),
        Err(StorageError::Other(e)) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to shorten URL: {}", e),
            }),
        )),
    }
}

/// Record an image access (unless a duplicate) and proxy the origin bytes
pub async fn track_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrackQuery>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    let image_url = match query.image_url {
        Some(url) if url.starts_with("https://") => url,
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Valid image_url is required".to_string(),
                }),
            ));
        }
    };

    let fingerprint = extract_fingerprint(&headers);

    let image = state
        .tracker
        .track(&image_url, &fingerprint)
        .await
        .map_err(|e| match e {
            TrackError::Record(err) => {
                tracing::error!(url = %image_url, error = %err, "failed to record access");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Failed to update count".to_string(),
                    }),
                )
            }
            TrackError::OriginFetch(_) | TrackError::OriginStatus(_) => (
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: "Failed to fetch image".to_string(),
                }),
            ),
        })?;

    // Caching is disabled so every view reaches this endpoint
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&image.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("image/jpeg")),
    );
    response_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache, must-revalidate, proxy-revalidate"),
    );
    response_headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response_headers.insert(header::EXPIRES, HeaderValue::from_static("0"));

    Ok((response_headers, image.bytes))
}

/// Health check endpoint
pub async fn health_check() -> Json<SuccessResponse> {
    Json(SuccessResponse {
        message: "OK".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_length_and_alphabet() {
        for _ in 0..100 {
            let id = generate_short_id();
            assert_eq!(id.len(), 7);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }
}
