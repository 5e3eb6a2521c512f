use axum::body::Bytes;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::storage::{AccessOutcome, Storage};
use crate::tracking::Fingerprint;

/// Trailing window during which repeated identical requests are collapsed
/// into a single counted access. Fixed, not configurable per-request.
pub const DEDUP_WINDOW_SECS: i64 = 3;

#[derive(Debug, Error)]
pub enum TrackError {
    #[error("failed to update count")]
    Record(#[source] anyhow::Error),
    #[error("failed to fetch image")]
    OriginFetch(#[source] reqwest::Error),
    #[error("origin returned status {0}")]
    OriginStatus(reqwest::StatusCode),
}

/// Image bytes fetched from the origin, ready to proxy back
pub struct TrackedImage {
    pub content_type: String,
    pub bytes: Bytes,
}

/// Records image accesses and proxies origin bytes
///
/// Each call is independent and stateless; duplicate filtering and the
/// counter increment are delegated to the storage layer, which performs both
/// writes in one transaction.
#[derive(Clone)]
pub struct Tracker {
    storage: Arc<dyn Storage>,
    http: reqwest::Client,
}

impl Tracker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            http: reqwest::Client::new(),
        }
    }

    /// Record the access unless it duplicates a very recent identical
    /// request, then fetch and return the origin image bytes.
    pub async fn track(
        &self,
        image_url: &str,
        fingerprint: &Fingerprint,
    ) -> Result<TrackedImage, TrackError> {
        let now = Utc::now().timestamp();

        match self
            .storage
            .record_access(image_url, fingerprint, now, DEDUP_WINDOW_SECS)
            .await
        {
            Ok(AccessOutcome::Recorded) => {}
            Ok(AccessOutcome::Duplicate) => {
                debug!(url = %image_url, ip = %fingerprint.ip, "filtered duplicate request");
            }
            Err(err) => return Err(TrackError::Record(err)),
        }

        self.fetch_origin(image_url).await
    }

    async fn fetch_origin(&self, image_url: &str) -> Result<TrackedImage, TrackError> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .map_err(TrackError::OriginFetch)?;

        if !response.status().is_success() {
            return Err(TrackError::OriginStatus(response.status()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(TrackError::OriginFetch)?;

        Ok(TrackedImage {
            content_type,
            bytes,
        })
    }
}
