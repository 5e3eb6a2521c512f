use crate::models::{DetailedStats, ImageAccessLog, ImageSummary, ShortenedUrl};
use crate::tracking::Fingerprint;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("short id already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Whether an access was counted or filtered as a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Recorded,
    Duplicate,
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Initialize the storage (run migrations, etc.)
    async fn init(&self) -> Result<()>;

    /// Insert an access-log row with count 0 if none exists for the URL
    async fn seed_access_log(
        &self,
        image_url: &str,
        promotion: Option<&str>,
        now: i64,
    ) -> Result<()>;

    /// Count one access unless an identical fingerprint hit the same URL
    /// within the trailing dedup window.
    ///
    /// On a non-duplicate, the counter upsert and the history insert run in
    /// a single transaction, so `access_count` stays equal to the number of
    /// history rows for the URL.
    async fn record_access(
        &self,
        image_url: &str,
        fingerprint: &Fingerprint,
        now: i64,
        dedup_window_secs: i64,
    ) -> Result<AccessOutcome>;

    /// Get the access log row for a URL
    async fn get_access_log(&self, image_url: &str) -> Result<Option<ImageAccessLog>>;

    /// Set or replace the promotion label, creating the log row if absent
    async fn set_promotion(&self, image_url: &str, promotion: &str, now: i64) -> Result<()>;

    /// Return the existing mapping for the URL, or create one with the
    /// caller-provided short id
    async fn lookup_or_create_short(
        &self,
        original_url: &str,
        short_id: &str,
        now: i64,
    ) -> StorageResult<ShortenedUrl>;

    /// Resolve a short id to its original URL
    async fn resolve_short(&self, short_id: &str) -> Result<Option<String>>;

    /// Page of summary rows from the precomputed summary table, ordered by
    /// access count descending. `search` filters on the promotion label.
    async fn list_summaries(
        &self,
        limit: i64,
        offset: i64,
        search: Option<&str>,
    ) -> Result<Vec<ImageSummary>>;

    /// Total summary rows matching the search filter (for pagination)
    async fn count_summaries(&self, search: Option<&str>) -> Result<i64>;

    /// Rebuild the precomputed summary table from the base tables
    async fn refresh_summary(&self) -> Result<()>;

    /// Detailed per-URL statistics, excluding loopback clients and
    /// referrers that contain `self_host`
    async fn detailed_stats(
        &self,
        image_url: &str,
        self_host: &str,
        top_n: i64,
        recent_n: i64,
    ) -> Result<Option<DetailedStats>>;
}
