use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row per tracked image URL. `access_count` is monotonically
/// non-decreasing; `updated_at` is set on every counted access.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImageAccessLog {
    pub id: i64,
    pub image_url: String,
    pub access_count: i64,
    pub promotion: Option<String>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// Append-only access event. Never updated or deleted by the application.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessHistoryEntry {
    pub id: i64,
    pub image_url: String,
    pub ip_address: String,
    pub user_agent: String,
    pub referrer: String,
    pub accessed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShortenedUrl {
    pub id: i64,
    pub short_id: String,
    pub original_url: String,
    pub created_at: i64,
}
