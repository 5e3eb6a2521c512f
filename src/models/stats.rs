//! Aggregated statistics models

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::AccessHistoryEntry;

/// Per-URL summary row read from the precomputed summary table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImageSummary {
    pub image_url: String,
    pub promotion: Option<String>,
    pub access_count: i64,
    pub unique_ips: i64,
    pub last_accessed: Option<i64>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
}

/// Referrer with its access frequency
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReferrerCount {
    pub referrer: String,
    pub count: i64,
}

/// One hour-of-day bucket (0..=23, UTC)
#[derive(Debug, Clone, Serialize)]
pub struct HourlyCount {
    pub hour: i64,
    pub count: i64,
}

/// One calendar-day bucket (Unix timestamp of the UTC day start)
#[derive(Debug, Clone, Serialize)]
pub struct DailyCount {
    pub day: i64,
    pub count: i64,
}

/// Detailed per-URL statistics, filtered to exclude self-referential
/// and loopback traffic
#[derive(Debug, Clone, Serialize)]
pub struct DetailedStats {
    pub image_url: String,
    pub access_count: i64,
    pub unique_ips: i64,
    pub last_accessed: Option<i64>,
    pub top_referrers: Vec<ReferrerCount>,
    pub recent_access: Vec<AccessHistoryEntry>,
    pub hourly: Vec<HourlyCount>,
    pub daily: Vec<DailyCount>,
}

/// Expand sparse (hour, count) rows into all 24 hour-of-day buckets
pub fn fill_hour_buckets(rows: &[(i64, i64)]) -> Vec<HourlyCount> {
    let mut buckets = [0i64; 24];
    for &(hour, count) in rows {
        if (0..24).contains(&hour) {
            buckets[hour as usize] = count;
        }
    }
    buckets
        .iter()
        .enumerate()
        .map(|(hour, &count)| HourlyCount {
            hour: hour as i64,
            count,
        })
        .collect()
}
