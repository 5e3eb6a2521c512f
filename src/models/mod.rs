mod records;
mod stats;

pub use records::{AccessHistoryEntry, ImageAccessLog, ShortenedUrl};
pub use stats::{
    fill_hour_buckets, DailyCount, DetailedStats, HourlyCount, ImageSummary, ReferrerCount,
};
