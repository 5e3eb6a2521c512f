use crate::models::{
    fill_hour_buckets, AccessHistoryEntry, DailyCount, DetailedStats, ImageAccessLog,
    ImageSummary, ReferrerCount, ShortenedUrl,
};
use crate::storage::{AccessOutcome, Storage, StorageError, StorageResult};
use crate::tracking::Fingerprint;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS image_access_logs (
                id BIGSERIAL PRIMARY KEY,
                image_url TEXT NOT NULL UNIQUE,
                access_count BIGINT NOT NULL DEFAULT 0,
                promotion TEXT,
                created_at BIGINT NOT NULL,
                updated_at BIGINT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS image_access_history (
                id BIGSERIAL PRIMARY KEY,
                image_url TEXT NOT NULL,
                ip_address TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                referrer TEXT NOT NULL,
                accessed_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_url_time
             ON image_access_history(image_url, accessed_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS shortened_urls (
                id BIGSERIAL PRIMARY KEY,
                short_id TEXT NOT NULL UNIQUE,
                original_url TEXT NOT NULL UNIQUE,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS image_stats_summary (
                image_url TEXT PRIMARY KEY,
                promotion TEXT,
                access_count BIGINT NOT NULL,
                unique_ips BIGINT NOT NULL,
                last_accessed BIGINT,
                created_at BIGINT NOT NULL,
                updated_at BIGINT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn seed_access_log(
        &self,
        image_url: &str,
        promotion: Option<&str>,
        now: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO image_access_logs (image_url, access_count, promotion, created_at)
            VALUES ($1, 0, $2, $3)
            ON CONFLICT (image_url) DO NOTHING
            "#,
        )
        .bind(image_url)
        .bind(promotion)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn record_access(
        &self,
        image_url: &str,
        fingerprint: &Fingerprint,
        now: i64,
        dedup_window_secs: i64,
    ) -> Result<AccessOutcome> {
        let mut tx = self.pool.begin().await?;

        let threshold = now - dedup_window_secs;
        let recent = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT id FROM image_access_history
            WHERE image_url = $1 AND ip_address = $2 AND user_agent = $3 AND referrer = $4
              AND accessed_at >= $5
            ORDER BY accessed_at DESC
            LIMIT 1
            "#,
        )
        .bind(image_url)
        .bind(&fingerprint.ip)
        .bind(&fingerprint.user_agent)
        .bind(&fingerprint.referrer)
        .bind(threshold)
        .fetch_optional(&mut *tx)
        .await?;

        if recent.is_some() {
            tx.rollback().await?;
            return Ok(AccessOutcome::Duplicate);
        }

        sqlx::query(
            r#"
            INSERT INTO image_access_logs (image_url, access_count, created_at, updated_at)
            VALUES ($1, 1, $2, $2)
            ON CONFLICT (image_url) DO UPDATE SET
                access_count = image_access_logs.access_count + 1,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(image_url)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO image_access_history (image_url, ip_address, user_agent, referrer, accessed_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(image_url)
        .bind(&fingerprint.ip)
        .bind(&fingerprint.user_agent)
        .bind(&fingerprint.referrer)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(AccessOutcome::Recorded)
    }

    async fn get_access_log(&self, image_url: &str) -> Result<Option<ImageAccessLog>> {
        let log = sqlx::query_as::<_, ImageAccessLog>(
            r#"
            SELECT id, image_url, access_count, promotion, created_at, updated_at
            FROM image_access_logs
            WHERE image_url = $1
            "#,
        )
        .bind(image_url)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(log)
    }

    async fn set_promotion(&self, image_url: &str, promotion: &str, now: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO image_access_logs (image_url, access_count, promotion, created_at, updated_at)
            VALUES ($1, 0, $2, $3, $3)
            ON CONFLICT (image_url) DO UPDATE SET
                promotion = EXCLUDED.promotion,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(image_url)
        .bind(promotion)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn lookup_or_create_short(
        &self,
        original_url: &str,
        short_id: &str,
        now: i64,
    ) -> StorageResult<ShortenedUrl> {
        let existing = sqlx::query_as::<_, ShortenedUrl>(
            r#"
            SELECT id, short_id, original_url, created_at
            FROM shortened_urls
            WHERE original_url = $1
            "#,
        )
        .bind(original_url)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        if let Some(url) = existing {
            return Ok(url);
        }

        let insert = sqlx::query(
            r#"
            INSERT INTO shortened_urls (short_id, original_url, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (original_url) DO NOTHING
            "#,
        )
        .bind(short_id)
        .bind(original_url)
        .bind(now)
        .execute(self.pool.as_ref())
        .await;

        if let Err(e) = insert {
            // A unique violation here is on short_id, not original_url
            if e.as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false)
            {
                return Err(StorageError::Conflict);
            }
            return Err(StorageError::Other(e.into()));
        }

        let url = sqlx::query_as::<_, ShortenedUrl>(
            r#"
            SELECT id, short_id, original_url, created_at
            FROM shortened_urls
            WHERE original_url = $1
            "#,
        )
        .bind(original_url)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        url.ok_or_else(|| StorageError::Other(anyhow!("shortened url vanished after insert")))
    }

    async fn resolve_short(&self, short_id: &str) -> Result<Option<String>> {
        let original = sqlx::query_scalar::<_, String>(
            "SELECT original_url FROM shortened_urls WHERE short_id = $1",
        )
        .bind(short_id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(original)
    }

    async fn list_summaries(
        &self,
        limit: i64,
        offset: i64,
        search: Option<&str>,
    ) -> Result<Vec<ImageSummary>> {
        let summaries = if let Some(term) = search {
            let pattern = format!("%{}%", term);
            sqlx::query_as::<_, ImageSummary>(
                r#"
                SELECT image_url, promotion, access_count, unique_ips, last_accessed, created_at, updated_at
                FROM image_stats_summary
                WHERE promotion ILIKE $1
                ORDER BY access_count DESC, image_url ASC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(pattern)
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.as_ref())
            .await?
        } else {
            sqlx::query_as::<_, ImageSummary>(
                r#"
                SELECT image_url, promotion, access_count, unique_ips, last_accessed, created_at, updated_at
                FROM image_stats_summary
                ORDER BY access_count DESC, image_url ASC
                LIMIT $1 OFFSET $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool.as_ref())
            .await?
        };

        Ok(summaries)
    }

    async fn count_summaries(&self, search: Option<&str>) -> Result<i64> {
        let total = if let Some(term) = search {
            let pattern = format!("%{}%", term);
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM image_stats_summary WHERE promotion ILIKE $1",
            )
            .bind(pattern)
            .fetch_one(self.pool.as_ref())
            .await?
        } else {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM image_stats_summary")
                .fetch_one(self.pool.as_ref())
                .await?
        };

        Ok(total)
    }

    async fn refresh_summary(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM image_stats_summary")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO image_stats_summary
                (image_url, promotion, access_count, unique_ips, last_accessed, created_at, updated_at)
            SELECT l.image_url, l.promotion, l.access_count,
                   COALESCE(h.unique_ips, 0), h.last_accessed,
                   l.created_at, l.updated_at
            FROM image_access_logs l
            LEFT JOIN (
                SELECT image_url,
                       COUNT(DISTINCT ip_address) AS unique_ips,
                       MAX(accessed_at) AS last_accessed
                FROM image_access_history
                GROUP BY image_url
            ) h ON h.image_url = l.image_url
            "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn detailed_stats(
        &self,
        image_url: &str,
        self_host: &str,
        top_n: i64,
        recent_n: i64,
    ) -> Result<Option<DetailedStats>> {
        let log = match self.get_access_log(image_url).await? {
            Some(log) => log,
            None => return Ok(None),
        };

        let self_pattern = format!("%{}%", self_host);

        let (unique_ips, last_accessed) = sqlx::query_as::<_, (i64, Option<i64>)>(
            r#"
            SELECT COUNT(DISTINCT ip_address), MAX(accessed_at)
            FROM image_access_history
            WHERE image_url = $1
              AND ip_address NOT IN ('127.0.0.1', '::1')
              AND referrer NOT LIKE $2
            "#,
        )
        .bind(image_url)
        .bind(&self_pattern)
        .fetch_one(self.pool.as_ref())
        .await?;

        let top_referrers = sqlx::query_as::<_, ReferrerCount>(
            r#"
            SELECT referrer, COUNT(*) AS count
            FROM image_access_history
            WHERE image_url = $1
              AND ip_address NOT IN ('127.0.0.1', '::1')
              AND referrer NOT LIKE $2
            GROUP BY referrer
            ORDER BY count DESC, referrer ASC
            LIMIT $3
            "#,
        )
        .bind(image_url)
        .bind(&self_pattern)
        .bind(top_n)
        .fetch_all(self.pool.as_ref())
        .await?;

        let recent_access = sqlx::query_as::<_, AccessHistoryEntry>(
            r#"
            SELECT id, image_url, ip_address, user_agent, referrer, accessed_at
            FROM image_access_history
            WHERE image_url = $1
              AND ip_address NOT IN ('127.0.0.1', '::1')
              AND referrer NOT LIKE $2
            ORDER BY accessed_at DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(image_url)
        .bind(&self_pattern)
        .bind(recent_n)
        .fetch_all(self.pool.as_ref())
        .await?;

        let hourly_rows = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (accessed_at % 86400) / 3600 AS hour, COUNT(*)
            FROM image_access_history
            WHERE image_url = $1
              AND ip_address NOT IN ('127.0.0.1', '::1')
              AND referrer NOT LIKE $2
            GROUP BY hour
            ORDER BY hour
            "#,
        )
        .bind(image_url)
        .bind(&self_pattern)
        .fetch_all(self.pool.as_ref())
        .await?;

        let daily = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT (accessed_at / 86400) * 86400 AS day, COUNT(*)
            FROM image_access_history
            WHERE image_url = $1
              AND ip_address NOT IN ('127.0.0.1', '::1')
              AND referrer NOT LIKE $2
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(image_url)
        .bind(&self_pattern)
        .fetch_all(self.pool.as_ref())
        .await?
        .into_iter()
        .map(|(day, count)| DailyCount { day, count })
        .collect();

        Ok(Some(DetailedStats {
            image_url: log.image_url,
            access_count: log.access_count,
            unique_ips,
            last_accessed,
            top_referrers,
            recent_access,
            hourly: fill_hour_buckets(&hourly_rows),
            daily,
        }))
    }
}
