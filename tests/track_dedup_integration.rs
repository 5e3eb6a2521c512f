//! Access tracking integration tests
//!
//! These verify the duplicate-filtering window and the invariant that the
//! access counter matches the number of recorded history rows.

use imgtrace::storage::{AccessOutcome, SqliteStorage, Storage};
use imgtrace::tracking::Fingerprint;
use std::sync::Arc;

const WINDOW: i64 = 3;

async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn fingerprint(ip: &str, referrer: &str) -> Fingerprint {
    Fingerprint {
        ip: ip.to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        referrer: referrer.to_string(),
    }
}

#[tokio::test]
async fn test_duplicate_within_window_not_counted() {
    let storage = create_test_storage().await;
    let url = "https://cdn.example.com/a.png";
    let fp = fingerprint("203.0.113.1", "direct");

    let first = storage.record_access(url, &fp, 1000, WINDOW).await.unwrap();
    assert_eq!(first, AccessOutcome::Recorded);

    let second = storage.record_access(url, &fp, 1001, WINDOW).await.unwrap();
    assert_eq!(second, AccessOutcome::Duplicate);

    let third = storage.record_access(url, &fp, 1002, WINDOW).await.unwrap();
    assert_eq!(third, AccessOutcome::Duplicate);

    let log = storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(log.access_count, 1);
    assert_eq!(log.updated_at, Some(1000));
}

#[tokio::test]
async fn test_same_fingerprint_after_window_counts_again() {
    let storage = create_test_storage().await;
    let url = "https://cdn.example.com/b.png";
    let fp = fingerprint("203.0.113.1", "direct");

    assert_eq!(
        storage.record_access(url, &fp, 1000, WINDOW).await.unwrap(),
        AccessOutcome::Recorded
    );
    assert_eq!(
        storage.record_access(url, &fp, 1004, WINDOW).await.unwrap(),
        AccessOutcome::Recorded
    );

    let log = storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(log.access_count, 2);
    assert_eq!(log.updated_at, Some(1004));
}

#[tokio::test]
async fn test_different_fingerprint_within_window_counts() {
    let storage = create_test_storage().await;
    let url = "https://cdn.example.com/c.png";

    let fp_a = fingerprint("203.0.113.1", "direct");
    let fp_b = fingerprint("203.0.113.1", "https://blog.example/post");
    let fp_c = fingerprint("198.51.100.9", "direct");

    storage.record_access(url, &fp_a, 1000, WINDOW).await.unwrap();
    storage.record_access(url, &fp_b, 1000, WINDOW).await.unwrap();
    storage.record_access(url, &fp_c, 1001, WINDOW).await.unwrap();

    let log = storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(log.access_count, 3);
}

#[tokio::test]
async fn test_counter_matches_history_rows() {
    let storage = create_test_storage().await;
    let url = "https://cdn.example.com/d.png";

    // Mixed duplicates and fresh accesses
    let fp_a = fingerprint("203.0.113.1", "https://blog.example/");
    let fp_b = fingerprint("198.51.100.9", "https://news.example/");

    storage.record_access(url, &fp_a, 1000, WINDOW).await.unwrap();
    storage.record_access(url, &fp_a, 1001, WINDOW).await.unwrap(); // duplicate
    storage.record_access(url, &fp_b, 1002, WINDOW).await.unwrap();
    storage.record_access(url, &fp_a, 2000, WINDOW).await.unwrap();

    let log = storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(log.access_count, 3);

    // Recent records mirror every counted access (no filter applies here:
    // neither loopback IPs nor a self host are involved)
    let stats = storage
        .detailed_stats(url, "stats.example.com", 10, 20)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stats.recent_access.len() as i64, log.access_count);
}

#[tokio::test]
async fn test_seeded_log_keeps_metadata_on_first_access() {
    let storage = create_test_storage().await;
    let url = "https://cdn.example.com/e.png";

    storage
        .seed_access_log(url, Some("launch banner"), 999)
        .await
        .unwrap();

    let seeded = storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(seeded.access_count, 0);
    assert_eq!(seeded.promotion.as_deref(), Some("launch banner"));
    assert_eq!(seeded.updated_at, None);

    let fp = fingerprint("203.0.113.1", "direct");
    storage.record_access(url, &fp, 1000, WINDOW).await.unwrap();

    let log = storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(log.access_count, 1);
    assert_eq!(log.promotion.as_deref(), Some("launch banner"));
    assert_eq!(log.created_at, 999);
    assert_eq!(log.updated_at, Some(1000));
}

#[tokio::test]
async fn test_seed_is_idempotent() {
    let storage = create_test_storage().await;
    let url = "https://cdn.example.com/f.png";

    let fp = fingerprint("203.0.113.1", "direct");
    storage.record_access(url, &fp, 1000, WINDOW).await.unwrap();

    // A later seed must not reset the counter
    storage.seed_access_log(url, None, 2000).await.unwrap();

    let log = storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(log.access_count, 1);
    assert_eq!(log.created_at, 1000);
}
