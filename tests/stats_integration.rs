//! Stats aggregation integration tests
//!
//! Summary refresh + pagination, promotion search, and the detailed stats
//! filters, all against in-memory SQLite through the API router.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

use imgtrace::api::{create_api_router, AppState};
use imgtrace::config::UploadConfig;
use imgtrace::storage::{SqliteStorage, Storage};
use imgtrace::tracking::{Fingerprint, Tracker};
use imgtrace::uploads::FsObjectStore;

const PUBLIC_BASE: &str = "https://img.example.com";
const WINDOW: i64 = 3;

struct TestApp {
    api: Router,
    storage: Arc<dyn Storage>,
    _upload_dir: tempfile::TempDir,
}

async fn create_test_app() -> TestApp {
    let storage: Arc<dyn Storage> =
        Arc::new(SqliteStorage::new("sqlite::memory:", 1).await.unwrap());
    storage.init().await.unwrap();

    let upload_dir = tempfile::tempdir().unwrap();
    let objects = Arc::new(FsObjectStore::new(upload_dir.path()).await.unwrap());

    let state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        objects,
        tracker: Tracker::new(Arc::clone(&storage)),
        upload: UploadConfig {
            dir: upload_dir.path().display().to_string(),
            max_bytes: 5 * 1024 * 1024,
            allowed_types: vec!["image/png".to_string()],
        },
        public_base_url: PUBLIC_BASE.to_string(),
    });

    TestApp {
        api: create_api_router(state),
        storage,
        _upload_dir: upload_dir,
    }
}

fn fingerprint(ip: &str, referrer: &str) -> Fingerprint {
    Fingerprint {
        ip: ip.to_string(),
        user_agent: "Mozilla/5.0".to_string(),
        referrer: referrer.to_string(),
    }
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn refresh(app: &Router) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stats/refresh")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// Record `count` distinct accesses against a URL, one second apart
async fn seed_accesses(storage: &Arc<dyn Storage>, url: &str, count: i64, base_ts: i64) {
    for i in 0..count {
        let fp = fingerprint(&format!("203.0.113.{}", i + 1), "https://blog.example/");
        storage
            .record_access(url, &fp, base_ts + i, WINDOW)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_listing_reads_refreshed_snapshot() {
    let app = create_test_app().await;

    seed_accesses(&app.storage, "https://cdn.example.com/a.png", 2, 1000).await;

    // Before the first refresh the summary table is empty
    let (status, json) = get_json(&app.api, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pagination"]["total"], 0);

    refresh(&app.api).await;

    let (_, json) = get_json(&app.api, "/stats").await;
    assert_eq!(json["pagination"]["total"], 1);
    assert_eq!(json["data"][0]["access_count"], 2);
    assert_eq!(json["data"][0]["unique_ips"], 2);
    assert_eq!(json["data"][0]["last_accessed"], 1001);
}

#[tokio::test]
async fn test_pagination_bounds_and_total_pages() {
    let app = create_test_app().await;

    for i in 0..5 {
        let url = format!("https://cdn.example.com/{}.png", i);
        // Distinct access counts give a deterministic ordering
        seed_accesses(&app.storage, &url, i + 1, 1000 + i * 100).await;
    }
    refresh(&app.api).await;

    let (status, json) = get_json(&app.api, "/stats?page=3&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["pagination"]["total"], 5);
    assert_eq!(json["pagination"]["totalPages"], 3);
    assert_eq!(json["pagination"]["page"], 3);

    // Ordered by access count descending, so the last page holds the
    // least-accessed URL
    assert_eq!(json["data"][0]["access_count"], 1);
}

#[tokio::test]
async fn test_page_and_limit_are_clamped() {
    let app = create_test_app().await;

    seed_accesses(&app.storage, "https://cdn.example.com/a.png", 1, 1000).await;
    refresh(&app.api).await;

    let (status, json) = get_json(&app.api, "/stats?page=0&limit=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["pagination"]["page"], 1);
    assert_eq!(json["pagination"]["limit"], 1);
}

#[tokio::test]
async fn test_search_filters_promotion_label() {
    let app = create_test_app().await;

    let summer = "https://cdn.example.com/summer.png";
    let winter = "https://cdn.example.com/winter.png";
    seed_accesses(&app.storage, summer, 1, 1000).await;
    seed_accesses(&app.storage, winter, 1, 2000).await;
    app.storage
        .set_promotion(summer, "Summer Sale", 3000)
        .await
        .unwrap();
    app.storage
        .set_promotion(winter, "Winter Launch", 3000)
        .await
        .unwrap();
    refresh(&app.api).await;

    let (_, json) = get_json(&app.api, "/stats?search=summer").await;
    assert_eq!(json["pagination"]["total"], 1);
    assert_eq!(json["data"][0]["image_url"], summer);
    assert_eq!(json["data"][0]["promotion"], "Summer Sale");
}

#[tokio::test]
async fn test_detail_unknown_url_is_404() {
    let app = create_test_app().await;

    let (status, json) =
        get_json(&app.api, "/stats/detail?image_url=https://cdn.example.com/nope.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "URL not found");
}

#[tokio::test]
async fn test_detail_excludes_loopback_and_self_referential() {
    let app = create_test_app().await;
    let url = "https://cdn.example.com/tracked.png";

    // One external access, one loopback client, one dashboard self-view
    app.storage
        .record_access(url, &fingerprint("203.0.113.1", "https://blog.example/post"), 1000, WINDOW)
        .await
        .unwrap();
    app.storage
        .record_access(url, &fingerprint("127.0.0.1", "https://blog.example/post"), 1100, WINDOW)
        .await
        .unwrap();
    app.storage
        .record_access(
            url,
            &fingerprint("198.51.100.9", "https://img.example.com/stats"),
            1200,
            WINDOW,
        )
        .await
        .unwrap();

    let (status, json) =
        get_json(&app.api, &format!("/stats/detail?image_url={}", url)).await;
    assert_eq!(status, StatusCode::OK);

    // All three accesses were counted
    assert_eq!(json["access_count"], 3);
    // But only the external one survives the filters
    assert_eq!(json["unique_ips"], 1);
    assert_eq!(json["last_accessed"], 1000);
    assert_eq!(json["recent_access"].as_array().unwrap().len(), 1);
    assert_eq!(json["recent_access"][0]["ip_address"], "203.0.113.1");

    let referrers = json["top_referrers"].as_array().unwrap();
    assert_eq!(referrers.len(), 1);
    assert_eq!(referrers[0]["referrer"], "https://blog.example/post");
    assert_eq!(referrers[0]["count"], 1);
}

#[tokio::test]
async fn test_detail_hourly_and_daily_buckets() {
    let app = create_test_app().await;
    let url = "https://cdn.example.com/series.png";

    let day0 = 86_400 * 100;
    let day1 = 86_400 * 101;

    app.storage
        .record_access(url, &fingerprint("203.0.113.1", "direct"), day0 + 13 * 3600, WINDOW)
        .await
        .unwrap();
    app.storage
        .record_access(url, &fingerprint("203.0.113.2", "direct"), day0 + 13 * 3600 + 60, WINDOW)
        .await
        .unwrap();
    app.storage
        .record_access(url, &fingerprint("203.0.113.3", "direct"), day1 + 6 * 3600, WINDOW)
        .await
        .unwrap();

    let (_, json) = get_json(&app.api, &format!("/stats/detail?image_url={}", url)).await;

    let hourly = json["hourly"].as_array().unwrap();
    assert_eq!(hourly.len(), 24);
    assert_eq!(hourly[13]["count"], 2);
    assert_eq!(hourly[6]["count"], 1);
    assert_eq!(hourly[0]["count"], 0);

    let daily = json["daily"].as_array().unwrap();
    assert_eq!(daily.len(), 2);
    assert_eq!(daily[0]["day"], day0);
    assert_eq!(daily[0]["count"], 2);
    assert_eq!(daily[1]["day"], day1);
    assert_eq!(daily[1]["count"], 1);
}

#[tokio::test]
async fn test_detail_top_referrers_ordered_by_frequency() {
    let app = create_test_app().await;
    let url = "https://cdn.example.com/popular.png";

    for i in 0..3 {
        app.storage
            .record_access(
                url,
                &fingerprint(&format!("203.0.113.{}", i + 1), "https://news.example/"),
                1000 + i,
                WINDOW,
            )
            .await
            .unwrap();
    }
    app.storage
        .record_access(url, &fingerprint("198.51.100.1", "https://blog.example/"), 2000, WINDOW)
        .await
        .unwrap();

    let (_, json) = get_json(&app.api, &format!("/stats/detail?image_url={}", url)).await;
    let referrers = json["top_referrers"].as_array().unwrap();

    assert_eq!(referrers[0]["referrer"], "https://news.example/");
    assert_eq!(referrers[0]["count"], 3);
    assert_eq!(referrers[1]["referrer"], "https://blog.example/");
    assert_eq!(referrers[1]["count"], 1);
}

#[tokio::test]
async fn test_promotion_upsert_via_api() {
    let app = create_test_app().await;
    let url = "https://cdn.example.com/promo.png";

    let request = Request::builder()
        .method("PUT")
        .uri("/stats/promotion")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({ "image_url": url, "promotion": "autumn drop" }).to_string(),
        ))
        .unwrap();
    let response = app.api.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Creates the row with count 0 when the URL was never accessed
    let log = app.storage.get_access_log(url).await.unwrap().unwrap();
    assert_eq!(log.access_count, 0);
    assert_eq!(log.promotion.as_deref(), Some("autumn drop"));
}
