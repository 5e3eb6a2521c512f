use anyhow::Result;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::info;

use imgtrace::api::{self, AppState};
use imgtrace::config::{Config, DatabaseBackend};
use imgtrace::redirect;
use imgtrace::storage::{PostgresStorage, SqliteStorage, Storage};
use imgtrace::tracking::Tracker;
use imgtrace::uploads::FsObjectStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("imgtrace=info,tower_http=warn")
                }),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    // Initialize storage
    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(
                SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
            )
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(
                PostgresStorage::new(&config.database.url, config.database.max_connections)
                    .await?,
            )
        }
    };

    // Initialize database and the precomputed stats snapshot
    info!("Initializing database...");
    storage.init().await?;
    storage.refresh_summary().await?;
    info!("Database initialized successfully");

    // Initialize the upload object store
    let objects = Arc::new(FsObjectStore::new(config.upload.dir.clone()).await?);
    info!("Serving uploads from directory: {}", config.upload.dir);

    let state = Arc::new(AppState {
        storage: Arc::clone(&storage),
        objects,
        tracker: Tracker::new(Arc::clone(&storage)),
        upload: config.upload.clone(),
        public_base_url: config.public_base_url.clone(),
    });

    // Create routers: API surface, static uploads, short-link redirects
    let app = axum::Router::new()
        .nest("/api", api::create_api_router(state))
        .nest_service("/files", ServeDir::new(&config.upload.dir))
        .merge(redirect::create_redirect_router(Arc::clone(&storage)));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Server listening on http://{}", addr);
    info!("   - API endpoints available at http://{}/api/...", addr);
    info!("   - Short links served at http://{}/i/...", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
