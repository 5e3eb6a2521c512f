use axum::{routing::get, Router};
use std::sync::Arc;

use crate::storage::Storage;

use super::handlers::{redirect_short, RedirectState};

pub fn create_redirect_router(storage: Arc<dyn Storage>) -> Router {
    let state = Arc::new(RedirectState { storage });

    Router::new()
        .route("/i/{short_id}", get(redirect_short))
        .with_state(state)
}
