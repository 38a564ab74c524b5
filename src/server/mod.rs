//! HTTP service surface
//!
//! Thin axum layer over the job table: uploads land in the spool
//! directory, handlers delegate to `jobs`, and the dashboard polls
//! `/full_report` until the background run settles.

pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::config::Config;
use crate::jobs::JobTable;

/// Service state shared across handlers
pub struct AppState {
    pub config: Config,
    pub jobs: JobTable,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            jobs: JobTable::new(),
        }
    }
}

/// Create the service router
pub fn create_router(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_mb * 1024 * 1024;

    Router::new()
        .route("/upload", post(routes::upload))
        .route("/upload_chunk", post(routes::upload_chunk))
        .route("/full_report/:file_id", get(routes::full_report))
        .route("/api/health", get(routes::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
