//! HTTP surface: upload page, health probe, generate endpoint and the two
//! static directories.

mod handlers;

pub use handlers::GenerateResponse;

use crate::config::Config;
use crate::model::ImageModel;
use crate::storage::{Storage, OUTPUTS_ROUTE, UPLOADS_ROUTE};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

pub struct AppState {
    pub model: Arc<dyn ImageModel>,
    pub storage: Storage,
    pub config: Config,
}

impl AppState {
    pub fn new(model: Arc<dyn ImageModel>, storage: Storage, config: Config) -> Self {
        Self {
            model,
            storage,
            config,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let generate = post(handlers::generate)
        .layer(ConcurrencyLimitLayer::new(state.config.max_concurrent_generations));

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/api/generate", generate)
        .nest_service(UPLOADS_ROUTE, ServeDir::new(state.storage.upload_dir()))
        .nest_service(OUTPUTS_ROUTE, ServeDir::new(state.storage.output_dir()))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
