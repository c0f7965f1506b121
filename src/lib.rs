pub mod config;
pub mod decoder;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod retry;
pub mod store;

use axum::{Router, routing::get};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub access_token: Option<Arc<str>>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, server: &ServerConfig) -> Self {
        Self {
            pipeline,
            access_token: server.access_token.as_deref().map(Arc::from),
            request_timeout: server.request_timeout(),
        }
    }

    /// Deadline for the store work of a request starting now.
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.request_timeout
    }
}

pub fn router(state: AppState, static_dir: Option<&Path>) -> Router {
    let mut app: Router<AppState> = Router::new()
        .route("/monitors", get(handlers::monitors::list_monitors))
        .route("/checks", get(handlers::checks::list_checks))
        .route("/results/{id}", get(handlers::results::list_results))
        .route("/healthz", get(handlers::health::healthz));

    // The dashboard ships alongside the API.
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
