// API module - HTTP surface of the provider daemon

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::library::JellyfinLibraryProvider;

mod webhook;

pub use webhook::WebhookResponse;

/// Shared state handed to every handler.
pub struct AppState {
    pub provider: JellyfinLibraryProvider,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().nest("/webhook", webhook::routes())
}

/// Full application router, including the health probe and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
