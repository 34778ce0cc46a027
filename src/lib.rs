pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full API surface; shared between `main` and the integration tests.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/barbers", get(handlers::barbers::list_barbers))
        .route("/api/barbers/:id/slots", get(handlers::barbers::open_slots))
        .route(
            "/api/barbers/:id/appointments",
            get(handlers::barbers::upcoming_appointments),
        )
        .route("/api/appointments", post(handlers::appointments::book))
        .route(
            "/api/appointments/:id/confirm",
            post(handlers::appointments::confirm),
        )
        .route(
            "/api/appointments/:id/cancel",
            post(handlers::appointments::cancel),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
