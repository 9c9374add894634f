//! Shared helpers for API integration tests.

use axum::Router;

use beacon::api::{AppState, create_router};
use beacon::settings::Settings;

/// Settings with heartbeats far enough out that they never interleave with
/// request/response assertions.
pub fn test_settings() -> Settings {
    Settings {
        port: 0,
        keep_alive_interval_ms: 60_000,
        ..Settings::default()
    }
}

pub fn test_app() -> Router {
    create_router(AppState::new(test_settings()))
}
