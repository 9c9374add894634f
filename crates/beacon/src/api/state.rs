//! Application state shared across handlers.

use std::sync::Arc;

use crate::hub::EventHub;
use crate::settings::Settings;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The push broker.
    pub hub: Arc<EventHub>,
    /// Process-wide settings.
    pub settings: Settings,
}

impl AppState {
    /// Create new application state with a hub configured from `settings`.
    pub fn new(settings: Settings) -> Self {
        let hub = Arc::new(EventHub::new(settings.hub_options()));
        Self { hub, settings }
    }
}
