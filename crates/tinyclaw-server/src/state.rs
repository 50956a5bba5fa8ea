use tinyclaw_bus::EventBus;
use tinyclaw_config::ConfigStore;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    /// Settings document, re-read fresh on every `/metrics` request.
    pub config_store: ConfigStore,
    /// Reference to the dispatcher's event bus for SSE streaming.
    pub bus: EventBus,
}
