use std::sync::Arc;

use chatdesk_store::ChatStore;

/// Shared application state accessible from all route handlers.
#[derive(Clone, Default)]
pub struct AppState {
    /// Session logs and the ingested-file registry, created once at start-up
    pub store: Arc<ChatStore>,
}

impl AppState {
    pub fn new(store: Arc<ChatStore>) -> Self {
        Self { store }
    }
}
