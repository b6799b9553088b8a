use std::sync::Arc;

use lifecycle_core::dispatch::Dispatcher;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}
