//! Shared application state for API handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::facade::QueryFacade;

/// State shared by every handler
pub struct AppState {
    /// Query façade
    pub facade: Arc<QueryFacade>,
    started_at: Instant,
}

impl AppState {
    /// Wrap a façade
    pub fn new(facade: Arc<QueryFacade>) -> Self {
        Self {
            facade,
            started_at: Instant::now(),
        }
    }

    /// Seconds since the state was created
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
