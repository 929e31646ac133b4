//! Application State
//!
//! Shared state accessible by all handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::time::Instant;

use crate::stream::HubHandle;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Broadcast hub every stream registers with
    pub hub: HubHandle,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hub: HubHandle) -> Self {
        Self {
            hub,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Get the number of connected stream clients
    pub fn client_count(&self) -> usize {
        self.hub.client_count()
    }
}
