//! Shared application state for the Observer API server.

use std::sync::Arc;

use threadpulse_core::ActiveThreadCountService;

/// Per-observer queue depth used when no configuration is supplied.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// State shared by every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The service answering queries and owning the broadcast.
    pub service: Arc<ActiveThreadCountService>,
    /// Payloads buffered per `WebSocket` before sends start failing.
    pub channel_buffer: usize,
}

impl AppState {
    /// Wrap `service` with the default per-observer buffer.
    pub const fn new(service: Arc<ActiveThreadCountService>) -> Self {
        Self {
            service,
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }

    /// Override the per-observer buffer. Zero is raised to one.
    #[must_use]
    pub fn with_channel_buffer(mut self, channel_buffer: usize) -> Self {
        self.channel_buffer = channel_buffer.max(1);
        self
    }
}
