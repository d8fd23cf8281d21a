//! Server configuration.

use std::time::Duration;

/// Configuration for the reference server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Number of events kept for watch replay before compaction.
    pub max_history: usize,
    /// Per-watch buffer; a watcher falling further behind is disconnected.
    pub watch_buffer: usize,
    /// Timeout applied to watches that do not ask for one.
    pub default_watch_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_history: 1000,
            watch_buffer: 256,
            default_watch_timeout: None,
        }
    }

    /// Sets the history size.
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }

    /// Sets the per-watch buffer.
    pub fn with_watch_buffer(mut self, size: usize) -> Self {
        self.watch_buffer = size;
        self
    }

    /// Sets the default watch timeout.
    pub fn with_default_watch_timeout(mut self, timeout: Duration) -> Self {
        self.default_watch_timeout = Some(timeout);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
