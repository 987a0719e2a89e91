//! Relay configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Configuration for the relay service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host to bind (default `"127.0.0.1"` — the relay is loopback-only).
    pub host: String,
    /// Port to bind (default `8001`; `0` auto-assigns).
    pub port: u16,
    /// Capacity of each client's send queue, in messages.
    pub send_queue_capacity: usize,
    /// Cumulative dropped-message ceiling before a slow client is
    /// force-closed.
    pub max_client_drops: u64,
    /// Visualization page to open after startup, if any.
    pub viewer_page: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8001,
            send_queue_capacity: 64,
            max_client_drops: 100,
            viewer_page: None,
        }
    }
}
