//! Server configuration.

use std::time::Duration;

use chatgate_settings::{DispatchOrdering, GatewaySettings};
use serde::{Deserialize, Serialize};

/// Runtime configuration for the gateway server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Disconnect a client silent for this many milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub outbound_queue_capacity: usize,
    /// Dropped frames tolerated before a slow client is disconnected.
    pub max_dropped_messages: u64,
    /// Upper bound on one domain call in milliseconds.
    pub handler_timeout_ms: u64,
    /// Per-connection scheduling of inbound operations.
    pub ordering: DispatchOrdering,
    /// Messages fetched for the summary refresh after a chat disconnect.
    pub summary_message_count: usize,
}

impl ServerConfig {
    /// Ping interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Silence tolerated before disconnecting.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Domain call timeout.
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 1024 * 1024,
            outbound_queue_capacity: 256,
            max_dropped_messages: 100,
            handler_timeout_ms: 30_000,
            ordering: DispatchOrdering::Serial,
            summary_message_count: 10,
        }
    }
}

impl From<&GatewaySettings> for ServerConfig {
    fn from(settings: &GatewaySettings) -> Self {
        let server = &settings.server;
        let dispatch = &settings.dispatch;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            heartbeat_interval_ms: server.heartbeat_interval_ms,
            heartbeat_timeout_ms: server.heartbeat_timeout_ms,
            max_message_size: server.max_message_size,
            outbound_queue_capacity: server.outbound_queue_capacity.max(1),
            max_dropped_messages: server.max_dropped_messages,
            handler_timeout_ms: dispatch.handler_timeout_ms,
            ordering: dispatch.ordering,
            summary_message_count: dispatch.summary_message_count,
        }
    }
}
