//! Settings types. JSON keys are camelCase; every section falls back to its
//! defaults field by field.

use serde::{Deserialize, Serialize};

/// Root settings object (`~/.chatgate/settings.json`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Listener and per-connection limits.
    pub server: ServerSettings,
    /// Operation dispatch behaviour.
    pub dispatch: DispatchSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Listener and per-connection limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Upgrades beyond this many open connections are refused.
    pub max_connections: usize,
    /// Interval between server pings.
    pub heartbeat_interval_ms: u64,
    /// A client silent for this long is disconnected.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per connection.
    pub outbound_queue_capacity: usize,
    /// Dropped outbound frames tolerated before a connection is closed.
    pub max_dropped_messages: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 1024 * 1024,
            outbound_queue_capacity: 256,
            max_dropped_messages: 100,
        }
    }
}

/// How a connection's inbound operations are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOrdering {
    /// One at a time, in arrival order.
    #[default]
    Serial,
    /// Each operation on its own task.
    Concurrent,
}

impl DispatchOrdering {
    /// Parse a settings/env value.
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "serial" => Some(Self::Serial),
            "concurrent" => Some(Self::Concurrent),
            _ => None,
        }
    }
}

/// Operation dispatch behaviour.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DispatchSettings {
    /// Upper bound on one domain call.
    pub handler_timeout_ms: u64,
    /// Per-connection scheduling.
    pub ordering: DispatchOrdering,
    /// Messages fetched for the summary refresh after a chat disconnect.
    pub summary_message_count: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 30_000,
            ordering: DispatchOrdering::Serial,
            summary_message_count: 10,
        }
    }
}

/// Log output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
