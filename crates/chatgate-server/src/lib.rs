//! # chatgate-server
//!
//! Axum `WebSocket` gateway: connection registry, operation dispatch and broadcast.
//!
//! - `WebSocket` endpoint `/ws/{family}/{subId}` scoped to one channel key
//! - Channel-keyed connection registry with identity-indexed entries
//! - Dispatch table over every `TGM`/`TUM`/`TCM` operation, with per-operation addressing
//! - Sender notifications and isolated fan-out over bounded per-connection queues
//! - Disconnect hook with a best-effort chat summary refresh
//! - Health, Prometheus metrics and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod dispatch;
pub mod health;
pub mod metrics;
pub mod server;
pub mod services;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::GatewayServer;
pub use services::{InMemoryBackend, Services};
