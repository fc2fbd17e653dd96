//! WebSocket connections, registry, fan-out and session lifecycle.

pub mod broadcast;
pub mod connection;
pub mod lifecycle;
pub mod registry;
pub mod session;

pub use broadcast::{Broadcaster, Recipients};
pub use connection::ClientConnection;
pub use lifecycle::{LifecycleHook, SummarySync};
pub use registry::ConnectionRegistry;
pub use session::{SessionContext, run_ws_session};
