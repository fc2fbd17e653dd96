//! Wire codec: inbound envelopes, typed payload shapes, outbound notifications.

pub mod envelope;
pub mod notify;
pub mod payloads;

pub use envelope::{ChatOp, Discriminant, Envelope, GroupOp, OpCode, Payload, UserOp, encode};
pub use notify::{Notification, NotifyStatus};

/// Literal text frame sent when a connection is accepted.
pub const CONNECT_ACK: &str = "Connect success";
