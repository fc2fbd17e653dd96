//! # chatgate-core
//!
//! Foundation types shared by every chatgate crate.
//!
//! - **Branded IDs**: `ConnectionId`, `UserId`, `ChatId`, `MessageId`, `CorrelationId`
//! - **Channel keys**: `chat/{chatID}`, `user/{userID}`, `group` broadcast scopes
//! - **Errors**: `DecodeError`, `HandlerError`, `ChannelError` via `thiserror`
//! - **Wire**: two-pass envelope codec, typed payload shapes, sender notifications
//! - **Logging**: `tracing-subscriber` bootstrap

#![deny(unsafe_code)]

pub mod channel;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod wire;

pub use channel::{ChannelKey, Family};
pub use errors::{ChannelError, DecodeError, HandlerError};
