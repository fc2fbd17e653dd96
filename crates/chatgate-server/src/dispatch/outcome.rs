//! Operation results and failures.

use std::time::Duration;

use chatgate_core::wire::NotifyStatus;
use chatgate_core::{DecodeError, HandlerError};
use serde::Serialize;
use thiserror::Error;

use crate::websocket::broadcast::Recipients;

/// Addressing strategy an operation declares in the dispatch table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Addressing {
    /// Explicit user-id list, resolved to `user/{id}` channels.
    ExplicitIds,
    /// Every other connection on the origin's channel.
    SameChannel,
    /// Acknowledgment only.
    None,
}

impl Addressing {
    /// Whether `recipients` is a fan-out this addressing allows.
    ///
    /// [`Recipients::None`] is always allowed; [`Addressing::None`] allows nothing else.
    pub fn admits(self, recipients: &Recipients) -> bool {
        matches!(
            (self, recipients),
            (_, Recipients::None)
                | (Self::ExplicitIds, Recipients::Users { .. })
                | (Self::SameChannel, Recipients::SameChannel)
        )
    }
}

/// What a successful operation broadcasts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    /// Who receives `payload`.
    pub recipients: Recipients,
    /// Frame text to broadcast.
    pub payload: String,
}

impl Outcome {
    /// Broadcast `payload` (serialized) to `recipients`.
    pub fn broadcast<T: Serialize>(recipients: Recipients, payload: &T) -> Result<Self, OperationError> {
        Ok(Self {
            recipients,
            payload: chatgate_core::wire::encode(payload)?,
        })
    }

    /// Acknowledge without broadcasting.
    pub fn silent() -> Self {
        Self {
            recipients: Recipients::None,
            payload: String::new(),
        }
    }
}

/// Why an operation did not produce an [`Outcome`].
#[derive(Debug, Error)]
pub enum OperationError {
    /// The full-pass decode failed.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The domain layer rejected the operation.
    #[error("handler rejected operation: {0}")]
    Handler(#[from] HandlerError),
    /// The broadcast payload could not be serialized.
    #[error("failed to encode broadcast: {0}")]
    Encode(#[from] serde_json::Error),
    /// The handler did not finish in time.
    #[error("handler timed out after {0:?}")]
    Timeout(Duration),
}

impl OperationError {
    /// Status reported to the sender.
    pub fn status(&self) -> NotifyStatus {
        match self {
            Self::Handler(err) => NotifyStatus::from_error(err),
            Self::Decode(_) | Self::Encode(_) | Self::Timeout(_) => NotifyStatus::Failed,
        }
    }
}
