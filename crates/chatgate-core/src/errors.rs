//! Error types shared across the gateway.
//!
//! - [`DecodeError`]: an inbound frame could not be decoded (dropped, never fatal)
//! - [`HandlerError`]: the domain layer rejected an operation with a reason
//! - [`ChannelError`]: the connection path does not name a valid channel

use thiserror::Error;

use crate::channel::Family;

/// Reason string the domain layer uses for membership/state conflicts.
pub const CONFLICT: &str = "CONFLICT";

/// Failure decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not a JSON object of the expected minimal shape.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The family's discriminant field is absent.
    #[error("missing {field} discriminant")]
    MissingDiscriminant {
        /// Field that was expected (`TGM`, `TUM`, `TCM`).
        field: &'static str,
    },

    /// The frame does not match the shape of the operation it names.
    #[error("frame does not match {code}: {source}")]
    Shape {
        /// Operation code whose shape was expected.
        code: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A shape of one family was requested for a frame of another.
    #[error("{found} shape requested for a {expected} frame")]
    FamilyMismatch {
        /// Family of the channel the frame arrived on.
        expected: Family,
        /// Family of the requested shape.
        found: Family,
    },
}

/// Rejection reported by a domain service.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct HandlerError {
    reason: String,
}

impl HandlerError {
    /// Create an error with an arbitrary reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The membership/state conflict error.
    pub fn conflict() -> Self {
        Self::new(CONFLICT)
    }

    /// The reason string.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Whether this is the `"CONFLICT"` reason.
    pub fn is_conflict(&self) -> bool {
        self.reason == CONFLICT
    }
}

/// Invalid connection path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The family segment is not `chat`, `user` or `group`.
    #[error("unknown family '{0}'")]
    UnknownFamily(String),

    /// `chat` and `user` channels need a sub-id.
    #[error("{0} channel requires an id")]
    MissingSubId(Family),
}
