//! Sender-only acknowledgement frames.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::channel::Family;
use crate::errors::HandlerError;
use crate::ids::CorrelationId;

/// Outcome reported to the originating connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotifyStatus {
    /// The operation was applied.
    Success,
    /// The operation failed for any reason other than a conflict.
    Failed,
    /// The domain layer reported a membership/state conflict.
    Conflict,
}

impl NotifyStatus {
    /// Map a handler rejection to a status.
    pub fn from_error(err: &HandlerError) -> Self {
        if err.is_conflict() {
            Self::Conflict
        } else {
            Self::Failed
        }
    }

    /// Wire form, also used as a metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Conflict => "CONFLICT",
        }
    }
}

/// `{"id": .., "<TGM|TUM|TCM>": "<xx00>", "typeNotify": ..}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    /// Copied from the request, `null` when the request had none.
    pub correlation_id: Option<CorrelationId>,
    /// Family whose ack kind is emitted.
    pub family: Family,
    /// Outcome.
    pub status: NotifyStatus,
}

impl Notification {
    /// Build a notification.
    pub fn new(correlation_id: Option<CorrelationId>, family: Family, status: NotifyStatus) -> Self {
        Self {
            correlation_id,
            family,
            status,
        }
    }
}

impl Serialize for Notification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("id", &self.correlation_id)?;
        map.serialize_entry(self.family.discriminant_field(), self.family.ack_kind())?;
        map.serialize_entry("typeNotify", &self.status)?;
        map.end()
    }
}
