//! Operation families and channel keys.
//!
//! A client connects on `/ws/{family}/{subId}`. The family selects the
//! dispatch table; family plus sub-id form the [`ChannelKey`] the connection
//! is filed under in the registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ChannelError;
use crate::ids::{ChatId, UserId};

/// Operation family. Each family has its own discriminant field and codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Chat thread operations (`TCM..`).
    Chat,
    /// Personal inbox operations (`TUM..`).
    User,
    /// Group management operations (`TGM..`).
    Group,
}

impl Family {
    /// Path segment and metric label for this family.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::User => "user",
            Self::Group => "group",
        }
    }

    /// JSON field holding the operation discriminant.
    pub fn discriminant_field(self) -> &'static str {
        match self {
            Self::Chat => "TCM",
            Self::User => "TUM",
            Self::Group => "TGM",
        }
    }

    /// Ack kind carried by every notification of this family.
    pub fn ack_kind(self) -> &'static str {
        match self {
            Self::Chat => "TCM00",
            Self::User => "TUM00",
            Self::Group => "TGM00",
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Family {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "user" => Ok(Self::User),
            "group" => Ok(Self::Group),
            other => Err(ChannelError::UnknownFamily(other.to_owned())),
        }
    }
}

/// Broadcast scope a connection is registered under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelKey {
    /// `chat/{chatID}`
    Chat(ChatId),
    /// `user/{userID}`
    User(UserId),
    /// `group` (addressing is computed per operation)
    Group,
}

impl ChannelKey {
    /// Build a key from the request path segments.
    ///
    /// `sub_id` is required for `chat` and `user` and ignored for `group`.
    pub fn from_path(family: &str, sub_id: Option<&str>) -> Result<Self, ChannelError> {
        let family: Family = family.parse()?;
        let sub_id = sub_id.map(str::trim).filter(|s| !s.is_empty());
        match (family, sub_id) {
            (Family::Group, _) => Ok(Self::Group),
            (Family::Chat, Some(id)) => Ok(Self::Chat(ChatId::from(id))),
            (Family::User, Some(id)) => Ok(Self::User(UserId::from(id))),
            (family, None) => Err(ChannelError::MissingSubId(family)),
        }
    }

    /// The personal channel of a user.
    pub fn user(id: &UserId) -> Self {
        Self::User(id.clone())
    }

    /// Family this channel belongs to.
    pub fn family(&self) -> Family {
        match self {
            Self::Chat(_) => Family::Chat,
            Self::User(_) => Family::User,
            Self::Group => Family::Group,
        }
    }

    /// Chat id for chat channels.
    pub fn chat_id(&self) -> Option<&ChatId> {
        match self {
            Self::Chat(id) => Some(id),
            _ => None,
        }
    }

    /// User id for personal channels.
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::User(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "chat/{id}"),
            Self::User(id) => write!(f, "user/{id}"),
            Self::Group => f.write_str("group"),
        }
    }
}
