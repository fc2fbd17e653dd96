//! Branded ID newtypes for type safety.
//!
//! Every identifier crossing the gateway is a distinct newtype around `String`
//! so a chat ID can never be passed where a user ID is expected. Only
//! [`ConnectionId`] is minted by the gateway itself (UUID v7, time-ordered);
//! the rest arrive from clients or the domain layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from an existing string value.
            #[must_use]
            pub fn from_string(s: String) -> Self {
                Self(s)
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Identity of one open WebSocket connection.
    ConnectionId
}

branded_id! {
    /// Identifier of a user (the `{userID}` in `user/{userID}`).
    UserId
}

branded_id! {
    /// Identifier of a chat thread or group conversation.
    ChatId
}

branded_id! {
    /// Identifier of a single chat message.
    MessageId
}

branded_id! {
    /// Client-chosen request id copied into the sender's notification.
    CorrelationId
}

impl ConnectionId {
    /// Mint a fresh connection id (`conn_` + UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}
