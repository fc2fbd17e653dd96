//! Two-pass envelope decoding.
//!
//! Pass one reads only the correlation id and the family's discriminant field
//! (`TGM`, `TUM` or `TCM`). Pass two decodes the full operation shape once a
//! handler has been selected. Shapes of different operations share a prefix,
//! so the first pass must not assume anything beyond those two fields.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::Family;
use crate::errors::DecodeError;
use crate::ids::CorrelationId;

macro_rules! op_codes {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Every operation of this family, in code order.
            pub const ALL: &'static [Self] = &[$(Self::$variant,)+];

            /// Wire code of this operation.
            pub fn code(self) -> &'static str {
                match self {
                    $(Self::$variant => $code,)+
                }
            }

            /// Parse a wire code.
            pub fn from_code(code: &str) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

op_codes! {
    /// Group management operations.
    GroupOp {
        /// Create a group.
        Create => "TGM01",
        /// Delete a group.
        Delete => "TGM02",
        /// Add a member.
        AppendMember => "TGM03",
        /// Promote a member to admin.
        AppendAdmin => "TGM04",
        /// Demote an admin.
        RemoveAdmin => "TGM05",
        /// Remove a member.
        RemoveMember => "TGM06",
        /// Transfer ownership.
        ChangeOwner => "TGM07",
        /// Rename the group.
        Rename => "TGM08",
        /// Change the group avatar.
        ChangeAvatar => "TGM09",
        /// Setting: members may change name and avatar.
        SettingNameAvatar => "TGM10",
        /// Setting: members may pin messages.
        SettingPinMessages => "TGM11",
        /// Setting: members may send messages.
        SettingSendMessages => "TGM12",
        /// Setting: joining requires approval.
        SettingMembershipApproval => "TGM13",
        /// Setting: members may create polls.
        SettingCreatePolls => "TGM14",
    }
}

op_codes! {
    /// Personal inbox operations.
    UserOp {
        /// Send a friend request.
        AddFriendRequest => "TUM01",
        /// Withdraw a friend request.
        RemoveFriendRequest => "TUM02",
        /// Accept a friend request.
        AcceptFriendRequest => "TUM03",
        /// Remove a friend.
        Unfriend => "TUM04",
        /// Create a conversation after acceptance.
        CreateConversation => "TUM05",
    }
}

op_codes! {
    /// Chat thread operations.
    ChatOp {
        /// Append a message.
        AppendMessage => "TCM01",
        /// Delivery receipt.
        Delivery => "TCM02",
        /// Read receipt.
        Read => "TCM03",
        /// Hide a message for one user.
        Hide => "TCM04",
        /// Recall a message for everyone.
        Recall => "TCM05",
        /// Typing indicator.
        Typing => "TCM06",
        /// Cast a poll vote.
        AppendVote => "TCM07",
        /// Change a poll vote.
        ChangeVote => "TCM08",
        /// Lock a poll.
        LockPoll => "TCM09",
    }
}

impl GroupOp {
    /// The update-setting operations.
    pub fn is_setting(self) -> bool {
        matches!(
            self,
            Self::SettingNameAvatar
                | Self::SettingPinMessages
                | Self::SettingSendMessages
                | Self::SettingMembershipApproval
                | Self::SettingCreatePolls
        )
    }
}

/// A known operation in any family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpCode {
    /// `TGM..`
    Group(GroupOp),
    /// `TUM..`
    User(UserOp),
    /// `TCM..`
    Chat(ChatOp),
}

impl OpCode {
    /// Resolve a code within a family. Codes of other families never match.
    pub fn parse(family: Family, code: &str) -> Option<Self> {
        match family {
            Family::Group => GroupOp::from_code(code).map(Self::Group),
            Family::User => UserOp::from_code(code).map(Self::User),
            Family::Chat => ChatOp::from_code(code).map(Self::Chat),
        }
    }

    /// Family the operation belongs to.
    pub fn family(self) -> Family {
        match self {
            Self::Group(_) => Family::Group,
            Self::User(_) => Family::User,
            Self::Chat(_) => Family::Chat,
        }
    }

    /// Wire code.
    pub fn code(self) -> &'static str {
        match self {
            Self::Group(op) => op.code(),
            Self::User(op) => op.code(),
            Self::Chat(op) => op.code(),
        }
    }
}

/// Result of the discriminant pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Discriminant {
    /// A code this gateway handles.
    Known(OpCode),
    /// A code in the right field that this gateway does not know.
    Unknown(String),
}

#[derive(Deserialize)]
struct Header {
    #[serde(default)]
    id: Option<Value>,
    #[serde(rename = "TGM", alias = "tgm", default)]
    group: Option<String>,
    #[serde(rename = "TUM", alias = "tum", default)]
    user: Option<String>,
    #[serde(rename = "TCM", alias = "tcm", default)]
    chat: Option<String>,
}

impl Header {
    fn field(&self, family: Family) -> Option<&str> {
        match family {
            Family::Group => self.group.as_deref(),
            Family::User => self.user.as_deref(),
            Family::Chat => self.chat.as_deref(),
        }
    }
}

/// A typed operation shape belonging to one family.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Family whose envelopes may decode into this shape.
    const FAMILY: Family;
}

/// Inbound message after the discriminant pass.
#[derive(Clone, Debug)]
pub struct Envelope {
    family: Family,
    discriminant: Discriminant,
    correlation_id: Option<CorrelationId>,
    raw: String,
}

impl Envelope {
    /// Run the discriminant pass for a frame received on a `family` channel.
    pub fn decode_discriminant(family: Family, raw: impl Into<String>) -> Result<Self, DecodeError> {
        let raw = raw.into();
        let header: Header = serde_json::from_str(&raw).map_err(DecodeError::Malformed)?;

        let code = header
            .field(family)
            .ok_or(DecodeError::MissingDiscriminant {
                field: family.discriminant_field(),
            })?;
        let discriminant = match OpCode::parse(family, code) {
            Some(op) => Discriminant::Known(op),
            None => Discriminant::Unknown(code.to_owned()),
        };

        let correlation_id = match header.id {
            Some(Value::String(s)) => Some(CorrelationId::from(s)),
            Some(Value::Number(n)) => Some(CorrelationId::from(n.to_string())),
            _ => None,
        };

        Ok(Self {
            family,
            discriminant,
            correlation_id,
            raw,
        })
    }

    /// Run the full pass into the shape of the selected operation.
    pub fn decode<T: Payload>(&self) -> Result<T, DecodeError> {
        if T::FAMILY != self.family {
            return Err(DecodeError::FamilyMismatch {
                expected: self.family,
                found: T::FAMILY,
            });
        }
        serde_json::from_str(&self.raw).map_err(|source| DecodeError::Shape {
            code: self.code().to_owned(),
            source,
        })
    }

    /// Channel family the frame arrived on.
    pub fn family(&self) -> Family {
        self.family
    }

    /// Discriminant read in the first pass.
    pub fn discriminant(&self) -> &Discriminant {
        &self.discriminant
    }

    /// Known operation, if any.
    pub fn op(&self) -> Option<OpCode> {
        match self.discriminant {
            Discriminant::Known(op) => Some(op),
            Discriminant::Unknown(_) => None,
        }
    }

    /// Raw discriminant value.
    pub fn code(&self) -> &str {
        match &self.discriminant {
            Discriminant::Known(op) => op.code(),
            Discriminant::Unknown(code) => code,
        }
    }

    /// Correlation id (`id` field) if present.
    pub fn correlation_id(&self) -> Option<&CorrelationId> {
        self.correlation_id.as_ref()
    }

    /// The undecoded frame text.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Serialize an outbound value to frame text.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::payloads::{CreateGroup, MessageAppend, TypingIndicator};
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn reads_family_field_and_id() {
        let env = Envelope::decode_discriminant(
            Family::Group,
            r#"{"id":"r1","TGM":"TGM02","idChat":"g1"}"#,
        )
        .unwrap();
        assert_eq!(env.op(), Some(OpCode::Group(GroupOp::Delete)));
        assert_eq!(env.correlation_id().map(CorrelationId::as_str), Some("r1"));
        assert_eq!(env.code(), "TGM02");
    }

    #[test]
    fn lowercase_field_alias() {
        let env = Envelope::decode_discriminant(Family::Chat, r#"{"tcm":"TCM06"}"#).unwrap();
        assert_eq!(env.op(), Some(OpCode::Chat(ChatOp::Typing)));
        assert!(env.correlation_id().is_none());
    }

    #[test]
    fn numeric_id_is_stringified() {
        let env = Envelope::decode_discriminant(Family::User, r#"{"id":42,"TUM":"TUM01"}"#).unwrap();
        assert_eq!(env.correlation_id().map(CorrelationId::as_str), Some("42"));
    }

    #[test]
    fn other_family_field_is_ignored() {
        let err = Envelope::decode_discriminant(Family::Chat, r#"{"TGM":"TGM01"}"#).unwrap_err();
        assert_matches!(err, DecodeError::MissingDiscriminant { field: "TCM" });
    }

    #[test]
    fn unknown_code_within_family() {
        let env = Envelope::decode_discriminant(Family::Group, r#"{"TGM":"TGM99"}"#).unwrap();
        assert_eq!(env.discriminant(), &Discriminant::Unknown("TGM99".into()));
        assert!(env.op().is_none());
    }

    #[test]
    fn code_of_other_family_is_unknown() {
        let env = Envelope::decode_discriminant(Family::Group, r#"{"TGM":"TCM01"}"#).unwrap();
        assert!(env.op().is_none());
    }

    #[test]
    fn malformed_json() {
        assert_matches!(
            Envelope::decode_discriminant(Family::Chat, "not json"),
            Err(DecodeError::Malformed(_))
        );
        assert_matches!(
            Envelope::decode_discriminant(Family::Chat, r#"{"TCM":7}"#),
            Err(DecodeError::Malformed(_))
        );
    }

    #[test]
    fn full_pass_rejects_other_family_shape() {
        let env = Envelope::decode_discriminant(
            Family::Chat,
            r#"{"TCM":"TCM06","senderID":"u1","senderName":"A","senderAvatar":""}"#,
        )
        .unwrap();
        assert_matches!(
            env.decode::<CreateGroup>(),
            Err(DecodeError::FamilyMismatch {
                expected: Family::Chat,
                found: Family::Group
            })
        );
        let typing: TypingIndicator = env.decode().unwrap();
        assert_eq!(typing.sender_id.as_str(), "u1");
    }

    #[test]
    fn full_pass_shape_error_names_code() {
        let env = Envelope::decode_discriminant(Family::Chat, r#"{"TCM":"TCM01"}"#).unwrap();
        let err = env.decode::<MessageAppend>().unwrap_err();
        assert_matches!(err, DecodeError::Shape { ref code, .. } if code == "TCM01");
    }

    #[test]
    fn op_code_tables_round_trip() {
        for op in GroupOp::ALL {
            assert_eq!(GroupOp::from_code(op.code()), Some(*op));
        }
        for op in UserOp::ALL {
            assert_eq!(UserOp::from_code(op.code()), Some(*op));
        }
        for op in ChatOp::ALL {
            assert_eq!(ChatOp::from_code(op.code()), Some(*op));
        }
        assert_eq!(GroupOp::ALL.len(), 14);
        assert_eq!(UserOp::ALL.len(), 5);
        assert_eq!(ChatOp::ALL.len(), 9);
    }

    #[test]
    fn encode_value() {
        assert_eq!(encode(&json!({"a": 1})).unwrap(), r#"{"a":1}"#);
    }

    fn any_family() -> impl Strategy<Value = Family> {
        prop_oneof![Just(Family::Chat), Just(Family::User), Just(Family::Group)]
    }

    proptest! {
        #[test]
        fn discriminant_never_leaks_across_families(
            channel in any_family(),
            sent in any_family(),
            n in 0u8..20,
        ) {
            let field = sent.discriminant_field();
            let code = format!("{field}{n:02}");
            let raw = format!(r#"{{"{field}":"{code}"}}"#);
            match Envelope::decode_discriminant(channel, raw) {
                Ok(env) => {
                    prop_assert_eq!(channel, sent);
                    if let Some(op) = env.op() {
                        prop_assert_eq!(op.family(), channel);
                        prop_assert_eq!(op.code(), code.as_str());
                    }
                }
                Err(err) => {
                    prop_assert_ne!(channel, sent);
                    let is_missing = matches!(err, DecodeError::MissingDiscriminant { .. });
                    prop_assert!(is_missing);
                }
            }
        }
    }
}
