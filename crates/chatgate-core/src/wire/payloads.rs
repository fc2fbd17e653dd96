//! Typed operation shapes.
//!
//! Field names follow the wire contract exactly (`userID`, `idChat`, ...).
//! Every shape keeps fields it does not model in `extra`, which includes the
//! correlation id and discriminant, so re-serializing a decoded payload for
//! broadcast reproduces what the client sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::channel::Family;
use crate::ids::{ChatId, MessageId, UserId};
use crate::wire::envelope::Payload;

/// Identity card of a user as it appears inside payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersonInfo {
    /// User id.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Display name.
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Avatar URL.
    #[serde(rename = "userAvatar", default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
}

impl PersonInfo {
    /// A card carrying only the id.
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: None,
            user_avatar: None,
        }
    }
}

macro_rules! payload {
    ($family:ident => $($ty:ty),+ $(,)?) => {
        $(impl Payload for $ty {
            const FAMILY: Family = Family::$family;
        })+
    };
}

// ── Group ───────────────────────────────────────────────────────────

/// `TGM01`: create a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateGroup {
    /// Group id, when the client picks one.
    #[serde(rename = "idChat", default, skip_serializing_if = "Option::is_none")]
    pub id_chat: Option<ChatId>,
    /// Group name.
    #[serde(rename = "chatName", default)]
    pub chat_name: String,
    /// Creator.
    pub owner: PersonInfo,
    /// Initial members, excluding the owner.
    #[serde(default)]
    pub members: Vec<PersonInfo>,
    /// Group avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CreateGroup {
    /// Owner followed by every member, duplicates removed.
    pub fn participant_ids(&self) -> Vec<UserId> {
        let mut ids = Vec::with_capacity(self.members.len() + 1);
        for id in std::iter::once(&self.owner)
            .chain(&self.members)
            .map(|p| &p.user_id)
        {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// `TGM02`: delete a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeleteGroup {
    /// Group id.
    #[serde(rename = "idChat")]
    pub id_chat: ChatId,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TGM03`..`TGM07`: membership and role changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberChange {
    /// Group id.
    #[serde(rename = "idChat")]
    pub id_chat: ChatId,
    /// User the change applies to.
    #[serde(rename = "userAct")]
    pub user_act: PersonInfo,
    /// User performing the change.
    #[serde(rename = "userPerformer", default, skip_serializing_if = "Option::is_none")]
    pub user_performer: Option<PersonInfo>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TGM08`: rename a group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenameGroup {
    /// Group id.
    #[serde(rename = "idChat")]
    pub id_chat: ChatId,
    /// New name.
    #[serde(rename = "chatName")]
    pub chat_name: String,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TGM09`: change the group avatar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeGroupAvatar {
    /// Group id.
    #[serde(rename = "idChat")]
    pub id_chat: ChatId,
    /// New avatar URL.
    pub avatar: String,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TGM10`..`TGM14`: toggle a group setting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateGroupSetting {
    /// Group id.
    #[serde(rename = "idChat")]
    pub id_chat: ChatId,
    /// New value.
    pub value: bool,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

payload!(Group => CreateGroup, DeleteGroup, MemberChange, RenameGroup, ChangeGroupAvatar, UpdateGroupSetting);

// ── User ────────────────────────────────────────────────────────────

/// `TUM01`/`TUM02`/`TUM03`/`TUM05`: friend request lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Requesting user.
    #[serde(rename = "senderID")]
    pub sender_id: UserId,
    /// Requesting user's name.
    #[serde(rename = "senderName", default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Requesting user's avatar.
    #[serde(rename = "senderAvatar", default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    /// Receiving user.
    #[serde(rename = "receiverID")]
    pub receiver_id: UserId,
    /// Receiving user's name.
    #[serde(rename = "receiverName", default, skip_serializing_if = "Option::is_none")]
    pub receiver_name: Option<String>,
    /// Receiving user's avatar.
    #[serde(rename = "receiverAvatar", default, skip_serializing_if = "Option::is_none")]
    pub receiver_avatar: Option<String>,
    /// Greeting text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Conversation id shared by the pair.
    #[serde(rename = "idChat", default, skip_serializing_if = "Option::is_none")]
    pub id_chat: Option<ChatId>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TUM04`: remove a friend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Unfriend {
    /// Acting user.
    #[serde(rename = "senderID")]
    pub sender_id: UserId,
    /// Former friend.
    #[serde(rename = "receiverID")]
    pub receiver_id: UserId,
    /// Conversation id shared by the pair.
    #[serde(rename = "idChat", default, skip_serializing_if = "Option::is_none")]
    pub id_chat: Option<ChatId>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

payload!(User => FriendRequest, Unfriend);

// ── Chat ────────────────────────────────────────────────────────────

/// `TCM01`/`TCM07`/`TCM08`: a message or a poll vote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageAppend {
    /// Message id.
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    /// Author.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Author's name.
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Author's avatar.
    #[serde(rename = "userAvatar", default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    /// Message body, opaque to the gateway.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub contents: Value,
    /// Message being replied to.
    #[serde(rename = "parentID", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    /// Client timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TCM02`/`TCM03`: delivery and read receipts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MessageReceipt {
    /// Receipt owner.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Last delivered/read message.
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    /// Receipt owner's avatar.
    #[serde(rename = "userAvatar", default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    /// Receipt owner's name.
    #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TCM04`: hide a message for one user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HideMessage {
    /// User hiding the message.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Target message.
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TCM05`: recall a message for everyone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecallMessage {
    /// Target message.
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    /// User recalling it.
    #[serde(rename = "userID", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TCM06`: typing indicator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TypingIndicator {
    /// Typing user.
    #[serde(rename = "senderID")]
    pub sender_id: UserId,
    /// Typing user's name.
    #[serde(rename = "senderName", default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    /// Typing user's avatar.
    #[serde(rename = "senderAvatar", default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `TCM09`: lock a poll.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LockPoll {
    /// Poll message.
    #[serde(rename = "messageID")]
    pub message_id: MessageId,
    /// User locking the poll.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// Unmodelled fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

payload!(Chat => MessageAppend, MessageReceipt, HideMessage, RecallMessage, TypingIndicator, LockPoll);
