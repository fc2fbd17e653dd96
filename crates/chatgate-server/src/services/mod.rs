//! Domain collaborators the gateway calls into.
//!
//! The gateway validates nothing and persists nothing itself: every operation
//! is forwarded to one of these traits, which either succeed or fail with a
//! [`HandlerError`] reason. Group calls that change or read membership return
//! the current recipient ids, since membership is authoritative only here.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chatgate_core::HandlerError;
use chatgate_core::ids::{ChatId, UserId};
use chatgate_core::wire::payloads::{
    ChangeGroupAvatar, CreateGroup, DeleteGroup, FriendRequest, HideMessage, LockPoll,
    MemberChange, MessageAppend, MessageReceipt, RecallMessage, RenameGroup, Unfriend,
    UpdateGroupSetting,
};
use serde::{Deserialize, Serialize};

pub use memory::InMemoryBackend;

/// Result of a group call that yields recipients.
pub type MemberList = Result<Vec<UserId>, HandlerError>;

/// The five toggleable group settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GroupSetting {
    /// Members may change the group name and avatar.
    ChangeNameAndAvatar,
    /// Members may pin messages.
    PinMessages,
    /// Members may send messages.
    SendMessages,
    /// New members need approval.
    MembershipApproval,
    /// Members may create polls.
    CreatePolls,
}

/// Kind of conversation created for a pair of users.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConversationKind {
    /// Between users who are not (yet) friends.
    Stranger,
    /// Between friends.
    Friend,
    /// Group conversation.
    Group,
}

/// Group lifecycle, membership and settings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GroupService: Send + Sync {
    /// Create a group for `participants` (owner first); returns its id.
    async fn create(&self, participants: &[UserId], request: &CreateGroup) -> Result<ChatId, HandlerError>;
    /// Delete a group; returns the members at deletion time, owner first.
    async fn delete(&self, request: &DeleteGroup) -> MemberList;
    /// Add `userAct` as a member.
    async fn append_member(&self, request: &MemberChange) -> MemberList;
    /// Promote `userAct` to admin.
    async fn append_admin(&self, request: &MemberChange) -> MemberList;
    /// Demote `userAct`.
    async fn remove_admin(&self, request: &MemberChange) -> MemberList;
    /// Remove `userAct`; the returned set still includes them.
    async fn remove_member(&self, request: &MemberChange) -> MemberList;
    /// Make `userAct` the owner.
    async fn change_owner(&self, request: &MemberChange) -> MemberList;
    /// Rename the group.
    async fn rename(&self, request: &RenameGroup) -> MemberList;
    /// Change the group avatar.
    async fn change_avatar(&self, request: &ChangeGroupAvatar) -> MemberList;
    /// Toggle one setting.
    async fn update_setting(&self, setting: GroupSetting, request: &UpdateGroupSetting) -> MemberList;
}

/// Friend requests and one-to-one conversations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserService: Send + Sync {
    /// Record a pending friend request.
    async fn append_friend_request(&self, request: &FriendRequest) -> Result<(), HandlerError>;
    /// Withdraw a pending friend request.
    async fn remove_friend_request(&self, request: &FriendRequest) -> Result<(), HandlerError>;
    /// Accept a pending friend request.
    async fn accept_friend_request(&self, request: &FriendRequest) -> Result<(), HandlerError>;
    /// End a friendship.
    async fn unfriend(&self, request: &Unfriend) -> Result<(), HandlerError>;
    /// Create the pair's conversation.
    async fn append_conversations(
        &self,
        request: &FriendRequest,
        kind: ConversationKind,
    ) -> Result<(), HandlerError>;
}

/// Chat history, receipts and polls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Append a message.
    async fn append_message(&self, chat: &ChatId, message: &MessageAppend) -> Result<(), HandlerError>;
    /// Record a delivery receipt.
    async fn change_delivery(&self, chat: &ChatId, receipt: &MessageReceipt) -> Result<(), HandlerError>;
    /// Record a read receipt.
    async fn change_read(&self, chat: &ChatId, receipt: &MessageReceipt) -> Result<(), HandlerError>;
    /// Hide a message for one user.
    async fn hide_message(&self, chat: &ChatId, request: &HideMessage) -> Result<(), HandlerError>;
    /// Recall a message for everyone.
    async fn recall_message(&self, chat: &ChatId, request: &RecallMessage) -> Result<(), HandlerError>;
    /// Cast a poll vote.
    async fn append_vote(&self, chat: &ChatId, vote: &MessageAppend) -> Result<(), HandlerError>;
    /// Change a poll vote.
    async fn change_vote(&self, chat: &ChatId, vote: &MessageAppend) -> Result<(), HandlerError>;
    /// Lock a poll against further votes.
    async fn lock_poll(&self, chat: &ChatId, request: &LockPoll) -> Result<(), HandlerError>;
    /// The last `count` messages of a chat, oldest first.
    async fn recent_messages(&self, chat: &ChatId, count: usize) -> Result<Vec<MessageAppend>, HandlerError>;
}

/// Conversation-list summaries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationSync: Send + Sync {
    /// Refresh the summary of `chat` from its latest messages.
    async fn refresh_summary(&self, chat: &ChatId, messages: &[MessageAppend]) -> Result<(), HandlerError>;
}

/// The full set of collaborators.
#[derive(Clone)]
pub struct Services {
    /// Group operations.
    pub group: Arc<dyn GroupService>,
    /// User operations.
    pub user: Arc<dyn UserService>,
    /// Chat operations.
    pub chat: Arc<dyn ChatService>,
    /// Post-disconnect summary refresh.
    pub sync: Arc<dyn ConversationSync>,
}

impl Services {
    /// Bundle four collaborators.
    pub fn new(
        group: Arc<dyn GroupService>,
        user: Arc<dyn UserService>,
        chat: Arc<dyn ChatService>,
        sync: Arc<dyn ConversationSync>,
    ) -> Self {
        Self {
            group,
            user,
            chat,
            sync,
        }
    }

    /// Every collaborator backed by one [`InMemoryBackend`].
    pub fn in_memory() -> (Self, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let services = Self::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
        );
        (services, backend)
    }
}
