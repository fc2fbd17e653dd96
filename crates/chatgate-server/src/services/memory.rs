//! In-process reference backend.
//!
//! Implements every collaborator trait against in-memory state so the gateway
//! runs standalone. State conflicts (duplicate member, pending request that
//! already exists, vote on a locked poll, ...) are reported as `CONFLICT`;
//! missing entities are reported with a descriptive reason.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chatgate_core::HandlerError;
use chatgate_core::ids::{ChatId, MessageId, UserId};
use chatgate_core::wire::payloads::{
    ChangeGroupAvatar, CreateGroup, DeleteGroup, FriendRequest, HideMessage, LockPoll,
    MemberChange, MessageAppend, MessageReceipt, RecallMessage, RenameGroup, Unfriend,
    UpdateGroupSetting,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{
    ChatService, ConversationKind, ConversationSync, GroupService, GroupSetting, MemberList,
    UserService,
};

/// Stored group.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupRecord {
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub avatar: Option<String>,
    /// Current owner (always a member).
    pub owner: UserId,
    /// Admins (always members, never the owner).
    pub admins: Vec<UserId>,
    /// Members in join order, owner included.
    pub members: Vec<UserId>,
    /// Enabled settings.
    pub settings: HashMap<GroupSetting, bool>,
}

impl GroupRecord {
    fn is_member(&self, id: &UserId) -> bool {
        self.members.contains(id)
    }

    /// Members with the owner first.
    fn recipients(&self) -> Vec<UserId> {
        let mut ids = vec![self.owner.clone()];
        ids.extend(self.members.iter().filter(|m| **m != self.owner).cloned());
        ids
    }
}

#[derive(Debug, Default)]
struct ChatLog {
    messages: Vec<MessageAppend>,
    recalled: HashSet<MessageId>,
    hidden: HashMap<MessageId, HashSet<UserId>>,
    delivered: HashMap<UserId, MessageId>,
    read: HashMap<UserId, MessageId>,
    votes: HashMap<MessageId, HashMap<UserId, Value>>,
    locked_polls: HashSet<MessageId>,
}

impl ChatLog {
    fn has_message(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.message_id == id)
    }
}

#[derive(Debug, Default)]
struct Social {
    /// Pending requests as (sender, receiver).
    pending: HashSet<(UserId, UserId)>,
    /// Friendships stored with the smaller id first.
    friends: HashSet<(UserId, UserId)>,
    /// Conversations per user.
    conversations: HashMap<UserId, HashMap<ChatId, ConversationKind>>,
}

fn pair(a: &UserId, b: &UserId) -> (UserId, UserId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

fn not_found(what: &str, id: &str) -> HandlerError {
    HandlerError::new(format!("{what} {id} not found"))
}

/// In-memory implementation of every collaborator trait.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    groups: DashMap<ChatId, GroupRecord>,
    chats: DashMap<ChatId, ChatLog>,
    social: Mutex<Social>,
    summaries: DashMap<ChatId, Option<MessageId>>,
}

impl InMemoryBackend {
    /// Empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a group.
    pub fn group(&self, id: &ChatId) -> Option<GroupRecord> {
        self.groups.get(id).map(|g| g.clone())
    }

    /// Whether two users are friends.
    pub fn are_friends(&self, a: &UserId, b: &UserId) -> bool {
        self.social.lock().friends.contains(&pair(a, b))
    }

    /// Whether `sender` has a pending request to `receiver`.
    pub fn has_pending_request(&self, sender: &UserId, receiver: &UserId) -> bool {
        self.social
            .lock()
            .pending
            .contains(&(sender.clone(), receiver.clone()))
    }

    /// Conversation kind between `user` and `chat`, if any.
    pub fn conversation(&self, user: &UserId, chat: &ChatId) -> Option<ConversationKind> {
        self.social
            .lock()
            .conversations
            .get(user)
            .and_then(|c| c.get(chat).copied())
    }

    /// Number of messages stored for a chat.
    pub fn message_count(&self, chat: &ChatId) -> usize {
        self.chats.get(chat).map_or(0, |log| log.messages.len())
    }

    /// Last summary refresh for a chat: `Some(None)` when refreshed empty.
    pub fn summary(&self, chat: &ChatId) -> Option<Option<MessageId>> {
        self.summaries.get(chat).map(|s| s.clone())
    }

    fn with_group<F>(&self, id: &ChatId, f: F) -> MemberList
    where
        F: FnOnce(&mut GroupRecord) -> Result<(), HandlerError>,
    {
        let mut group = self
            .groups
            .get_mut(id)
            .ok_or_else(|| not_found("group", id))?;
        f(&mut *group)?;
        Ok(group.recipients())
    }

    /// Run `f` on an existing chat; only `append_message` creates one.
    fn with_chat<T, F>(&self, id: &ChatId, f: F) -> Result<T, HandlerError>
    where
        F: FnOnce(&mut ChatLog) -> Result<T, HandlerError>,
    {
        let mut log = self.chats.get_mut(id).ok_or_else(|| not_found("chat", id))?;
        f(&mut *log)
    }

    /// Number of chats with stored state.
    pub fn chat_count(&self) -> usize {
        self.chats.len()
    }

    fn add_conversation(social: &mut Social, user: &UserId, chat: &ChatId, kind: ConversationKind) -> bool {
        social
            .conversations
            .entry(user.clone())
            .or_default()
            .insert(chat.clone(), kind)
            .is_none()
    }
}

#[async_trait]
impl GroupService for InMemoryBackend {
    async fn create(&self, participants: &[UserId], request: &CreateGroup) -> Result<ChatId, HandlerError> {
        let id = request
            .id_chat
            .clone()
            .unwrap_or_else(|| ChatId::from(Uuid::now_v7().to_string()));
        let record = GroupRecord {
            name: request.chat_name.clone(),
            avatar: request.avatar.clone(),
            owner: request.owner.user_id.clone(),
            admins: Vec::new(),
            members: participants.to_vec(),
            settings: HashMap::new(),
        };

        match self.groups.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(HandlerError::conflict()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let _ = slot.insert(record);
            }
        }
        {
            let mut social = self.social.lock();
            for member in participants {
                let _ = Self::add_conversation(&mut social, member, &id, ConversationKind::Group);
            }
        }
        debug!(group = %id, members = participants.len(), "group created");
        Ok(id)
    }

    async fn delete(&self, request: &DeleteGroup) -> MemberList {
        let (_, group) = self
            .groups
            .remove(&request.id_chat)
            .ok_or_else(|| not_found("group", &request.id_chat))?;
        let mut social = self.social.lock();
        for member in &group.members {
            if let Some(convs) = social.conversations.get_mut(member) {
                let _ = convs.remove(&request.id_chat);
            }
        }
        Ok(group.recipients())
    }

    async fn append_member(&self, request: &MemberChange) -> MemberList {
        let user = &request.user_act.user_id;
        let recipients = self.with_group(&request.id_chat, |g| {
            if g.is_member(user) {
                return Err(HandlerError::conflict());
            }
            g.members.push(user.clone());
            Ok(())
        })?;
        let _ = Self::add_conversation(
            &mut self.social.lock(),
            user,
            &request.id_chat,
            ConversationKind::Group,
        );
        Ok(recipients)
    }

    async fn append_admin(&self, request: &MemberChange) -> MemberList {
        let user = &request.user_act.user_id;
        self.with_group(&request.id_chat, |g| {
            if !g.is_member(user) || g.owner == *user || g.admins.contains(user) {
                return Err(HandlerError::conflict());
            }
            g.admins.push(user.clone());
            Ok(())
        })
    }

    async fn remove_admin(&self, request: &MemberChange) -> MemberList {
        let user = &request.user_act.user_id;
        self.with_group(&request.id_chat, |g| {
            let before = g.admins.len();
            g.admins.retain(|a| a != user);
            if g.admins.len() == before {
                return Err(HandlerError::conflict());
            }
            Ok(())
        })
    }

    async fn remove_member(&self, request: &MemberChange) -> MemberList {
        let user = &request.user_act.user_id;
        let mut group = self
            .groups
            .get_mut(&request.id_chat)
            .ok_or_else(|| not_found("group", &request.id_chat))?;
        if !group.is_member(user) || group.owner == *user {
            return Err(HandlerError::conflict());
        }
        let recipients = group.recipients();
        group.members.retain(|m| m != user);
        group.admins.retain(|a| a != user);
        drop(group);

        if let Some(convs) = self.social.lock().conversations.get_mut(user) {
            let _ = convs.remove(&request.id_chat);
        }
        Ok(recipients)
    }

    async fn change_owner(&self, request: &MemberChange) -> MemberList {
        let user = &request.user_act.user_id;
        self.with_group(&request.id_chat, |g| {
            if !g.is_member(user) || g.owner == *user {
                return Err(HandlerError::conflict());
            }
            g.admins.retain(|a| a != user);
            g.owner = user.clone();
            Ok(())
        })
    }

    async fn rename(&self, request: &RenameGroup) -> MemberList {
        self.with_group(&request.id_chat, |g| {
            g.name.clone_from(&request.chat_name);
            Ok(())
        })
    }

    async fn change_avatar(&self, request: &ChangeGroupAvatar) -> MemberList {
        self.with_group(&request.id_chat, |g| {
            g.avatar = Some(request.avatar.clone());
            Ok(())
        })
    }

    async fn update_setting(&self, setting: GroupSetting, request: &UpdateGroupSetting) -> MemberList {
        self.with_group(&request.id_chat, |g| {
            let _ = g.settings.insert(setting, request.value);
            Ok(())
        })
    }
}

#[async_trait]
impl UserService for InMemoryBackend {
    async fn append_friend_request(&self, request: &FriendRequest) -> Result<(), HandlerError> {
        let (sender, receiver) = (&request.sender_id, &request.receiver_id);
        let mut social = self.social.lock();
        if sender == receiver
            || social.friends.contains(&pair(sender, receiver))
            || social.pending.contains(&(sender.clone(), receiver.clone()))
            || social.pending.contains(&(receiver.clone(), sender.clone()))
        {
            return Err(HandlerError::conflict());
        }
        let _ = social.pending.insert((sender.clone(), receiver.clone()));
        Ok(())
    }

    async fn remove_friend_request(&self, request: &FriendRequest) -> Result<(), HandlerError> {
        let key = (request.sender_id.clone(), request.receiver_id.clone());
        if self.social.lock().pending.remove(&key) {
            Ok(())
        } else {
            Err(HandlerError::new("friend request not found"))
        }
    }

    async fn accept_friend_request(&self, request: &FriendRequest) -> Result<(), HandlerError> {
        let (a, b) = (&request.sender_id, &request.receiver_id);
        let mut social = self.social.lock();
        if social.friends.contains(&pair(a, b)) {
            return Err(HandlerError::conflict());
        }
        let removed = social.pending.remove(&(a.clone(), b.clone()))
            | social.pending.remove(&(b.clone(), a.clone()));
        if !removed {
            return Err(HandlerError::new("friend request not found"));
        }
        let _ = social.friends.insert(pair(a, b));
        if let Some(chat) = &request.id_chat {
            for user in [a, b] {
                if let Some(kind) = social
                    .conversations
                    .get_mut(user)
                    .and_then(|c| c.get_mut(chat))
                {
                    *kind = ConversationKind::Friend;
                }
            }
        }
        Ok(())
    }

    async fn unfriend(&self, request: &Unfriend) -> Result<(), HandlerError> {
        let mut social = self.social.lock();
        if social
            .friends
            .remove(&pair(&request.sender_id, &request.receiver_id))
        {
            Ok(())
        } else {
            Err(HandlerError::conflict())
        }
    }

    async fn append_conversations(
        &self,
        request: &FriendRequest,
        kind: ConversationKind,
    ) -> Result<(), HandlerError> {
        let chat = request
            .id_chat
            .clone()
            .ok_or_else(|| HandlerError::new("idChat is required"))?;
        let mut social = self.social.lock();
        let added_sender = Self::add_conversation(&mut social, &request.sender_id, &chat, kind);
        let added_receiver = Self::add_conversation(&mut social, &request.receiver_id, &chat, kind);
        if added_sender || added_receiver {
            Ok(())
        } else {
            Err(HandlerError::conflict())
        }
    }
}

#[async_trait]
impl ChatService for InMemoryBackend {
    async fn append_message(&self, chat: &ChatId, message: &MessageAppend) -> Result<(), HandlerError> {
        let mut log = self.chats.entry(chat.clone()).or_default();
        if log.has_message(&message.message_id) {
            return Err(HandlerError::conflict());
        }
        log.messages.push(message.clone());
        Ok(())
    }

    async fn change_delivery(&self, chat: &ChatId, receipt: &MessageReceipt) -> Result<(), HandlerError> {
        self.with_chat(chat, |log| {
            let _ = log
                .delivered
                .insert(receipt.user_id.clone(), receipt.message_id.clone());
            Ok(())
        })
    }

    async fn change_read(&self, chat: &ChatId, receipt: &MessageReceipt) -> Result<(), HandlerError> {
        self.with_chat(chat, |log| {
            let _ = log
                .read
                .insert(receipt.user_id.clone(), receipt.message_id.clone());
            Ok(())
        })
    }

    async fn hide_message(&self, chat: &ChatId, request: &HideMessage) -> Result<(), HandlerError> {
        self.with_chat(chat, |log| {
            if !log.has_message(&request.message_id) {
                return Err(not_found("message", &request.message_id));
            }
            let hidden = log.hidden.entry(request.message_id.clone()).or_default();
            if hidden.insert(request.user_id.clone()) {
                Ok(())
            } else {
                Err(HandlerError::conflict())
            }
        })
    }

    async fn recall_message(&self, chat: &ChatId, request: &RecallMessage) -> Result<(), HandlerError> {
        self.with_chat(chat, |log| {
            if !log.has_message(&request.message_id) {
                return Err(not_found("message", &request.message_id));
            }
            if log.recalled.insert(request.message_id.clone()) {
                Ok(())
            } else {
                Err(HandlerError::conflict())
            }
        })
    }

    async fn append_vote(&self, chat: &ChatId, vote: &MessageAppend) -> Result<(), HandlerError> {
        self.with_chat(chat, |log| {
            if log.locked_polls.contains(&vote.message_id) {
                return Err(HandlerError::conflict());
            }
            let votes = log.votes.entry(vote.message_id.clone()).or_default();
            if votes.contains_key(&vote.user_id) {
                return Err(HandlerError::conflict());
            }
            let _ = votes.insert(vote.user_id.clone(), vote.contents.clone());
            Ok(())
        })
    }

    async fn change_vote(&self, chat: &ChatId, vote: &MessageAppend) -> Result<(), HandlerError> {
        self.with_chat(chat, |log| {
            if log.locked_polls.contains(&vote.message_id) {
                return Err(HandlerError::conflict());
            }
            let existing = log
                .votes
                .get_mut(&vote.message_id)
                .and_then(|v| v.get_mut(&vote.user_id))
                .ok_or_else(|| HandlerError::new("vote not found"))?;
            *existing = vote.contents.clone();
            Ok(())
        })
    }

    async fn lock_poll(&self, chat: &ChatId, request: &LockPoll) -> Result<(), HandlerError> {
        self.with_chat(chat, |log| {
            if log.locked_polls.insert(request.message_id.clone()) {
                Ok(())
            } else {
                Err(HandlerError::conflict())
            }
        })
    }

    async fn recent_messages(&self, chat: &ChatId, count: usize) -> Result<Vec<MessageAppend>, HandlerError> {
        Ok(self.chats.get(chat).map_or_else(Vec::new, |log| {
            let start = log.messages.len().saturating_sub(count);
            log.messages[start..].to_vec()
        }))
    }
}

#[async_trait]
impl ConversationSync for InMemoryBackend {
    async fn refresh_summary(&self, chat: &ChatId, messages: &[MessageAppend]) -> Result<(), HandlerError> {
        let last = messages.last().map(|m| m.message_id.clone());
        let _ = self.summaries.insert(chat.clone(), last);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::wire::payloads::PersonInfo;
    use serde_json::{Map, json};

    fn create_req(id: &str, owner: &str, members: &[&str]) -> CreateGroup {
        CreateGroup {
            id_chat: Some(ChatId::from(id)),
            chat_name: "team".into(),
            owner: PersonInfo::new(owner),
            members: members.iter().map(|m| PersonInfo::new(*m)).collect(),
            avatar: None,
            extra: Map::new(),
        }
    }

    fn change(group: &str, user: &str) -> MemberChange {
        MemberChange {
            id_chat: ChatId::from(group),
            user_act: PersonInfo::new(user),
            user_performer: None,
            extra: Map::new(),
        }
    }

    fn friend_req(sender: &str, receiver: &str) -> FriendRequest {
        serde_json::from_value(json!({
            "senderID": sender,
            "receiverID": receiver,
            "idChat": format!("{sender}-{receiver}"),
        }))
        .unwrap()
    }

    fn message(id: &str, user: &str) -> MessageAppend {
        serde_json::from_value(json!({
            "messageID": id,
            "userID": user,
            "contents": [{"type": "TEXT", "value": id}],
        }))
        .unwrap()
    }

    fn ids(list: &[&str]) -> Vec<UserId> {
        list.iter().map(|s| UserId::from(*s)).collect()
    }

    async fn group_with(backend: &InMemoryBackend) -> ChatId {
        let req = create_req("g1", "u1", &["u2", "u3"]);
        backend.create(&req.participant_ids(), &req).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_duplicate_conflicts() {
        let backend = InMemoryBackend::new();
        let id = group_with(&backend).await;
        assert_eq!(id.as_str(), "g1");
        let group = backend.group(&id).unwrap();
        assert_eq!(group.members, ids(&["u1", "u2", "u3"]));
        assert_eq!(
            backend.conversation(&UserId::from("u3"), &id),
            Some(ConversationKind::Group)
        );

        let req = create_req("g1", "u9", &[]);
        let err = backend.create(&ids(&["u9"]), &req).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn create_without_id_mints_one() {
        let backend = InMemoryBackend::new();
        let mut req = create_req("x", "u1", &["u2"]);
        req.id_chat = None;
        let id = backend.create(&req.participant_ids(), &req).await.unwrap();
        assert!(backend.group(&id).is_some());
    }

    #[tokio::test]
    async fn delete_returns_owner_first() {
        let backend = InMemoryBackend::new();
        let id = group_with(&backend).await;
        let recipients = backend
            .delete(&DeleteGroup {
                id_chat: id.clone(),
                extra: Map::new(),
            })
            .await
            .unwrap();
        assert_eq!(recipients, ids(&["u1", "u2", "u3"]));
        assert!(backend.group(&id).is_none());

        let err = backend
            .delete(&DeleteGroup {
                id_chat: id,
                extra: Map::new(),
            })
            .await
            .unwrap_err();
        assert!(!err.is_conflict());
    }

    #[tokio::test]
    async fn membership_conflicts() {
        let backend = InMemoryBackend::new();
        let _ = group_with(&backend).await;

        assert!(backend.append_member(&change("g1", "u2")).await.unwrap_err().is_conflict());
        let after = backend.append_member(&change("g1", "u4")).await.unwrap();
        assert_eq!(after, ids(&["u1", "u2", "u3", "u4"]));

        let _ = backend.append_admin(&change("g1", "u2")).await.unwrap();
        assert!(backend.append_admin(&change("g1", "u2")).await.unwrap_err().is_conflict());
        assert!(backend.append_admin(&change("g1", "u1")).await.unwrap_err().is_conflict());
        let _ = backend.remove_admin(&change("g1", "u2")).await.unwrap();
        assert!(backend.remove_admin(&change("g1", "u2")).await.unwrap_err().is_conflict());

        let removed = backend.remove_member(&change("g1", "u4")).await.unwrap();
        assert!(removed.contains(&UserId::from("u4")));
        assert!(!backend.group(&ChatId::from("g1")).unwrap().is_member(&UserId::from("u4")));
        assert!(backend.remove_member(&change("g1", "u1")).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn change_owner_moves_owner_to_front() {
        let backend = InMemoryBackend::new();
        let _ = group_with(&backend).await;
        let recipients = backend.change_owner(&change("g1", "u3")).await.unwrap();
        assert_eq!(recipients, ids(&["u3", "u1", "u2"]));
        assert!(backend.change_owner(&change("g1", "u3")).await.unwrap_err().is_conflict());
        assert!(backend.change_owner(&change("g1", "u9")).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn settings_and_missing_group() {
        let backend = InMemoryBackend::new();
        let _ = group_with(&backend).await;
        let req = UpdateGroupSetting {
            id_chat: ChatId::from("g1"),
            value: true,
            extra: Map::new(),
        };
        let _ = backend
            .update_setting(GroupSetting::PinMessages, &req)
            .await
            .unwrap();
        let group = backend.group(&ChatId::from("g1")).unwrap();
        assert_eq!(group.settings.get(&GroupSetting::PinMessages), Some(&true));

        let err = backend.append_member(&change("nope", "u1")).await.unwrap_err();
        assert_eq!(err.reason(), "group nope not found");
    }

    #[tokio::test]
    async fn friend_request_flow() {
        let backend = InMemoryBackend::new();
        let req = friend_req("u1", "u2");
        backend.append_friend_request(&req).await.unwrap();
        assert!(backend.has_pending_request(&UserId::from("u1"), &UserId::from("u2")));
        assert!(backend.append_friend_request(&req).await.unwrap_err().is_conflict());
        assert!(
            backend
                .append_friend_request(&friend_req("u2", "u1"))
                .await
                .unwrap_err()
                .is_conflict()
        );

        backend.accept_friend_request(&req).await.unwrap();
        assert!(backend.are_friends(&UserId::from("u2"), &UserId::from("u1")));
        assert!(backend.accept_friend_request(&req).await.unwrap_err().is_conflict());

        let unfriend = Unfriend {
            sender_id: "u2".into(),
            receiver_id: "u1".into(),
            id_chat: None,
            extra: Map::new(),
        };
        backend.unfriend(&unfriend).await.unwrap();
        assert!(backend.unfriend(&unfriend).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn remove_missing_request_fails() {
        let backend = InMemoryBackend::new();
        let err = backend
            .remove_friend_request(&friend_req("u1", "u2"))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "friend request not found");
    }

    #[tokio::test]
    async fn conversations_once_per_pair() {
        let backend = InMemoryBackend::new();
        let req = friend_req("u1", "u2");
        backend
            .append_conversations(&req, ConversationKind::Stranger)
            .await
            .unwrap();
        assert_eq!(
            backend.conversation(&UserId::from("u2"), &ChatId::from("u1-u2")),
            Some(ConversationKind::Stranger)
        );
        assert!(
            backend
                .append_conversations(&req, ConversationKind::Stranger)
                .await
                .unwrap_err()
                .is_conflict()
        );
    }

    #[tokio::test]
    async fn chat_messages_and_recent() {
        let backend = InMemoryBackend::new();
        let chat = ChatId::from("c1");
        for i in 0..5 {
            backend
                .append_message(&chat, &message(&format!("m{i}"), "u1"))
                .await
                .unwrap();
        }
        assert!(
            backend
                .append_message(&chat, &message("m0", "u1"))
                .await
                .unwrap_err()
                .is_conflict()
        );
        let recent = backend.recent_messages(&chat, 2).await.unwrap();
        let got: Vec<&str> = recent.iter().map(|m| m.message_id.as_str()).collect();
        assert_eq!(got, ["m3", "m4"]);
        assert!(backend.recent_messages(&ChatId::from("none"), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn recall_and_hide() {
        let backend = InMemoryBackend::new();
        let chat = ChatId::from("c1");
        backend.append_message(&chat, &message("m1", "u1")).await.unwrap();

        let recall: RecallMessage =
            serde_json::from_value(json!({"messageID": "m1"})).unwrap();
        backend.recall_message(&chat, &recall).await.unwrap();
        assert!(backend.recall_message(&chat, &recall).await.unwrap_err().is_conflict());

        let hide: HideMessage =
            serde_json::from_value(json!({"messageID": "m9", "userID": "u2"})).unwrap();
        assert!(!backend.hide_message(&chat, &hide).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn poll_votes_and_lock() {
        let backend = InMemoryBackend::new();
        let chat = ChatId::from("c1");
        backend.append_message(&chat, &message("poll1", "u1")).await.unwrap();
        let vote = message("poll1", "u2");
        backend.append_vote(&chat, &vote).await.unwrap();
        assert!(backend.append_vote(&chat, &vote).await.unwrap_err().is_conflict());
        backend.change_vote(&chat, &vote).await.unwrap();
        assert!(backend.change_vote(&chat, &message("poll1", "u3")).await.is_err());

        let lock: LockPoll =
            serde_json::from_value(json!({"messageID": "poll1", "userID": "u1"})).unwrap();
        backend.lock_poll(&chat, &lock).await.unwrap();
        assert!(backend.lock_poll(&chat, &lock).await.unwrap_err().is_conflict());
        assert!(backend.change_vote(&chat, &vote).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn unknown_chat_fails_without_allocating() {
        let backend = InMemoryBackend::new();
        let chat = ChatId::from("ghost");
        let receipt: MessageReceipt =
            serde_json::from_value(json!({"messageID": "m1", "userID": "u1"})).unwrap();
        let lock: LockPoll =
            serde_json::from_value(json!({"messageID": "m1", "userID": "u1"})).unwrap();

        let err = backend.change_delivery(&chat, &receipt).await.unwrap_err();
        assert_eq!(err.reason(), "chat ghost not found");
        assert!(backend.change_read(&chat, &receipt).await.is_err());
        assert!(backend.append_vote(&chat, &message("m1", "u1")).await.is_err());
        assert!(backend.lock_poll(&chat, &lock).await.is_err());
        assert_eq!(backend.chat_count(), 0);

        backend.append_message(&chat, &message("m1", "u1")).await.unwrap();
        backend.change_delivery(&chat, &receipt).await.unwrap();
        assert_eq!(backend.chat_count(), 1);
    }

    #[tokio::test]
    async fn summary_records_last_message() {
        let backend = InMemoryBackend::new();
        let chat = ChatId::from("c1");
        backend
            .refresh_summary(&chat, &[message("m1", "u1"), message("m2", "u1")])
            .await
            .unwrap();
        assert_eq!(backend.summary(&chat), Some(Some(MessageId::from("m2"))));
        backend.refresh_summary(&chat, &[]).await.unwrap();
        assert_eq!(backend.summary(&chat), Some(None));
    }
}
