//! Dispatch table: operation code to handler plus addressing descriptor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chatgate_core::ChannelKey;
use chatgate_core::wire::{ChatOp, Envelope, GroupOp, OpCode, UserOp};

use super::chat::{
    HideMessageHandler, LockPollHandler, MessageAction, MessageHandler, ReceiptAction,
    ReceiptHandler, RecallMessageHandler, TypingHandler,
};
use super::group::{
    ChangeAvatarHandler, CreateGroupHandler, DeleteGroupHandler, MemberAction,
    MemberChangeHandler, RenameGroupHandler, UpdateSettingHandler,
};
use super::outcome::{Addressing, OperationError, Outcome};
use super::user::{FriendAction, FriendRequestHandler, UnfriendHandler};
use crate::services::{GroupSetting, Services};

/// One entry of the dispatch table.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    /// How recipients of a successful result are chosen.
    fn addressing(&self) -> Addressing;

    /// Whether the sender receives a notification.
    fn acknowledges(&self) -> bool {
        true
    }

    /// Decode the full payload, call the domain layer and build the broadcast.
    async fn handle(&self, channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError>;
}

/// Map from operation code to its handler.
#[derive(Default)]
pub struct OperationTable {
    handlers: HashMap<OpCode, Arc<dyn OperationHandler>>,
}

impl OperationTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `op`, replacing any previous entry.
    pub fn register(&mut self, op: OpCode, handler: impl OperationHandler + 'static) {
        let _ = self.handlers.insert(op, Arc::new(handler));
    }

    /// Handler for `op`.
    pub fn get(&self, op: OpCode) -> Option<&Arc<dyn OperationHandler>> {
        self.handlers.get(&op)
    }

    /// Registered operations, sorted by wire code.
    pub fn ops(&self) -> Vec<OpCode> {
        let mut ops: Vec<OpCode> = self.handlers.keys().copied().collect();
        ops.sort_by_key(|op| op.code());
        ops
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no operation is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// The full table for every known operation.
    pub fn from_services(services: &Services) -> Self {
        let mut table = Self::new();
        let groups = &services.group;
        let users = &services.user;
        let chats = &services.chat;

        table.register(OpCode::Group(GroupOp::Create), CreateGroupHandler::new(groups.clone()));
        table.register(OpCode::Group(GroupOp::Delete), DeleteGroupHandler::new(groups.clone()));
        for (op, action) in [
            (GroupOp::AppendMember, MemberAction::AppendMember),
            (GroupOp::AppendAdmin, MemberAction::AppendAdmin),
            (GroupOp::RemoveAdmin, MemberAction::RemoveAdmin),
            (GroupOp::RemoveMember, MemberAction::RemoveMember),
            (GroupOp::ChangeOwner, MemberAction::ChangeOwner),
        ] {
            table.register(OpCode::Group(op), MemberChangeHandler::new(action, groups.clone()));
        }
        table.register(OpCode::Group(GroupOp::Rename), RenameGroupHandler::new(groups.clone()));
        table.register(OpCode::Group(GroupOp::ChangeAvatar), ChangeAvatarHandler::new(groups.clone()));
        for (op, setting) in [
            (GroupOp::SettingNameAvatar, GroupSetting::ChangeNameAndAvatar),
            (GroupOp::SettingPinMessages, GroupSetting::PinMessages),
            (GroupOp::SettingSendMessages, GroupSetting::SendMessages),
            (GroupOp::SettingMembershipApproval, GroupSetting::MembershipApproval),
            (GroupOp::SettingCreatePolls, GroupSetting::CreatePolls),
        ] {
            table.register(OpCode::Group(op), UpdateSettingHandler::new(setting, groups.clone()));
        }

        for (op, action) in [
            (UserOp::AddFriendRequest, FriendAction::Request),
            (UserOp::RemoveFriendRequest, FriendAction::Withdraw),
            (UserOp::AcceptFriendRequest, FriendAction::Accept),
            (UserOp::CreateConversation, FriendAction::CreateConversation),
        ] {
            table.register(OpCode::User(op), FriendRequestHandler::new(action, users.clone()));
        }
        table.register(OpCode::User(UserOp::Unfriend), UnfriendHandler::new(users.clone()));

        for (op, action) in [
            (ChatOp::AppendMessage, MessageAction::Append),
            (ChatOp::AppendVote, MessageAction::Vote),
            (ChatOp::ChangeVote, MessageAction::ChangeVote),
        ] {
            table.register(OpCode::Chat(op), MessageHandler::new(action, chats.clone()));
        }
        table.register(
            OpCode::Chat(ChatOp::Delivery),
            ReceiptHandler::new(ReceiptAction::Delivered, chats.clone()),
        );
        table.register(
            OpCode::Chat(ChatOp::Read),
            ReceiptHandler::new(ReceiptAction::Read, chats.clone()),
        );
        table.register(OpCode::Chat(ChatOp::Hide), HideMessageHandler::new(chats.clone()));
        table.register(OpCode::Chat(ChatOp::Recall), RecallMessageHandler::new(chats.clone()));
        table.register(OpCode::Chat(ChatOp::Typing), TypingHandler);
        table.register(OpCode::Chat(ChatOp::LockPoll), LockPollHandler::new(chats.clone()));

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::Family;
    use chatgate_core::ids::{ChatId, UserId};
    use serde_json::json;

    fn full_table() -> OperationTable {
        let (services, _) = Services::in_memory();
        OperationTable::from_services(&services)
    }

    #[test]
    fn every_known_code_has_a_handler() {
        let table = full_table();
        let expected = GroupOp::ALL.len() + UserOp::ALL.len() + ChatOp::ALL.len();
        assert_eq!(expected, 28);
        assert_eq!(table.len(), expected);
        for op in GroupOp::ALL {
            assert!(table.get(OpCode::Group(*op)).is_some(), "{}", op.code());
        }
        for op in UserOp::ALL {
            assert!(table.get(OpCode::User(*op)).is_some(), "{}", op.code());
        }
        for op in ChatOp::ALL {
            assert!(table.get(OpCode::Chat(*op)).is_some(), "{}", op.code());
        }
    }

    #[test]
    fn addressing_follows_family() {
        let table = full_table();
        for op in table.ops() {
            let handler = table.get(op).unwrap();
            let expected = match op.family() {
                Family::Group => Addressing::ExplicitIds,
                Family::User | Family::Chat => Addressing::SameChannel,
            };
            assert_eq!(handler.addressing(), expected, "{}", op.code());
        }
    }

    #[test]
    fn only_typing_skips_acknowledgment() {
        let table = full_table();
        let silent: Vec<&str> = table
            .ops()
            .into_iter()
            .filter(|op| !table.get(*op).unwrap().acknowledges())
            .map(OpCode::code)
            .collect();
        assert_eq!(silent, ["TCM06"]);
    }

    #[test]
    fn ops_sorted_by_code() {
        let table = full_table();
        let codes: Vec<&str> = table.ops().into_iter().map(OpCode::code).collect();
        let mut sorted = codes.clone();
        sorted.sort_unstable();
        assert_eq!(codes, sorted);
        assert_eq!(codes.first(), Some(&"TCM01"));
    }

    #[tokio::test]
    async fn handler_results_fit_declared_addressing() {
        let table = full_table();
        let cases = [
            (
                ChannelKey::Group,
                json!({"TGM": "TGM01", "idChat": "g1", "owner": {"userID": "u1"}, "members": [{"userID": "u2"}]}),
            ),
            (ChannelKey::Group, json!({"TGM": "TGM08", "idChat": "g1", "chatName": "renamed"})),
            (ChannelKey::Group, json!({"TGM": "TGM12", "idChat": "g1", "value": false})),
            (
                ChannelKey::user(&UserId::from("u1")),
                json!({"TUM": "TUM01", "senderID": "u1", "receiverID": "u2"}),
            ),
            (
                ChannelKey::Chat(ChatId::from("c1")),
                json!({"TCM": "TCM01", "messageID": "m1", "userID": "u1"}),
            ),
            (
                ChannelKey::Chat(ChatId::from("c1")),
                json!({"TCM": "TCM03", "messageID": "m1", "userID": "u2"}),
            ),
            (ChannelKey::Chat(ChatId::from("c1")), json!({"TCM": "TCM06", "senderID": "u1"})),
        ];

        for (channel, frame) in cases {
            let envelope = Envelope::decode_discriminant(channel.family(), frame.to_string()).unwrap();
            let op = envelope.op().unwrap();
            let handler = table.get(op).unwrap();
            let outcome = handler.handle(&channel, &envelope).await.unwrap();
            assert!(
                handler.addressing().admits(&outcome.recipients),
                "{} returned {:?}",
                op.code(),
                outcome.recipients
            );
        }
    }

    #[test]
    fn empty_table() {
        let table = OperationTable::new();
        assert!(table.is_empty());
        assert!(table.get(OpCode::Chat(ChatOp::Typing)).is_none());
    }
}
