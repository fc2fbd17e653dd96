//! Friend and one-to-one conversation handlers (`TUM..`).
//!
//! Every user operation broadcasts to the other connections on the acting
//! user's own channel; exclusion is by connection, not by user.

use std::sync::Arc;

use async_trait::async_trait;
use chatgate_core::ChannelKey;
use chatgate_core::wire::Envelope;
use chatgate_core::wire::payloads::{FriendRequest, Unfriend};

use super::outcome::{Addressing, OperationError, Outcome};
use super::table::OperationHandler;
use crate::services::{ConversationKind, UserService};
use crate::websocket::broadcast::Recipients;

/// Which call a [`FriendRequestHandler`] makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FriendAction {
    /// `TUM01`
    Request,
    /// `TUM02`
    Withdraw,
    /// `TUM03`
    Accept,
    /// `TUM05`
    CreateConversation,
}

/// Operations carrying a full friend-request card.
pub struct FriendRequestHandler {
    action: FriendAction,
    users: Arc<dyn UserService>,
}

impl FriendRequestHandler {
    /// Handler for `action` backed by `users`.
    pub fn new(action: FriendAction, users: Arc<dyn UserService>) -> Self {
        Self { action, users }
    }
}

#[async_trait]
impl OperationHandler for FriendRequestHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let request: FriendRequest = envelope.decode()?;
        match self.action {
            FriendAction::Request => self.users.append_friend_request(&request).await,
            FriendAction::Withdraw => self.users.remove_friend_request(&request).await,
            FriendAction::Accept => self.users.accept_friend_request(&request).await,
            FriendAction::CreateConversation => {
                self.users
                    .append_conversations(&request, ConversationKind::Stranger)
                    .await
            }
        }?;
        Outcome::broadcast(Recipients::SameChannel, &request)
    }
}

/// `TUM04`.
pub struct UnfriendHandler {
    users: Arc<dyn UserService>,
}

impl UnfriendHandler {
    /// Handler backed by `users`.
    pub fn new(users: Arc<dyn UserService>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl OperationHandler for UnfriendHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let request: Unfriend = envelope.decode()?;
        self.users.unfriend(&request).await?;
        Outcome::broadcast(Recipients::SameChannel, &request)
    }
}
