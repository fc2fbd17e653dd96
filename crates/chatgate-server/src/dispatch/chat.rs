//! Chat-thread handlers (`TCM..`). All broadcast to the rest of the thread.

use std::sync::Arc;

use async_trait::async_trait;
use chatgate_core::ids::ChatId;
use chatgate_core::wire::Envelope;
use chatgate_core::wire::payloads::{
    HideMessage, LockPoll, MessageAppend, MessageReceipt, RecallMessage, TypingIndicator,
};
use chatgate_core::{ChannelKey, HandlerError};

use super::outcome::{Addressing, OperationError, Outcome};
use super::table::OperationHandler;
use crate::services::ChatService;
use crate::websocket::broadcast::Recipients;

fn chat_of(channel: &ChannelKey) -> Result<&ChatId, OperationError> {
    channel
        .chat_id()
        .ok_or_else(|| HandlerError::new(format!("{channel} is not a chat channel")).into())
}

/// Which call a [`MessageHandler`] makes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageAction {
    /// `TCM01`
    Append,
    /// `TCM07`
    Vote,
    /// `TCM08`
    ChangeVote,
}

/// Operations carrying a full message body.
pub struct MessageHandler {
    action: MessageAction,
    chats: Arc<dyn ChatService>,
}

impl MessageHandler {
    /// Handler for `action` backed by `chats`.
    pub fn new(action: MessageAction, chats: Arc<dyn ChatService>) -> Self {
        Self { action, chats }
    }
}

#[async_trait]
impl OperationHandler for MessageHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    async fn handle(&self, channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let chat = chat_of(channel)?;
        let message: MessageAppend = envelope.decode()?;
        match self.action {
            MessageAction::Append => self.chats.append_message(chat, &message).await,
            MessageAction::Vote => self.chats.append_vote(chat, &message).await,
            MessageAction::ChangeVote => self.chats.change_vote(chat, &message).await,
        }?;
        Outcome::broadcast(Recipients::SameChannel, &message)
    }
}

/// Which receipt a [`ReceiptHandler`] records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiptAction {
    /// `TCM02`
    Delivered,
    /// `TCM03`
    Read,
}

/// Delivery and read receipts.
pub struct ReceiptHandler {
    action: ReceiptAction,
    chats: Arc<dyn ChatService>,
}

impl ReceiptHandler {
    /// Handler for `action` backed by `chats`.
    pub fn new(action: ReceiptAction, chats: Arc<dyn ChatService>) -> Self {
        Self { action, chats }
    }
}

#[async_trait]
impl OperationHandler for ReceiptHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    async fn handle(&self, channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let chat = chat_of(channel)?;
        let receipt: MessageReceipt = envelope.decode()?;
        match self.action {
            ReceiptAction::Delivered => self.chats.change_delivery(chat, &receipt).await,
            ReceiptAction::Read => self.chats.change_read(chat, &receipt).await,
        }?;
        Outcome::broadcast(Recipients::SameChannel, &receipt)
    }
}

/// `TCM04`.
pub struct HideMessageHandler {
    chats: Arc<dyn ChatService>,
}

impl HideMessageHandler {
    /// Handler backed by `chats`.
    pub fn new(chats: Arc<dyn ChatService>) -> Self {
        Self { chats }
    }
}

#[async_trait]
impl OperationHandler for HideMessageHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    async fn handle(&self, channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let chat = chat_of(channel)?;
        let request: HideMessage = envelope.decode()?;
        self.chats.hide_message(chat, &request).await?;
        Outcome::broadcast(Recipients::SameChannel, &request)
    }
}

/// `TCM05`.
pub struct RecallMessageHandler {
    chats: Arc<dyn ChatService>,
}

impl RecallMessageHandler {
    /// Handler backed by `chats`.
    pub fn new(chats: Arc<dyn ChatService>) -> Self {
        Self { chats }
    }
}

#[async_trait]
impl OperationHandler for RecallMessageHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    async fn handle(&self, channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let chat = chat_of(channel)?;
        let request: RecallMessage = envelope.decode()?;
        self.chats.recall_message(chat, &request).await?;
        Outcome::broadcast(Recipients::SameChannel, &request)
    }
}

/// `TCM06`: no domain call, no acknowledgment.
pub struct TypingHandler;

#[async_trait]
impl OperationHandler for TypingHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    fn acknowledges(&self) -> bool {
        false
    }

    async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let indicator: TypingIndicator = envelope.decode()?;
        Outcome::broadcast(Recipients::SameChannel, &indicator)
    }
}

/// `TCM09`.
pub struct LockPollHandler {
    chats: Arc<dyn ChatService>,
}

impl LockPollHandler {
    /// Handler backed by `chats`.
    pub fn new(chats: Arc<dyn ChatService>) -> Self {
        Self { chats }
    }
}

#[async_trait]
impl OperationHandler for LockPollHandler {
    fn addressing(&self) -> Addressing {
        Addressing::SameChannel
    }

    async fn handle(&self, channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
        let chat = chat_of(channel)?;
        let request: LockPoll = envelope.decode()?;
        self.chats.lock_poll(chat, &request).await?;
        Outcome::broadcast(Recipients::SameChannel, &request)
    }
}
