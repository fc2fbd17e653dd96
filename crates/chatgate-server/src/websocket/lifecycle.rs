//! Disconnect hook: deregistration plus the best-effort summary refresh.

use std::sync::Arc;

use chatgate_core::HandlerError;
use chatgate_core::ids::ChatId;
use metrics::counter;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::metrics::LIFECYCLE_SYNC_FAILURES_TOTAL;
use crate::services::{ChatService, ConversationSync};

/// Result of the post-disconnect summary refresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummarySync {
    /// Not a chat channel.
    Skipped,
    /// Summary refreshed.
    Synced,
    /// Refresh failed; logged and swallowed.
    Failed,
}

/// Runs once per terminated connection.
pub struct LifecycleHook {
    registry: Arc<ConnectionRegistry>,
    chat: Arc<dyn ChatService>,
    sync: Arc<dyn ConversationSync>,
    summary_count: usize,
}

impl LifecycleHook {
    /// Create a hook refreshing from the last `summary_count` messages.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        chat: Arc<dyn ChatService>,
        sync: Arc<dyn ConversationSync>,
        summary_count: usize,
    ) -> Self {
        Self {
            registry,
            chat,
            sync,
            summary_count,
        }
    }

    /// Deregister `connection` and, for chat channels, refresh the summary.
    pub async fn on_disconnect(&self, connection: &ClientConnection) -> SummarySync {
        let removed = self
            .registry
            .deregister(&connection.channel, &connection.id)
            .is_some();
        debug!(conn_id = %connection.id, channel = %connection.channel, removed, "deregistered");

        let Some(chat) = connection.channel.chat_id() else {
            return SummarySync::Skipped;
        };
        match self.refresh(chat).await {
            Ok(()) => SummarySync::Synced,
            Err(e) => {
                counter!(LIFECYCLE_SYNC_FAILURES_TOTAL).increment(1);
                warn!(chat = %chat, reason = e.reason(), "summary refresh failed");
                SummarySync::Failed
            }
        }
    }

    async fn refresh(&self, chat: &ChatId) -> Result<(), HandlerError> {
        let messages = self.chat.recent_messages(chat, self.summary_count).await?;
        self.sync.refresh_summary(chat, &messages).await
    }
}
