//! Per-frame dispatch: decode, route, acknowledge, broadcast.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chatgate_core::ChannelKey;
use chatgate_core::ids::ConnectionId;
use chatgate_core::wire::{Envelope, Notification, NotifyStatus};
use metrics::{counter, histogram};
use tracing::{Span, debug, error, instrument, warn};

use super::outcome::OperationError;
use super::table::OperationTable;
use crate::metrics::{
    GATEWAY_DECODE_ERRORS_TOTAL, GATEWAY_OPERATION_DURATION_SECONDS,
    GATEWAY_OPERATION_ERRORS_TOTAL, GATEWAY_OPERATIONS_TOTAL,
};
use crate::websocket::broadcast::Broadcaster;

/// Operations slower than this are logged.
const SLOW_OPERATION: Duration = Duration::from_secs(5);

/// What happened to one inbound frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Status sent to the sender, if any.
    pub status: Option<NotifyStatus>,
    /// Connections the broadcast was queued on.
    pub delivered: usize,
}

impl FrameOutcome {
    const DROPPED: Self = Self {
        status: None,
        delivered: 0,
    };
}

/// Routes frames through the [`OperationTable`] and sends the results.
pub struct Dispatcher {
    table: OperationTable,
    broadcaster: Arc<Broadcaster>,
    handler_timeout: Duration,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(table: OperationTable, broadcaster: Arc<Broadcaster>, handler_timeout: Duration) -> Self {
        Self {
            table,
            broadcaster,
            handler_timeout,
        }
    }

    /// The dispatch table.
    pub fn table(&self) -> &OperationTable {
        &self.table
    }

    /// Handle one text frame received from `origin` on `channel`.
    ///
    /// Never fails: every error ends as a log line, a metric and at most one
    /// notification to the sender.
    #[instrument(skip_all, fields(channel = %channel, conn_id = %origin, op = tracing::field::Empty))]
    pub async fn handle_frame(&self, channel: &ChannelKey, origin: &ConnectionId, text: &str) -> FrameOutcome {
        let family = channel.family();
        let envelope = match Envelope::decode_discriminant(family, text) {
            Ok(envelope) => envelope,
            Err(e) => {
                counter!(GATEWAY_DECODE_ERRORS_TOTAL, "family" => family.as_str()).increment(1);
                warn!(error = %e, "dropping undecodable frame");
                return FrameOutcome::DROPPED;
            }
        };

        let Some(op) = envelope.op() else {
            debug!(code = envelope.code(), "ignoring unknown operation");
            return FrameOutcome::DROPPED;
        };
        let _ = Span::current().record("op", op.code());

        let Some(handler) = self.table.get(op) else {
            debug!("no handler registered");
            return FrameOutcome::DROPPED;
        };

        counter!(GATEWAY_OPERATIONS_TOTAL, "family" => family.as_str(), "op" => op.code()).increment(1);
        let start = Instant::now();
        let result = match tokio::time::timeout(self.handler_timeout, handler.handle(channel, &envelope)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(OperationError::Timeout(self.handler_timeout)),
        };
        let duration = start.elapsed();
        histogram!(GATEWAY_OPERATION_DURATION_SECONDS, "family" => family.as_str(), "op" => op.code())
            .record(duration.as_secs_f64());
        if duration >= SLOW_OPERATION {
            warn!(duration_secs = duration.as_secs_f64(), "slow operation");
        }

        let acknowledges = handler.acknowledges();
        match result {
            Ok(outcome) => {
                let status = acknowledges.then(|| {
                    self.notify(channel, origin, &envelope, NotifyStatus::Success);
                    NotifyStatus::Success
                });
                let addressing = handler.addressing();
                if !addressing.admits(&outcome.recipients) {
                    error!(
                        ?addressing,
                        recipients = ?outcome.recipients,
                        "handler recipients disagree with its addressing, not broadcasting"
                    );
                    return FrameOutcome { status, delivered: 0 };
                }
                let delivered =
                    self.broadcaster
                        .broadcast(channel, origin, &outcome.recipients, Arc::new(outcome.payload));
                FrameOutcome { status, delivered }
            }
            Err(err) => {
                let status = err.status();
                counter!(
                    GATEWAY_OPERATION_ERRORS_TOTAL,
                    "family" => family.as_str(),
                    "op" => op.code(),
                    "status" => status.as_str()
                )
                .increment(1);
                match &err {
                    OperationError::Handler(e) => debug!(reason = e.reason(), "operation rejected"),
                    OperationError::Timeout(_) => error!(error = %err, "operation timed out"),
                    OperationError::Decode(_) | OperationError::Encode(_) => warn!(error = %err, "operation failed"),
                }

                let silent_decode =
                    matches!(err, OperationError::Decode(_)) && envelope.correlation_id().is_none();
                if !acknowledges || silent_decode {
                    return FrameOutcome::DROPPED;
                }
                self.notify(channel, origin, &envelope, status);
                FrameOutcome {
                    status: Some(status),
                    delivered: 0,
                }
            }
        }
    }

    fn notify(&self, channel: &ChannelKey, origin: &ConnectionId, envelope: &Envelope, status: NotifyStatus) {
        let notification = Notification::new(envelope.correlation_id().cloned(), envelope.family(), status);
        let _ = self.broadcaster.notify_sender(channel, origin, &notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::outcome::{Addressing, Outcome};
    use crate::dispatch::table::OperationHandler;
    use crate::services::{
        MockChatService, MockConversationSync, MockGroupService, MockUserService, Services,
    };
    use crate::websocket::broadcast::Recipients;
    use crate::websocket::connection::ClientConnection;
    use crate::websocket::registry::ConnectionRegistry;
    use async_trait::async_trait;
    use chatgate_core::HandlerError;
    use chatgate_core::ids::{ChatId, UserId};
    use chatgate_core::wire::{ChatOp, OpCode};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    struct Harness {
        registry: Arc<ConnectionRegistry>,
        dispatcher: Dispatcher,
    }

    impl Harness {
        fn with_table(table: OperationTable, timeout: Duration) -> Self {
            let registry = Arc::new(ConnectionRegistry::new());
            let broadcaster = Arc::new(Broadcaster::new(Arc::clone(&registry), 100));
            Self {
                dispatcher: Dispatcher::new(table, broadcaster, timeout),
                registry,
            }
        }

        fn with_services(group: MockGroupService, user: MockUserService, chat: MockChatService) -> Self {
            let services = Services::new(
                Arc::new(group),
                Arc::new(user),
                Arc::new(chat),
                Arc::new(MockConversationSync::new()),
            );
            Self::with_table(OperationTable::from_services(&services), Duration::from_secs(5))
        }

        fn open(&self, id: &str, channel: &ChannelKey) -> mpsc::Receiver<Arc<String>> {
            let (tx, rx) = mpsc::channel(16);
            let conn = ClientConnection::new(ConnectionId::from(id), channel.clone(), tx);
            let _ = self.registry.register(Arc::new(conn));
            rx
        }

        async fn send(&self, id: &str, channel: &ChannelKey, frame: &Value) -> FrameOutcome {
            self.dispatcher
                .handle_frame(channel, &ConnectionId::from(id), &frame.to_string())
                .await
        }
    }

    fn next_json(rx: &mut mpsc::Receiver<Arc<String>>) -> Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    fn user(id: &str) -> ChannelKey {
        ChannelKey::user(&UserId::from(id))
    }

    fn thread() -> ChannelKey {
        ChannelKey::Chat(ChatId::from("c1"))
    }

    #[tokio::test]
    async fn create_group_acks_sender_and_reaches_members_only() {
        let mut group = MockGroupService::new();
        let _ = group
            .expect_create()
            .times(1)
            .returning(|_, _| Ok(ChatId::from("g1")));
        let h = Harness::with_services(group, MockUserService::new(), MockChatService::new());

        let mut origin = h.open("creator", &ChannelKey::Group);
        let mut u1 = h.open("u1-conn", &user("u1"));
        let mut u2 = h.open("u2-conn", &user("u2"));
        let mut u3 = h.open("u3-conn", &user("u3"));

        let out = h
            .send(
                "creator",
                &ChannelKey::Group,
                &json!({
                    "id": "req-1", "TGM": "TGM01", "chatName": "team",
                    "owner": {"userID": "u1"},
                    "members": [{"userID": "u2"}, {"userID": "u3"}],
                }),
            )
            .await;

        assert_eq!(out.status, Some(NotifyStatus::Success));
        assert_eq!(out.delivered, 2);
        let ack = next_json(&mut origin);
        assert_eq!(ack, json!({"id": "req-1", "TGM": "TGM00", "typeNotify": "SUCCESS"}));
        assert!(origin.try_recv().is_err());
        assert!(u1.try_recv().is_err());
        assert_eq!(next_json(&mut u2)["idChat"], "g1");
        assert_eq!(next_json(&mut u3)["chatName"], "team");
    }

    #[tokio::test]
    async fn conflict_notifies_and_skips_broadcast() {
        let mut group = MockGroupService::new();
        let _ = group
            .expect_append_member()
            .returning(|_| Err(HandlerError::conflict()));
        let h = Harness::with_services(group, MockUserService::new(), MockChatService::new());
        let mut origin = h.open("o", &ChannelKey::Group);
        let mut member = h.open("m", &user("u2"));

        let out = h
            .send(
                "o",
                &ChannelKey::Group,
                &json!({"id": "r", "TGM": "TGM03", "idChat": "g1", "userAct": {"userID": "u2"}}),
            )
            .await;

        assert_eq!(out, FrameOutcome { status: Some(NotifyStatus::Conflict), delivered: 0 });
        assert_eq!(next_json(&mut origin)["typeNotify"], "CONFLICT");
        assert!(member.try_recv().is_err());
    }

    #[tokio::test]
    async fn other_failure_is_failed() {
        let mut chat = MockChatService::new();
        let _ = chat
            .expect_recall_message()
            .returning(|_, _| Err(HandlerError::new("message m1 not found")));
        let h = Harness::with_services(MockGroupService::new(), MockUserService::new(), chat);
        let mut origin = h.open("x", &thread());
        let mut peer = h.open("y", &thread());

        let out = h
            .send("x", &thread(), &json!({"id": "r2", "TCM": "TCM05", "messageID": "m1"}))
            .await;

        assert_eq!(out.status, Some(NotifyStatus::Failed));
        assert_eq!(next_json(&mut origin)["TCM"], "TCM00");
        assert!(peer.try_recv().is_err());
    }

    #[tokio::test]
    async fn typing_broadcasts_to_peers_without_ack() {
        let h = Harness::with_services(
            MockGroupService::new(),
            MockUserService::new(),
            MockChatService::new(),
        );
        let mut x = h.open("x", &thread());
        let mut y = h.open("y", &thread());
        let mut z = h.open("z", &thread());

        let out = h
            .send("x", &thread(), &json!({"TCM": "TCM06", "senderID": "u1"}))
            .await;

        assert_eq!(out, FrameOutcome { status: None, delivered: 2 });
        assert!(x.try_recv().is_err());
        assert_eq!(next_json(&mut y)["senderID"], "u1");
        assert_eq!(next_json(&mut z)["TCM"], "TCM06");
    }

    #[tokio::test]
    async fn user_operation_reaches_other_connections_of_same_user() {
        let mut users = MockUserService::new();
        let _ = users
            .expect_append_friend_request()
            .times(1)
            .returning(|_| Ok(()));
        let h = Harness::with_services(MockGroupService::new(), users, MockChatService::new());
        let mut phone = h.open("phone", &user("u1"));
        let mut laptop = h.open("laptop", &user("u1"));
        let mut other = h.open("other", &user("u2"));

        let out = h
            .send(
                "phone",
                &user("u1"),
                &json!({"id": "f1", "TUM": "TUM01", "senderID": "u1", "receiverID": "u2"}),
            )
            .await;

        assert_eq!(out.delivered, 1);
        assert_eq!(next_json(&mut phone)["TUM"], "TUM00");
        assert_eq!(next_json(&mut laptop)["receiverID"], "u2");
        assert!(other.try_recv().is_err());
    }

    #[tokio::test]
    async fn undecodable_and_unknown_frames_are_dropped() {
        let h = Harness::with_services(
            MockGroupService::new(),
            MockUserService::new(),
            MockChatService::new(),
        );
        let mut origin = h.open("x", &thread());
        let id = ConnectionId::from("x");

        let out = h.dispatcher.handle_frame(&thread(), &id, "not json").await;
        assert_eq!(out, FrameOutcome::DROPPED);
        let out = h.send("x", &thread(), &json!({"id": "a", "TGM": "TGM01"})).await;
        assert_eq!(out, FrameOutcome::DROPPED);
        let out = h.send("x", &thread(), &json!({"id": "b", "TCM": "TCM99"})).await;
        assert_eq!(out, FrameOutcome::DROPPED);
        assert!(origin.try_recv().is_err());
    }

    #[tokio::test]
    async fn shape_error_fails_only_with_correlation_id() {
        let h = Harness::with_services(
            MockGroupService::new(),
            MockUserService::new(),
            MockChatService::new(),
        );
        let mut origin = h.open("x", &thread());

        let out = h.send("x", &thread(), &json!({"TCM": "TCM01", "userID": "u1"})).await;
        assert_eq!(out, FrameOutcome::DROPPED);
        assert!(origin.try_recv().is_err());

        let out = h
            .send("x", &thread(), &json!({"id": "r", "TCM": "TCM01", "userID": "u1"}))
            .await;
        assert_eq!(out.status, Some(NotifyStatus::Failed));
        assert_eq!(next_json(&mut origin)["id"], "r");
    }

    struct SlowHandler;

    #[async_trait]
    impl OperationHandler for SlowHandler {
        fn addressing(&self) -> Addressing {
            Addressing::SameChannel
        }

        async fn handle(&self, _channel: &ChannelKey, _envelope: &Envelope) -> Result<Outcome, OperationError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Outcome::silent())
        }
    }

    /// Declares acknowledgment-only but asks for a same-channel fan-out.
    struct MisaddressedHandler;

    #[async_trait]
    impl OperationHandler for MisaddressedHandler {
        fn addressing(&self) -> Addressing {
            Addressing::None
        }

        async fn handle(&self, _channel: &ChannelKey, envelope: &Envelope) -> Result<Outcome, OperationError> {
            Outcome::broadcast(Recipients::SameChannel, &envelope.raw())
        }
    }

    #[tokio::test]
    async fn recipients_outside_addressing_are_not_broadcast() {
        let mut table = OperationTable::new();
        table.register(OpCode::Chat(ChatOp::Hide), MisaddressedHandler);
        let h = Harness::with_table(table, Duration::from_secs(5));
        let mut origin = h.open("x", &thread());
        let mut peer = h.open("y", &thread());

        let out = h
            .send("x", &thread(), &json!({"id": "h", "TCM": "TCM04", "messageID": "m", "userID": "u"}))
            .await;

        assert_eq!(out, FrameOutcome { status: Some(NotifyStatus::Success), delivered: 0 });
        assert_eq!(next_json(&mut origin)["typeNotify"], "SUCCESS");
        assert!(peer.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reports_failed() {
        let mut table = OperationTable::new();
        table.register(OpCode::Chat(ChatOp::LockPoll), SlowHandler);
        let h = Harness::with_table(table, Duration::from_secs(1));
        let mut origin = h.open("x", &thread());

        let out = h
            .send("x", &thread(), &json!({"id": "t", "TCM": "TCM09", "messageID": "p", "userID": "u"}))
            .await;

        assert_eq!(out.status, Some(NotifyStatus::Failed));
        assert_eq!(next_json(&mut origin)["typeNotify"], "FAILED");
    }

    #[tokio::test]
    async fn sender_gone_before_ack_is_harmless() {
        let mut chat = MockChatService::new();
        let _ = chat.expect_append_message().returning(|_, _| Ok(()));
        let h = Harness::with_services(MockGroupService::new(), MockUserService::new(), chat);
        let mut peer = h.open("y", &thread());

        let out = h
            .send(
                "ghost",
                &thread(),
                &json!({"id": "r", "TCM": "TCM01", "messageID": "m1", "userID": "u1"}),
            )
            .await;

        assert_eq!(out.status, Some(NotifyStatus::Success));
        assert_eq!(out.delivered, 1);
        assert_eq!(next_json(&mut peer)["messageID"], "m1");
    }
}
