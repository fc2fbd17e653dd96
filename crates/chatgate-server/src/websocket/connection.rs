//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chatgate_core::ChannelKey;
use chatgate_core::ids::ConnectionId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// One connected WebSocket client, filed under exactly one channel key.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Channel the connection was opened on.
    pub channel: ChannelKey,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat check.
    pub is_alive: AtomicBool,
    /// When the last frame of any kind was received.
    last_pong: Mutex<Instant>,
    /// Count of messages dropped due to a full or closed queue.
    pub dropped_messages: AtomicU64,
    /// Cancelled once the connection is being torn down.
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection.
    pub fn new(id: ConnectionId, channel: ChannelKey, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            channel,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped_messages: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Enqueue a text frame for the client.
    ///
    /// Returns `false` if the connection is closed or its queue is full, and
    /// increments the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if !self.closed.is_cancelled() && self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Total messages dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last inbound frame (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Start tearing the connection down. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = ClientConnection::new(
            ConnectionId::from("conn_1"),
            ChannelKey::Group,
            tx,
        );
        (conn, rx)
    }

    #[test]
    fn create_connection() {
        let (conn, _rx) = make_connection(4);
        assert_eq!(conn.id.as_str(), "conn_1");
        assert_eq!(conn.channel, ChannelKey::Group);
        assert!(conn.is_alive.load(Ordering::Relaxed));
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection(4);
        assert!(conn.send(Arc::new("hello".into())));
        let msg = rx.recv().await.unwrap();
        assert_eq!(&*msg, "hello");
        assert_eq!(conn.drop_count(), 0);
    }

    #[test]
    fn send_to_full_channel_counts_drop() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.send(Arc::new("msg1".into())));
        assert!(!conn.send(Arc::new("msg2".into())));
        assert!(!conn.send(Arc::new("msg3".into())));
        assert_eq!(conn.drop_count(), 2);
    }

    #[test]
    fn send_to_dropped_receiver_counts_drop() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert!(!conn.send(Arc::new("hello".into())));
        assert_eq!(conn.drop_count(), 1);
    }

    #[test]
    fn send_after_close_is_refused() {
        let (conn, _rx) = make_connection(4);
        conn.close();
        conn.close();
        assert!(conn.is_closed());
        assert!(!conn.send(Arc::new("late".into())));
    }

    #[tokio::test]
    async fn closed_resolves_after_close() {
        let (conn, _rx) = make_connection(4);
        conn.close();
        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .unwrap();
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection(4);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn last_pong_resets_on_activity() {
        let (conn, _rx) = make_connection(4);
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.last_pong_elapsed() >= Duration::from_millis(10));
        conn.mark_alive();
        assert!(conn.last_pong_elapsed() < Duration::from_millis(10));
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection(4);
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }
}
