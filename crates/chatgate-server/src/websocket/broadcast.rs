//! Acknowledgments and fan-out to registered connections.

use std::sync::Arc;

use chatgate_core::ChannelKey;
use chatgate_core::ids::{ConnectionId, UserId};
use chatgate_core::wire::{Notification, encode};
use metrics::counter;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::metrics::{WS_BROADCAST_DROPS_TOTAL, WS_SLOW_CLIENT_DISCONNECTS_TOTAL};

/// Who receives a broadcast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Recipients {
    /// Nobody.
    None,
    /// Every connection on `user/{id}` for each id, skipping `exclude`.
    Users {
        /// Target user ids.
        ids: Vec<UserId>,
        /// User left out of the fan-out.
        exclude: Option<UserId>,
    },
    /// Every other connection on the origin's channel.
    SameChannel,
}

/// Sends notifications and broadcasts through the registry.
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
    max_drops: u64,
}

impl Broadcaster {
    /// Create a broadcaster that disconnects clients after `max_drops` drops.
    pub fn new(registry: Arc<ConnectionRegistry>, max_drops: u64) -> Self {
        Self {
            registry,
            max_drops: max_drops.max(1),
        }
    }

    /// The registry this broadcaster reads.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Send `notification` to the one connection `id` on `channel`.
    ///
    /// A missing connection is a silent no-op; returns whether it was queued.
    pub fn notify_sender(&self, channel: &ChannelKey, id: &ConnectionId, notification: &Notification) -> bool {
        let Some(conn) = self.registry.get(channel, id) else {
            debug!(%channel, conn_id = %id, "sender gone before notification");
            return false;
        };
        match encode(notification) {
            Ok(json) => self.deliver(&conn, &Arc::new(json)),
            Err(e) => {
                warn!(error = %e, "failed to serialize notification");
                false
            }
        }
    }

    /// Fan `payload` out to `recipients`; returns the number of connections
    /// it was queued on.
    pub fn broadcast(
        &self,
        channel: &ChannelKey,
        origin: &ConnectionId,
        recipients: &Recipients,
        payload: Arc<String>,
    ) -> usize {
        let targets: Vec<Arc<ClientConnection>> = match recipients {
            Recipients::None => return 0,
            Recipients::Users { ids, exclude } => {
                let mut seen = Vec::with_capacity(ids.len());
                let mut targets = Vec::new();
                for id in ids {
                    if exclude.as_ref() == Some(id) || seen.contains(&id) {
                        continue;
                    }
                    seen.push(id);
                    targets.extend(self.registry.snapshot(&ChannelKey::user(id)));
                }
                targets
            }
            Recipients::SameChannel => self
                .registry
                .snapshot(channel)
                .into_iter()
                .filter(|c| c.id != *origin)
                .collect(),
        };

        let delivered = targets
            .iter()
            .filter(|conn| self.deliver(conn, &payload))
            .count();
        debug!(
            %channel,
            targets = targets.len(),
            delivered,
            "broadcast"
        );
        delivered
    }

    /// Queue one frame; a failure only affects `conn`.
    fn deliver(&self, conn: &ClientConnection, payload: &Arc<String>) -> bool {
        if conn.send(Arc::clone(payload)) {
            return true;
        }
        counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
        let drops = conn.drop_count();
        if drops >= self.max_drops && !conn.is_closed() {
            warn!(conn_id = %conn.id, channel = %conn.channel, drops, "disconnecting slow client");
            counter!(WS_SLOW_CLIENT_DISCONNECTS_TOTAL).increment(1);
            conn.close();
            let _ = self.registry.deregister(&conn.channel, &conn.id);
        } else {
            debug!(conn_id = %conn.id, total_drops = drops, "failed to queue frame");
        }
        false
    }
}
