//! Channel-keyed connection registry.
//!
//! A sharded concurrent map from [`ChannelKey`] to an identity-indexed set of
//! connections. Each key's set is guarded by its shard lock only, so churn on
//! one channel never serializes another. Sets are pruned as soon as they empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chatgate_core::ChannelKey;
use chatgate_core::ids::ConnectionId;
use dashmap::DashMap;
use tracing::debug;

use super::connection::ClientConnection;

/// Registration order plus the connection itself.
type Slot = (u64, Arc<ClientConnection>);

/// Thread-safe mapping from channel key to its live connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    channels: DashMap<ChannelKey, HashMap<ConnectionId, Slot>>,
    next_seq: AtomicU64,
    active: AtomicUsize,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// File `connection` under its own channel key.
    ///
    /// Returns `false` if a connection with the same id was already there
    /// (it is replaced).
    pub fn register(&self, connection: Arc<ClientConnection>) -> bool {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let key = connection.channel.clone();
        let id = connection.id.clone();
        let fresh = self
            .channels
            .entry(key)
            .or_default()
            .insert(id, (seq, connection))
            .is_none();
        if fresh {
            let _ = self.active.fetch_add(1, Ordering::Relaxed);
        }
        fresh
    }

    /// Remove a connection by identity. No-op if it is already gone.
    pub fn deregister(&self, channel: &ChannelKey, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        let removed = self
            .channels
            .get_mut(channel)
            .and_then(|mut set| set.remove(id))
            .map(|(_, conn)| conn);

        if removed.is_some() {
            let _ = self.active.fetch_sub(1, Ordering::Relaxed);
            if self
                .channels
                .remove_if(channel, |_, set| set.is_empty())
                .is_some()
            {
                debug!(%channel, "pruned empty channel");
            }
        }
        removed
    }

    /// Connections on `channel` in registration order.
    pub fn snapshot(&self, channel: &ChannelKey) -> Vec<Arc<ClientConnection>> {
        let Some(set) = self.channels.get(channel) else {
            return Vec::new();
        };
        let mut slots: Vec<&Slot> = set.values().collect();
        slots.sort_unstable_by_key(|(seq, _)| *seq);
        slots.into_iter().map(|(_, conn)| Arc::clone(conn)).collect()
    }

    /// Whether any connection is filed under `channel`.
    pub fn lookup(&self, channel: &ChannelKey) -> bool {
        self.channels.get(channel).is_some_and(|set| !set.is_empty())
    }

    /// One connection by identity.
    pub fn get(&self, channel: &ChannelKey, id: &ConnectionId) -> Option<Arc<ClientConnection>> {
        self.channels
            .get(channel)
            .and_then(|set| set.get(id).map(|(_, conn)| Arc::clone(conn)))
    }

    /// Number of registered connections across all channels.
    pub fn connection_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Number of non-empty channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of connections on one channel.
    pub fn channel_len(&self, channel: &ChannelKey) -> usize {
        self.channels.get(channel).map_or(0, |set| set.len())
    }
}
