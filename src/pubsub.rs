//! C9: the publish/subscribe hub (spec.md §4.9).
//!
//! `spineldb`'s own `PubSubManager` (`src/core/pubsub/mod.rs`) is a
//! `DashMap<Bytes, broadcast::Sender>` per channel — a fan-out primitive
//! that can't report "how many subscribers does this channel have right
//! now" without also tracking receiver counts separately, and spec.md
//! §4.9 specifies an **insertion-ordered subscriber list** so
//! `Unsubscribe` can report precise per-channel counts. That shape is
//! closer to the Go original's `pkg/pubsub/pubsub.go` (also list-based),
//! so this hub keeps the teacher's per-channel-striped-lock *pattern*
//! but stores an ordered `Vec<SubscriberId>` per channel instead of a
//! broadcast sender, with a side map for actual message delivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::storage::StripedLock;

pub type SubscriberId = u64;

const CHANNEL_LOCK_STRIPES: usize = 256;
const DELIVERY_BUFFER: usize = 128;

/// A message handed to a subscriber's delivery task: the channel it was
/// published on and the payload (`message <channel> <payload>` in
/// spec.md §4.9's wire terms).
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub channel: Bytes,
    pub payload: Bytes,
}

pub struct PubSubHub {
    locker: StripedLock,
    channels: DashMap<Bytes, Vec<SubscriberId>>,
    senders: DashMap<SubscriberId, mpsc::Sender<PubSubMessage>>,
    memberships: DashMap<SubscriberId, Mutex<Vec<Bytes>>>,
    next_id: AtomicU64,
}

impl Default for PubSubHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PubSubHub {
    pub fn new() -> Self {
        Self {
            locker: StripedLock::new(CHANNEL_LOCK_STRIPES),
            channels: DashMap::new(),
            senders: DashMap::new(),
            memberships: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers a new subscriber and returns its id plus the receiving
    /// end of its delivery channel. The caller's connection task should
    /// forward everything read from the receiver to the client socket.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<PubSubMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        self.senders.insert(id, tx);
        self.memberships.insert(id, Mutex::new(Vec::new()));
        (id, rx)
    }

    /// Drops a subscriber entirely: equivalent to unsubscribing from
    /// every channel it's in, then forgetting its delivery sender.
    pub async fn deregister(&self, id: SubscriberId) {
        self.unsubscribe_all(id).await;
        self.senders.remove(&id);
        self.memberships.remove(&id);
    }

    /// Subscribes `id` to each channel, appending to the channel's
    /// insertion-ordered list if not already present. Returns
    /// `(channel, subscriber_count)` for every channel, in order, for
    /// the `subscribe <channel> <count>` reply sequence.
    pub async fn subscribe(&self, id: SubscriberId, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        let mut out = Vec::with_capacity(channels.len());
        for channel in channels {
            let _guard = self.locker.lock(channel).await;
            let count = {
                let mut entry = self.channels.entry(channel.clone()).or_default();
                if !entry.contains(&id) {
                    entry.push(id);
                }
                entry.len()
            };
            if let Some(membership) = self.memberships.get(&id) {
                let mut list = membership.lock();
                if !list.contains(channel) {
                    list.push(channel.clone());
                }
            }
            out.push((channel.clone(), count));
        }
        out
    }

    /// Unsubscribes `id` from each named channel. Returns
    /// `(channel, remaining_count)` pairs in order.
    pub async fn unsubscribe(&self, id: SubscriberId, channels: &[Bytes]) -> Vec<(Bytes, usize)> {
        let mut out = Vec::with_capacity(channels.len());
        for channel in channels {
            let count = self.remove_from_channel(channel, id).await;
            if let Some(membership) = self.memberships.get(&id) {
                membership.lock().retain(|c| c != channel);
            }
            out.push((channel.clone(), count));
        }
        out
    }

    /// Unsubscribes `id` from every channel it currently belongs to.
    /// Mirrors spec.md §9's fix for the source's `unsubscribeAll` bug:
    /// remove from each per-channel list first (dropping the channel
    /// entry if it empties), only then clear the subscriber's own
    /// membership record.
    pub async fn unsubscribe_all(&self, id: SubscriberId) -> Vec<(Bytes, usize)> {
        let snapshot = self
            .memberships
            .get(&id)
            .map(|m| m.lock().clone())
            .unwrap_or_default();
        let mut out = Vec::with_capacity(snapshot.len());
        for channel in &snapshot {
            let count = self.remove_from_channel(channel, id).await;
            out.push((channel.clone(), count));
        }
        if let Some(membership) = self.memberships.get(&id) {
            membership.lock().clear();
        }
        out
    }

    async fn remove_from_channel(&self, channel: &Bytes, id: SubscriberId) -> usize {
        let _guard = self.locker.lock(channel).await;
        let mut remove_entry = false;
        let count = match self.channels.get_mut(channel) {
            Some(mut subs) => {
                subs.retain(|s| *s != id);
                let count = subs.len();
                remove_entry = subs.is_empty();
                count
            }
            None => 0,
        };
        if remove_entry {
            self.channels.remove(channel);
        }
        count
    }

    /// Delivers `payload` to every current subscriber of `channel`.
    /// Returns the number of subscribers the message was handed to — not
    /// necessarily the number that will actually read it, matching
    /// spec.md §4.9's "count delivered" (a slow subscriber dropping a
    /// message is its own problem, not the publisher's).
    pub async fn publish(&self, channel: &Bytes, payload: Bytes) -> usize {
        let _guard = self.locker.rlock(channel).await;
        let Some(subs) = self.channels.get(channel) else {
            return 0;
        };
        let message = PubSubMessage {
            channel: channel.clone(),
            payload,
        };
        let mut delivered = 0;
        for id in subs.iter() {
            if let Some(sender) = self.senders.get(id) {
                if sender.send(message.clone()).await.is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, channel: &[u8]) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

pub type SharedPubSubHub = Arc<PubSubHub>;
