//! Fan-out of committed updates to every connection.
//!
//! One tokio broadcast channel carries pre-encoded update frames. The engine
//! sends while holding the editor lock, so sending must never wait: each
//! receiver buffers up to `capacity` frames and a receiver that falls
//! further behind observes `Lagged` and is disconnected by its connection
//! task instead of slowing everyone else down.
//!
//! Operations the engine drops travel the same channel as
//! [`Outbound::Rejected`], tagged with their author; every other connection
//! skips them.
//!
//! Reference: Patterson & Hennessy, Section 6.4, Interconnection Networks

use bytes::Bytes;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use cep_core::{ClientId, Dispatcher, Dropped, Update};

use crate::protocol::{self, Rejection};

/// One item on the fan-out channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Encoded update frame for every connection
    Update(Bytes),
    /// An edit the engine dropped; only its author's connection sends it
    Rejected { client: ClientId, rejection: Rejection },
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    /// Receivers cut off for falling more than `capacity` frames behind
    pub lagged_receivers: u64,
    pub active_receivers: usize,
}

/// Broadcast group for the one shared document.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Outbound>,
    capacity: usize,
    messages_sent: AtomicU64,
    lagged_receivers: AtomicU64,
}

impl BroadcastGroup {
    /// `capacity` is how many frames each receiver may buffer.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds `usize::MAX / 2`, like
    /// [`broadcast::channel`].
    pub fn new(capacity: NonZeroUsize) -> Self {
        let (sender, _) = broadcast::channel(capacity.get());
        Self {
            sender,
            capacity: capacity.get(),
            messages_sent: AtomicU64::new(0),
            lagged_receivers: AtomicU64::new(0),
        }
    }

    /// New receiver; sees every frame sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.sender.subscribe()
    }

    /// Send a pre-encoded frame to every receiver. Never blocks.
    ///
    /// Returns the number of receivers the frame was queued for.
    pub fn broadcast_raw(&self, frame: Bytes) -> usize {
        let count = self.sender.send(Outbound::Update(frame)).unwrap_or(0);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Queue a rejection for `client`'s connection. Never blocks.
    pub fn reject(&self, client: ClientId, rejection: Rejection) -> usize {
        self.sender
            .send(Outbound::Rejected { client, rejection })
            .unwrap_or(0)
    }

    /// Record that a receiver lagged and was dropped.
    pub fn record_lagged(&self) {
        self.lagged_receivers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            lagged_receivers: self.lagged_receivers.load(Ordering::Relaxed),
            active_receivers: self.sender.receiver_count(),
        }
    }
}

impl Dispatcher for BroadcastGroup {
    fn dispatch(&self, update: &Update) {
        let count = self.broadcast_raw(protocol::encode_update(update));
        log::trace!("Update v{} queued for {count} receivers", update.version);
    }

    fn dropped(&self, dropped: &Dropped) {
        self.reject(dropped.client, Rejection::dropped(dropped));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cep_core::ApplyError;
    use tokio::sync::broadcast::error::RecvError;

    fn group(capacity: usize) -> BroadcastGroup {
        BroadcastGroup::new(NonZeroUsize::new(capacity).unwrap())
    }

    fn frame(item: Outbound) -> Bytes {
        match item {
            Outbound::Update(frame) => frame,
            other => panic!("Expected update frame, got {other:?}"),
        }
    }

    fn update(version: u32) -> Update {
        Update {
            source: 4,
            version,
            offset: 0,
            delete_count: 0,
            insert: b"hi".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_broadcast_fan_out() {
        let group = group(16);
        let mut rx1 = group.subscribe();
        let mut rx2 = group.subscribe();
        let mut rx3 = group.subscribe();

        let count = group.broadcast_raw(Bytes::from_static(&[1, 2, 3]));
        // Author included: filtering is not the group's job
        assert_eq!(count, 3);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            assert_eq!(&frame(rx.recv().await.unwrap())[..], &[1, 2, 3]);
        }
    }

    #[tokio::test]
    async fn test_broadcast_without_receivers() {
        let group = group(4);
        assert_eq!(group.broadcast_raw(Bytes::from_static(b"x")), 0);
        assert_eq!(group.stats().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_dispatch_encodes_update() {
        let group = group(16);
        let mut rx = group.subscribe();

        group.dispatch(&update(3));

        let encoded = frame(rx.recv().await.unwrap());
        assert_eq!(protocol::decode_update(&encoded).unwrap(), update(3));
    }

    #[tokio::test]
    async fn test_dropped_op_becomes_tagged_rejection() {
        let group = group(16);
        let mut rx = group.subscribe();

        group.dropped(&Dropped {
            client: 5,
            base_version: 2,
            offset: 7,
            delete_count: 1,
            error: ApplyError::HistoryEvicted { base: 2, retained_from: 3 },
        });

        match rx.recv().await.unwrap() {
            Outbound::Rejected { client, rejection } => {
                assert_eq!(client, 5);
                assert_eq!(rejection.reason, "history_evicted");
                assert_eq!((rejection.base_version, rejection.offset), (2, 7));
            }
            other => panic!("Expected rejection, got {other:?}"),
        }
        // Rejections are not update frames
        assert_eq!(group.stats().messages_sent, 0);
    }

    #[tokio::test]
    async fn test_slow_receiver_lags_without_blocking_sender() {
        let group = group(4);
        let mut slow = group.subscribe();

        for v in 0..10 {
            group.dispatch(&update(v));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(6))));
        group.record_lagged();
        assert_eq!(group.stats().lagged_receivers, 1);
    }

    #[tokio::test]
    async fn test_broadcast_stats() {
        let group = group(32);
        let _rx = group.subscribe();
        group.dispatch(&update(1));
        group.dispatch(&update(2));

        let stats = group.stats();
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.active_receivers, 1);
        assert_eq!(group.capacity(), 32);
    }
}
