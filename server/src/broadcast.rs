//! Reliable broadcast channel: point ops for latency, snapshots for truth.
//!
//! An accepted op is pushed at once to the acting peer's partner and also
//! stays in the store's pending queue. A debounced resync then flushes one
//! full snapshot carrying every queued op, so a client that missed a point
//! message heals on the next snapshot. Rapid bursts of ops (chopping a tree
//! produces two) share one snapshot.

use crate::registry::{ConnectionId, ConnectionRegistry};
use crate::store::WorldStore;
use log::debug;
use shared::{PlayerState, ServerMessage, SnapshotState, WorldOp, SNAPSHOT_LOG_LIMIT};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};

/// Scheduled-task handle for the trailing snapshot.
///
/// At most one deadline is armed at a time. Scheduling while armed keeps the
/// existing deadline, so the worst-case delay for a burst is bounded by one
/// `delay`.
pub struct ResyncTimer {
    delay: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl ResyncTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    /// Arms the timer unless it is already armed. Returns true if armed now.
    pub fn schedule(&mut self) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(Box::pin(sleep(self.delay)));
        true
    }

    pub fn cancel_pending(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Completes when the armed deadline passes, disarming the timer.
    ///
    /// Never completes while disarmed. Dropping the future before it completes
    /// leaves the deadline armed, which makes it safe inside `select!`.
    pub async fn expired(&mut self) {
        match self.deadline.as_mut() {
            Some(deadline) => {
                deadline.as_mut().await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}

pub struct BroadcastChannel {
    resync: ResyncTimer,
    snapshots_sent: u64,
}

impl BroadcastChannel {
    pub fn new(resync_delay: Duration) -> Self {
        Self {
            resync: ResyncTimer::new(resync_delay),
            snapshots_sent: 0,
        }
    }

    /// Sends an accepted op to every connection except the one that proposed it.
    pub fn broadcast_op(
        &self,
        registry: &ConnectionRegistry,
        op: &WorldOp,
        exclude: Option<ConnectionId>,
    ) -> usize {
        registry.broadcast(&ServerMessage::WorldOp { op: op.clone() }, exclude)
    }

    pub fn schedule_resync(&mut self) -> bool {
        self.resync.schedule()
    }

    pub fn resync_pending(&self) -> bool {
        self.resync.is_pending()
    }

    pub async fn resync_due(&mut self) {
        self.resync.expired().await
    }

    /// Drains queued ops and piggybacked log entries into one snapshot and
    /// sends it to every live connection.
    ///
    /// Any armed resync is cancelled because this snapshot already carries
    /// the batch it was waiting for. With no connections the queues are left
    /// untouched so nothing is lost.
    pub fn broadcast_snapshot(
        &mut self,
        registry: &ConnectionRegistry,
        store: &mut WorldStore,
        players: &[PlayerState],
    ) -> usize {
        self.resync.cancel_pending();
        if registry.is_empty() {
            return 0;
        }

        let snapshot = build_snapshot(store, players);
        if let ServerMessage::Snapshot { ops, logs, .. } = &snapshot {
            if !ops.is_empty() || !logs.is_empty() {
                debug!(
                    "Snapshot #{} carries {} ops, {} log entries",
                    self.snapshots_sent + 1,
                    ops.len(),
                    logs.len()
                );
            }
        }

        self.snapshots_sent += 1;
        registry.broadcast(&snapshot, None)
    }

    pub fn snapshots_sent(&self) -> u64 {
        self.snapshots_sent
    }
}

/// Builds a snapshot message, draining the store's pending queues.
pub fn build_snapshot(store: &mut WorldStore, players: &[PlayerState]) -> ServerMessage {
    ServerMessage::Snapshot {
        state: SnapshotState {
            players: players.to_vec(),
        },
        ops: store.drain_pending_ops(),
        logs: store.take_pending_logs(SNAPSHOT_LOG_LIMIT),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use shared::{Slot, WorldPayload};
    use std::net::SocketAddr;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    fn players() -> Vec<PlayerState> {
        Slot::ALL.iter().map(|s| PlayerState::spawn(*s)).collect()
    }

    #[tokio::test]
    async fn test_resync_timer_fires_once() {
        let mut timer = ResyncTimer::new(Duration::from_millis(10));
        assert!(timer.schedule());
        assert!(!timer.schedule());
        assert!(timer.is_pending());

        let fired = timeout(Duration::from_millis(500), timer.expired()).await;
        assert!(fired.is_ok());
        assert!(!timer.is_pending());

        let again = timeout(Duration::from_millis(50), timer.expired()).await;
        assert!(again.is_err());
    }

    #[test]
    fn test_disarmed_timer_is_pending() {
        let mut timer = ResyncTimer::new(Duration::from_millis(5));
        let mut expired = tokio_test::task::spawn(timer.expired());
        tokio_test::assert_pending!(expired.poll());
    }

    #[tokio::test]
    async fn test_cancelled_timer_never_fires() {
        let mut timer = ResyncTimer::new(Duration::from_millis(5));
        timer.schedule();
        timer.cancel_pending();

        let fired = timeout(Duration::from_millis(50), timer.expired()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_dropped_wait_keeps_deadline() {
        let mut timer = ResyncTimer::new(Duration::from_millis(30));
        timer.schedule();

        let early = timeout(Duration::from_millis(1), timer.expired()).await;
        assert!(early.is_err());
        assert!(timer.is_pending());

        let later = timeout(Duration::from_millis(500), timer.expired()).await;
        assert!(later.is_ok());
    }

    #[test]
    fn test_build_snapshot_drains_queues() {
        let mut store = WorldStore::new();
        store
            .propose_world(1, WorldPayload::filled(2, 2, "grass"))
            .unwrap();
        store.queue_op(WorldOp::set_tile(1, 1, "sand"));
        store.append_log("hello", "p1", 0);

        let snapshot = build_snapshot(&mut store, &players());
        match snapshot {
            ServerMessage::Snapshot { state, ops, logs } => {
                assert_eq!(state.players.len(), 2);
                assert_eq!(ops, vec![WorldOp::set_tile(1, 1, "sand")]);
                assert_eq!(logs.len(), 1);
                assert_eq!(logs[0].seq, 1);
            }
            _ => panic!("Expected a snapshot"),
        }

        assert!(store.pending_ops().is_empty());
        assert_eq!(store.pending_log_count(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_reaches_every_connection_and_cancels_resync() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.connect(1, test_addr(), tx1);
        registry.connect(2, test_addr(), tx2);

        let mut store = WorldStore::new();
        store
            .propose_world(1, WorldPayload::filled(1, 1, "grass"))
            .unwrap();
        store.queue_op(WorldOp::set_obj(0, 0, Value::Null));

        let mut channel = BroadcastChannel::new(Duration::from_millis(20));
        channel.schedule_resync();

        assert_eq!(channel.broadcast_snapshot(&registry, &mut store, &players()), 2);
        assert!(!channel.resync_pending());
        assert_eq!(channel.snapshots_sent(), 1);

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap() {
                ServerMessage::Snapshot { ops, .. } => {
                    assert_eq!(ops, vec![WorldOp::set_obj(0, 0, Value::Null)])
                }
                other => panic!("Expected a snapshot, got {}", other.kind()),
            }
        }
    }

    #[test]
    fn test_snapshot_without_connections_keeps_queue() {
        let registry = ConnectionRegistry::new();
        let mut store = WorldStore::new();
        store.queue_op(WorldOp::set_tile(0, 0, "sand"));

        let mut channel = BroadcastChannel::new(Duration::from_millis(20));
        assert_eq!(channel.broadcast_snapshot(&registry, &mut store, &players()), 0);
        assert_eq!(store.pending_ops().len(), 1);
    }

    #[test]
    fn test_point_op_skips_proposer() {
        let mut registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.connect(1, test_addr(), tx1);
        registry.connect(2, test_addr(), tx2);

        let channel = BroadcastChannel::new(Duration::from_millis(20));
        let op = WorldOp::set_tile(0, 0, "sand");
        assert_eq!(channel.broadcast_op(&registry, &op, Some(2)), 1);

        assert_eq!(rx1.try_recv().unwrap(), ServerMessage::WorldOp { op });
        assert!(rx2.try_recv().is_err());
    }
}
