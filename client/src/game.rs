use log::debug;
use shared::{
    ActivityLogEntry, ApplyOutcome, PlayerState, Slot, WorldId, WorldOp, WorldPayload,
    LOG_HISTORY_LIMIT,
};
use std::collections::VecDeque;

/// Local read replica of the shared world.
///
/// The server is authoritative: players are replaced wholesale from each
/// snapshot and ops are overwrites, so re-applying an op that was already
/// applied optimistically changes nothing.
#[derive(Debug, Default)]
pub struct ClientGameState {
    pub world_id: Option<WorldId>,
    pub world: Option<WorldPayload>,
    pub players: Vec<PlayerState>,
    pub logs: VecDeque<ActivityLogEntry>,
    /// Highest log sequence number already in `logs`.
    pub last_log_seq: u64,
    pub snapshots_applied: u64,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_world(&self) -> bool {
        self.world.is_some()
    }

    /// Replaces the replica with a full world pushed by the server.
    pub fn apply_world(&mut self, world_id: WorldId, world: WorldPayload) {
        if let Some(previous) = self.world_id {
            if previous != world_id {
                debug!("Replacing world {} with {}", previous, world_id);
            }
        }
        self.world_id = Some(world_id);
        self.world = Some(world);
    }

    pub fn apply_snapshot(
        &mut self,
        players: Vec<PlayerState>,
        ops: &[WorldOp],
        logs: Vec<ActivityLogEntry>,
    ) {
        self.players = players;
        for op in ops {
            self.apply_op(op);
        }
        for entry in logs {
            self.push_log(entry);
        }
        self.snapshots_applied += 1;
    }

    /// Applies an op from any delivery path: snapshot, point message or a
    /// local optimistic edit.
    ///
    /// Ops that arrive before any world are dropped; the world pushed later
    /// already contains their effect.
    pub fn apply_op(&mut self, op: &WorldOp) -> ApplyOutcome {
        match self.world.as_mut() {
            Some(world) => world.apply(op),
            None => ApplyOutcome::NoEffect,
        }
    }

    pub fn apply_log_init(&mut self, seq: u64, entries: Vec<ActivityLogEntry>) {
        self.logs.clear();
        self.last_log_seq = 0;
        for entry in entries {
            self.push_log(entry);
        }
        self.last_log_seq = self.last_log_seq.max(seq);
    }

    /// Appends a log entry unless its sequence number was already seen.
    pub fn push_log(&mut self, entry: ActivityLogEntry) -> bool {
        if entry.seq <= self.last_log_seq {
            return false;
        }
        self.last_log_seq = entry.seq;
        if self.logs.len() == LOG_HISTORY_LIMIT {
            self.logs.pop_front();
        }
        self.logs.push_back(entry);
        true
    }

    pub fn player(&self, slot: Slot) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.id == slot)
    }

    /// Moves our own player locally until the next snapshot overrides it.
    pub fn predict_move(&mut self, slot: Slot, x: f32, y: f32) {
        match self.players.iter_mut().find(|p| p.id == slot) {
            Some(player) => {
                player.x = x;
                player.y = y;
            }
            None => self.players.push(PlayerState::new(slot, x, y)),
        }
    }
}
