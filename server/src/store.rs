//! Authoritative world state held by the server.
//!
//! The store owns the single accepted world, the queue of accepted ops that
//! still need to ride on a snapshot, and the activity log (both the bounded
//! history used for resync and the pending piggyback buffer).

use log::{debug, info, warn};
use shared::{
    ActivityLogEntry, SyncError, WorldId, WorldOp, WorldPayload, LOG_HISTORY_LIMIT,
    LOG_TEXT_LIMIT, PENDING_LOG_LIMIT,
};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct ActiveWorld {
    id: WorldId,
    payload: WorldPayload,
}

#[derive(Debug, Default)]
pub struct WorldStore {
    active: Option<ActiveWorld>,
    pending_ops: Vec<WorldOp>,
    history: VecDeque<ActivityLogEntry>,
    pending_logs: VecDeque<ActivityLogEntry>,
    last_seq: u64,
}

impl WorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// First-writer-wins world proposal.
    ///
    /// The first structurally valid proposal becomes the world for the rest of
    /// the process lifetime. Every later proposal is rejected without looking
    /// at its contents.
    pub fn propose_world(&mut self, id: WorldId, payload: WorldPayload) -> Result<(), SyncError> {
        if let Err(e) = payload.validate() {
            warn!("Rejected world {}: {}", id, e);
            return Err(e);
        }

        if let Some(active) = &self.active {
            let e = SyncError::WorldAlreadyActive { active: active.id };
            warn!("Rejected world {}: {}", id, e);
            return Err(e);
        }

        let (width, height) = payload.dimensions();
        info!("Accepted world {} ({}x{})", id, width, height);
        self.active = Some(ActiveWorld { id, payload });
        Ok(())
    }

    pub fn active_world(&self) -> Option<(WorldId, &WorldPayload)> {
        self.active.as_ref().map(|w| (w.id, &w.payload))
    }

    pub fn has_world(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn world_mut(&mut self) -> Option<&mut WorldPayload> {
        self.active.as_mut().map(|w| &mut w.payload)
    }

    pub(crate) fn queue_op(&mut self, op: WorldOp) {
        self.pending_ops.push(op);
    }

    pub fn pending_ops(&self) -> &[WorldOp] {
        &self.pending_ops
    }

    /// Empties the pending queue, preserving arrival order.
    pub fn drain_pending_ops(&mut self) -> Vec<WorldOp> {
        std::mem::take(&mut self.pending_ops)
    }

    /// Records an activity log line and queues it for piggyback delivery.
    ///
    /// Returns None for blank text. Text longer than [`LOG_TEXT_LIMIT`]
    /// characters is truncated.
    pub fn append_log(&mut self, text: &str, by: &str, at: u64) -> Option<ActivityLogEntry> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.last_seq += 1;
        let entry = ActivityLogEntry {
            seq: self.last_seq,
            text: text.chars().take(LOG_TEXT_LIMIT).collect(),
            by: by.to_string(),
            at,
        };
        debug!("Log #{} by {}: {}", entry.seq, entry.by, entry.text);

        push_bounded(&mut self.history, entry.clone(), LOG_HISTORY_LIMIT);
        push_bounded(&mut self.pending_logs, entry.clone(), PENDING_LOG_LIMIT);
        Some(entry)
    }

    /// Highest sequence number handed out so far, zero before the first entry.
    pub fn last_seq(&self) -> u64 {
        self.last_seq
    }

    pub fn log_history(&self) -> Vec<ActivityLogEntry> {
        self.history.iter().cloned().collect()
    }

    pub fn pending_log_count(&self) -> usize {
        self.pending_logs.len()
    }

    /// Clears the piggyback buffer, returning at most the `limit` most recent
    /// entries in sequence order.
    pub fn take_pending_logs(&mut self, limit: usize) -> Vec<ActivityLogEntry> {
        let skip = self.pending_logs.len().saturating_sub(limit);
        self.pending_logs.drain(..).skip(skip).collect()
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, limit: usize) {
    if buffer.len() == limit {
        buffer.pop_front();
    }
    buffer.push_back(item);
}
