//! Single funnel through which peer-proposed mutations reach the world.

use crate::store::WorldStore;
use log::{debug, warn};
use serde_json::Value;
use shared::{ApplyOutcome, SyncError, WorldOp};

#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    /// The cell was overwritten; carries the normalized op that was queued.
    Changed(WorldOp),
    /// The coordinates missed the target grid; nothing was touched.
    NoEffect,
    Rejected(SyncError),
}

impl OpResult {
    pub fn is_changed(&self) -> bool {
        matches!(self, OpResult::Changed(_))
    }
}

/// Validates and applies a raw op against the authoritative world.
///
/// On success the normalized op is appended to the pending queue so the next
/// snapshot carries it to every connection.
pub fn apply_op(store: &mut WorldStore, raw: Value) -> OpResult {
    let Some(world) = store.world_mut() else {
        warn!("Rejected op: {}", SyncError::NoActiveWorld);
        return OpResult::Rejected(SyncError::NoActiveWorld);
    };

    let op = match WorldOp::from_value(raw) {
        Ok(op) => op,
        Err(e) => {
            warn!("Rejected op: {}", e);
            return OpResult::Rejected(e);
        }
    };

    match world.apply(&op) {
        ApplyOutcome::Changed => {
            debug!("Applied {:?}", op);
            store.queue_op(op.clone());
            OpResult::Changed(op)
        }
        ApplyOutcome::NoEffect => {
            let (x, y) = op.position();
            debug!("Op at ({}, {}) is outside the world, ignoring", x, y);
            OpResult::NoEffect
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared::WorldPayload;

    fn store_with_world() -> WorldStore {
        let mut store = WorldStore::new();
        store
            .propose_world(
                1,
                WorldPayload {
                    tiles: vec![vec!["grass".to_string()]],
                    objects: vec![vec![Value::Null]],
                },
            )
            .unwrap();
        store
    }

    #[test]
    fn test_rejected_without_world() {
        let mut store = WorldStore::new();
        let result = apply_op(
            &mut store,
            json!({"kind": "set_tile", "x": 0, "y": 0, "value": "sand"}),
        );
        assert_eq!(result, OpResult::Rejected(SyncError::NoActiveWorld));
        assert!(store.pending_ops().is_empty());
    }

    #[test]
    fn test_rejected_for_bad_shape() {
        let mut store = store_with_world();

        assert_eq!(
            apply_op(&mut store, json!(42)),
            OpResult::Rejected(SyncError::OpNotAnObject)
        );
        assert_eq!(
            apply_op(&mut store, json!({"kind": "burn", "x": 0, "y": 0})),
            OpResult::Rejected(SyncError::UnknownOpKind("burn".to_string()))
        );
        assert!(store.pending_ops().is_empty());
    }

    #[test]
    fn test_changed_is_queued() {
        let mut store = store_with_world();
        let result = apply_op(
            &mut store,
            json!({"kind": "set_tile", "x": 0, "y": 0, "value": "sand"}),
        );

        assert_eq!(result, OpResult::Changed(WorldOp::set_tile(0, 0, "sand")));
        assert!(result.is_changed());
        assert_eq!(store.pending_ops(), &[WorldOp::set_tile(0, 0, "sand")]);
        assert_eq!(store.active_world().unwrap().1.tile(0, 0), Some("sand"));
    }

    #[test]
    fn test_queued_op_is_normalized() {
        let mut store = store_with_world();
        apply_op(&mut store, json!({"kind": "set_tile", "x": 0, "y": 0}));
        apply_op(&mut store, json!({"kind": "set_obj", "x": 0, "y": 0}));

        assert_eq!(
            store.pending_ops(),
            &[
                WorldOp::set_tile(0, 0, "grass"),
                WorldOp::set_obj(0, 0, Value::Null)
            ]
        );
    }

    #[test]
    fn test_out_of_bounds_is_no_effect() {
        let mut store = store_with_world();
        let before = store.active_world().unwrap().1.clone();

        let result = apply_op(
            &mut store,
            json!({"kind": "set_tile", "x": 5, "y": 5, "value": "sand"}),
        );

        assert_eq!(result, OpResult::NoEffect);
        assert!(store.pending_ops().is_empty());
        assert_eq!(store.active_world().unwrap().1, &before);
    }

    #[test]
    fn test_repeated_op_leaves_same_cell() {
        let mut store = store_with_world();
        let op = json!({"kind": "set_tile", "x": 0, "y": 0, "value": "water"});

        apply_op(&mut store, op.clone());
        let once = store.active_world().unwrap().1.clone();
        apply_op(&mut store, op);

        assert_eq!(store.active_world().unwrap().1, &once);
    }
}
