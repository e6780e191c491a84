//! Scripted player actions for headless clients.
//!
//! The planner stands in for keyboard/mouse input: it picks something to do
//! on the current replica and describes it as the ops and messages a real
//! player action would produce.

use crate::worldgen::{fence, is_tree};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use shared::{ClientMessage, InputPayload, Slot, WorldOp, WorldPayload};

/// Pixels per tile, used to turn cell coordinates into player positions.
pub const TILE_SIZE: f32 = 32.0;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerAction {
    Walk { x: f32, y: f32 },
    Chop { x: i64, y: i64 },
    Till { x: i64, y: i64 },
    PlaceFence { x: i64, y: i64 },
}

impl PlayerAction {
    /// World edits this action makes, in the order they must be applied.
    pub fn ops(&self) -> Vec<WorldOp> {
        match *self {
            PlayerAction::Walk { .. } => Vec::new(),
            PlayerAction::Chop { x, y } => vec![
                WorldOp::set_obj(x, y, Value::Null),
                WorldOp::set_tile(x, y, "dirt"),
            ],
            PlayerAction::Till { x, y } => vec![WorldOp::set_tile(x, y, "soil")],
            PlayerAction::PlaceFence { x, y } => vec![WorldOp::set_obj(x, y, fence())],
        }
    }

    pub fn log_text(&self, slot: Slot) -> Option<String> {
        match self {
            PlayerAction::Walk { .. } => None,
            PlayerAction::Chop { x, y } => Some(format!("{slot} chopped a tree at ({x}, {y})")),
            PlayerAction::Till { x, y } => Some(format!("{slot} tilled soil at ({x}, {y})")),
            PlayerAction::PlaceFence { x, y } => {
                Some(format!("{slot} built a fence at ({x}, {y})"))
            }
        }
    }

    /// Messages to send to the server for this action.
    pub fn messages(&self, slot: Slot) -> Vec<ClientMessage> {
        let mut messages: Vec<ClientMessage> = match self {
            PlayerAction::Walk { x, y } => vec![ClientMessage::Input {
                payload: InputPayload::Move { x: *x, y: *y },
            }],
            _ => self.ops().iter().map(ClientMessage::world_op).collect(),
        };

        if let Some(text) = self.log_text(slot) {
            messages.push(ClientMessage::Input {
                payload: InputPayload::Log { text },
            });
        }
        messages
    }
}

pub struct ActionPlanner {
    rng: StdRng,
}

impl ActionPlanner {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Picks a random cell and decides what to do with it.
    pub fn next_action(&mut self, world: &WorldPayload) -> PlayerAction {
        let (width, height) = world.dimensions();
        if width == 0 || height == 0 {
            return PlayerAction::Walk { x: 0.0, y: 0.0 };
        }

        let cx = self.rng.gen_range(0..width);
        let cy = self.rng.gen_range(0..height);
        let (x, y) = (cx as i64, cy as i64);

        let tile = world.tile(cx, cy);
        let object = world.object(cx, cy);

        match (tile, object) {
            (_, Some(object)) if is_tree(object) => PlayerAction::Chop { x, y },
            (Some("grass"), Some(Value::Null)) => {
                if self.rng.gen_bool(0.5) {
                    PlayerAction::Till { x, y }
                } else {
                    PlayerAction::PlaceFence { x, y }
                }
            }
            _ => PlayerAction::Walk {
                x: (cx as f32 + 0.5) * TILE_SIZE,
                y: (cy as f32 + 0.5) * TILE_SIZE,
            },
        }
    }
}
