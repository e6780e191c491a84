//! JSON messages exchanged between the relay server and its two clients.
//!
//! Every frame is one JSON object tagged by `type`. Field names follow the
//! camelCase used on the wire (`playerId`, `worldId`).

use crate::world::{WorldId, WorldOp, WorldPayload};
use crate::{ActivityLogEntry, PlayerState, Slot, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    WorldRequest,
    WorldSet {
        #[serde(rename = "worldId")]
        world_id: WorldId,
        world: WorldPayload,
    },
    /// The op stays untyped until the server's mutation applier decodes it,
    /// so that a bad op is a rejection rather than an unreadable frame.
    WorldOp {
        op: Value,
    },
    Input {
        payload: InputPayload,
    },
}

/// Per-turn player action carried inside an `input` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputPayload {
    Move { x: f32, y: f32 },
    Log { text: String },
    WorldOp { op: Value },
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Welcome {
        #[serde(rename = "playerId")]
        player_id: Slot,
    },
    World {
        #[serde(rename = "worldId")]
        world_id: WorldId,
        world: WorldPayload,
    },
    WorldOp {
        op: WorldOp,
    },
    Snapshot {
        state: SnapshotState,
        ops: Vec<WorldOp>,
        logs: Vec<ActivityLogEntry>,
    },
    LogInit {
        seq: u64,
        entries: Vec<ActivityLogEntry>,
    },
    LogEntry {
        entry: ActivityLogEntry,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    pub players: Vec<PlayerState>,
}

impl ClientMessage {
    /// Wraps a typed op for sending; the server decodes it again on arrival.
    pub fn world_op(op: &WorldOp) -> Self {
        ClientMessage::WorldOp {
            op: serde_json::to_value(op).unwrap_or(Value::Null),
        }
    }

    pub fn decode(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::MalformedMessage(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::MalformedMessage(e.to_string()))
    }
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<Self, SyncError> {
        serde_json::from_str(text).map_err(|e| SyncError::MalformedMessage(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, SyncError> {
        serde_json::to_string(self).map_err(|e| SyncError::MalformedMessage(e.to_string()))
    }

    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Welcome { .. } => "welcome",
            ServerMessage::World { .. } => "world",
            ServerMessage::WorldOp { .. } => "world_op",
            ServerMessage::Snapshot { .. } => "snapshot",
            ServerMessage::LogInit { .. } => "log_init",
            ServerMessage::LogEntry { .. } => "log_entry",
        }
    }
}
