//! Types shared by the relay server and its clients: the wire protocol, the
//! world grids with their op-application rule, player slots and activity log
//! entries.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod protocol;
pub mod world;

pub use protocol::{ClientMessage, InputPayload, ServerMessage, SnapshotState};
pub use world::{ApplyOutcome, Grid, ObjectInstance, TileId, WorldId, WorldOp, WorldPayload};

pub const MAX_PLAYERS: usize = 2;
pub const DEFAULT_TILE: &str = "grass";

/// Log entries retained by the server and by each client replica.
pub const LOG_HISTORY_LIMIT: usize = 200;
/// Log entries awaiting piggyback delivery on the next snapshot.
pub const PENDING_LOG_LIMIT: usize = 500;
/// Log entries carried by a single snapshot.
pub const SNAPSHOT_LOG_LIMIT: usize = 200;
pub const LOG_TEXT_LIMIT: usize = 200;

pub const SPAWN_POSITIONS: [(f32, f32); MAX_PLAYERS] = [(64.0, 64.0), (96.0, 64.0)];

/// One of the two fixed player identities a connection is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    P1,
    P2,
}

impl Slot {
    pub const ALL: [Slot; MAX_PLAYERS] = [Slot::P1, Slot::P2];

    pub fn index(self) -> usize {
        match self {
            Slot::P1 => 0,
            Slot::P2 => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Slot> {
        Slot::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Slot::P1 => "p1",
            Slot::P2 => "p2",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerState {
    pub id: Slot,
    pub x: f32,
    pub y: f32,
}

impl PlayerState {
    pub fn new(id: Slot, x: f32, y: f32) -> Self {
        Self { id, x, y }
    }

    pub fn spawn(id: Slot) -> Self {
        let (x, y) = SPAWN_POSITIONS[id.index()];
        Self::new(id, x, y)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ActivityLogEntry {
    pub seq: u64,
    pub text: String,
    pub by: String,
    /// Milliseconds since the Unix epoch.
    pub at: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    InvalidWorld(&'static str),
    WorldAlreadyActive { active: WorldId },
    NoActiveWorld,
    OpNotAnObject,
    UnknownOpKind(String),
    MalformedOp(String),
    MalformedMessage(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::InvalidWorld(why) => write!(f, "invalid world payload: {why}"),
            SyncError::WorldAlreadyActive { active } => {
                write!(f, "world {active} is already active")
            }
            SyncError::NoActiveWorld => write!(f, "no active world"),
            SyncError::OpNotAnObject => write!(f, "op is not an object"),
            SyncError::UnknownOpKind(kind) => write!(f, "unknown op kind: {kind:?}"),
            SyncError::MalformedOp(e) => write!(f, "malformed op: {e}"),
            SyncError::MalformedMessage(e) => write!(f, "malformed message: {e}"),
        }
    }
}

impl std::error::Error for SyncError {}

/// Milliseconds since the Unix epoch, saturating to zero on clock errors.
pub fn timestamp_ms() -> u64 {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    millis.min(u64::MAX as u128) as u64
}
