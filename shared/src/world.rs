//! Tile/object grids and the single rule for applying cell mutations.
//!
//! Both the server's authority store and every client replica call
//! [`WorldPayload::apply`], so an op produces the same cell contents no matter
//! which path delivered it.

use crate::{SyncError, DEFAULT_TILE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub type WorldId = u64;
pub type TileId = String;
/// Arbitrary object placed on a cell; `Value::Null` marks an empty cell.
pub type ObjectInstance = Value;
pub type Grid<T> = Vec<Vec<T>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPayload {
    pub tiles: Grid<TileId>,
    pub objects: Grid<ObjectInstance>,
}

/// Outcome of applying a single op to a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Changed,
    NoEffect,
}

impl WorldPayload {
    /// Builds a payload with every tile set to `tile` and no objects.
    pub fn filled(width: usize, height: usize, tile: &str) -> Self {
        Self {
            tiles: vec![vec![tile.to_string(); width]; height],
            objects: vec![vec![Value::Null; width]; height],
        }
    }

    /// Minimal shape check applied to world proposals.
    ///
    /// Only the first row of each grid is inspected; full rectangularity and
    /// matching dimensions between the two grids are not verified.
    pub fn validate(&self) -> Result<(), SyncError> {
        match self.tiles.first() {
            None => return Err(SyncError::InvalidWorld("tiles has no rows")),
            Some(row) if row.is_empty() => {
                return Err(SyncError::InvalidWorld("first tiles row is empty"))
            }
            Some(_) => {}
        }
        match self.objects.first() {
            None => Err(SyncError::InvalidWorld("objects has no rows")),
            Some(row) if row.is_empty() => {
                Err(SyncError::InvalidWorld("first objects row is empty"))
            }
            Some(_) => Ok(()),
        }
    }

    /// Width of row 0 and number of rows of the tile grid.
    pub fn dimensions(&self) -> (usize, usize) {
        let width = self.tiles.first().map_or(0, Vec::len);
        (width, self.tiles.len())
    }

    pub fn tile(&self, x: usize, y: usize) -> Option<&str> {
        self.tiles.get(y)?.get(x).map(String::as_str)
    }

    pub fn object(&self, x: usize, y: usize) -> Option<&ObjectInstance> {
        self.objects.get(y)?.get(x)
    }

    /// Overwrites the target cell of `op`.
    ///
    /// Out-of-range coordinates leave both grids untouched. Applying the same
    /// op twice is identical to applying it once.
    pub fn apply(&mut self, op: &WorldOp) -> ApplyOutcome {
        match op {
            WorldOp::SetTile { x, y, value } => match cell_mut(&mut self.tiles, *x, *y) {
                Some(cell) => {
                    cell.clone_from(value);
                    ApplyOutcome::Changed
                }
                None => ApplyOutcome::NoEffect,
            },
            WorldOp::SetObj { x, y, value } => match cell_mut(&mut self.objects, *x, *y) {
                Some(cell) => {
                    cell.clone_from(value);
                    ApplyOutcome::Changed
                }
                None => ApplyOutcome::NoEffect,
            },
        }
    }
}

fn cell_mut<T>(grid: &mut Grid<T>, x: i64, y: i64) -> Option<&mut T> {
    let x = usize::try_from(x).ok()?;
    let y = usize::try_from(y).ok()?;
    grid.get_mut(y)?.get_mut(x)
}

/// A single last-write-wins cell mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorldOp {
    SetTile {
        x: i64,
        y: i64,
        #[serde(default = "default_tile", deserialize_with = "tile_value")]
        value: TileId,
    },
    SetObj {
        x: i64,
        y: i64,
        #[serde(default)]
        value: ObjectInstance,
    },
}

impl WorldOp {
    pub fn set_tile(x: i64, y: i64, value: impl Into<TileId>) -> Self {
        WorldOp::SetTile {
            x,
            y,
            value: value.into(),
        }
    }

    pub fn set_obj(x: i64, y: i64, value: ObjectInstance) -> Self {
        WorldOp::SetObj { x, y, value }
    }

    /// Decodes an op proposed by a peer.
    ///
    /// Distinguishes a non-object, an unrecognized `kind`, and fields that fail
    /// to decode, so the server can log why a proposal was rejected.
    pub fn from_value(value: Value) -> Result<Self, SyncError> {
        let Some(fields) = value.as_object() else {
            return Err(SyncError::OpNotAnObject);
        };
        match fields.get("kind").and_then(Value::as_str) {
            Some("set_tile") | Some("set_obj") => {}
            Some(other) => return Err(SyncError::UnknownOpKind(other.to_string())),
            None => return Err(SyncError::UnknownOpKind(String::new())),
        }
        serde_json::from_value(value).map_err(|e| SyncError::MalformedOp(e.to_string()))
    }

    pub fn position(&self) -> (i64, i64) {
        match self {
            WorldOp::SetTile { x, y, .. } | WorldOp::SetObj { x, y, .. } => (*x, *y),
        }
    }
}

fn default_tile() -> TileId {
    DEFAULT_TILE.to_string()
}

/// Tile identifiers arrive as loosely typed JSON; anything that is not a
/// string is stringified, and `null` becomes the default tile.
fn tile_value<'de, D>(deserializer: D) -> Result<TileId, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => default_tile(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}
