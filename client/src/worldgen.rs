//! Procedural starting world proposed when the server has none yet.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use shared::WorldPayload;

pub const TREE_HP: u64 = 3;
pub const ROCK_HP: u64 = 2;

/// Generates a `width` x `height` world. The same seed always yields the same
/// world.
pub fn generate_world(seed: u64, width: usize, height: usize) -> WorldPayload {
    let mut rng = StdRng::seed_from_u64(seed);
    let width = width.max(1);
    let height = height.max(1);

    let mut tiles = Vec::with_capacity(height);
    let mut objects = Vec::with_capacity(height);

    for _ in 0..height {
        let mut tile_row = Vec::with_capacity(width);
        let mut object_row = Vec::with_capacity(width);

        for _ in 0..width {
            let tile = match rng.gen_range(0..100) {
                0..=69 => "grass",
                70..=79 => "dirt",
                80..=89 => "sand",
                _ => "water",
            };

            let object = if tile == "grass" {
                match rng.gen_range(0..100) {
                    0..=11 => tree(),
                    12..=15 => rock(),
                    _ => Value::Null,
                }
            } else {
                Value::Null
            };

            tile_row.push(tile.to_string());
            object_row.push(object);
        }

        tiles.push(tile_row);
        objects.push(object_row);
    }

    WorldPayload { tiles, objects }
}

pub fn tree() -> Value {
    json!({"type": "tree", "hp": TREE_HP})
}

pub fn rock() -> Value {
    json!({"type": "rock", "hp": ROCK_HP})
}

pub fn fence() -> Value {
    json!({"type": "fence"})
}

pub fn is_tree(object: &Value) -> bool {
    object.get("type").and_then(Value::as_str) == Some("tree")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_world_is_valid_and_rectangular() {
        let world = generate_world(7, 12, 9);

        assert!(world.validate().is_ok());
        assert_eq!(world.dimensions(), (12, 9));
        assert!(world.tiles.iter().all(|row| row.len() == 12));
        assert_eq!(world.objects.len(), 9);
        assert!(world.objects.iter().all(|row| row.len() == 12));
    }

    #[test]
    fn test_generation_is_deterministic() {
        assert_eq!(generate_world(42, 16, 16), generate_world(42, 16, 16));
        assert_ne!(generate_world(1, 16, 16), generate_world(2, 16, 16));
    }

    #[test]
    fn test_objects_only_on_grass() {
        let world = generate_world(3, 32, 32);
        for (y, row) in world.objects.iter().enumerate() {
            for (x, object) in row.iter().enumerate() {
                if !object.is_null() {
                    assert_eq!(world.tile(x, y), Some("grass"));
                }
            }
        }
    }

    #[test]
    fn test_zero_dimensions_clamped() {
        let world = generate_world(0, 0, 0);
        assert_eq!(world.dimensions(), (1, 1));
    }

    #[test]
    fn test_tree_detection() {
        assert!(is_tree(&tree()));
        assert!(!is_tree(&rock()));
        assert!(!is_tree(&Value::Null));
    }
}
