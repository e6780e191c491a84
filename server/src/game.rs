use log::debug;
use shared::{PlayerState, Slot, MAX_PLAYERS};

/// Authoritative player positions.
///
/// Both slots exist for the whole process lifetime; a slot's position
/// survives its connection going away and is inherited by the next holder.
#[derive(Debug, Clone)]
pub struct GameState {
    pub tick: u64,
    players: [PlayerState; MAX_PLAYERS],
}

impl GameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            players: Slot::ALL.map(PlayerState::spawn),
        }
    }

    pub fn players(&self) -> &[PlayerState] {
        &self.players
    }

    pub fn player(&self, slot: Slot) -> &PlayerState {
        &self.players[slot.index()]
    }

    /// Moves a player to an absolute position reported by its client.
    ///
    /// Non-finite coordinates are ignored and leave the position unchanged.
    pub fn move_player(&mut self, slot: Slot, x: f32, y: f32) -> bool {
        if !x.is_finite() || !y.is_finite() {
            debug!("Ignoring non-finite move for {}", slot);
            return false;
        }

        let player = &mut self.players[slot.index()];
        player.x = x;
        player.y = y;
        true
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}
