//! Per-player bookkeeping
//!
//! Tracks which player slots are live based on event activity. Inputs do not
//! announce attach/detach explicitly; a player is connected while its events
//! keep flowing and expires after a quiet period.

use crate::log::*;
use crate::MAX_PLAYERS;

/// Idle time after which a player counts as disconnected
pub const PLAYER_TIMEOUT_MS: u32 = 5000;

#[derive(Clone, Copy, Default)]
struct PlayerState {
    connected: bool,
    last_seen_ms: u32,
}

pub struct PlayerManager {
    players: [PlayerState; MAX_PLAYERS],
}

impl Default for PlayerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerManager {
    pub const fn new() -> Self {
        Self {
            players: [PlayerState {
                connected: false,
                last_seen_ms: 0,
            }; MAX_PLAYERS],
        }
    }

    /// Record activity on a player slot
    pub fn note_event(&mut self, player: u8, now_ms: u32) {
        let Some(state) = self.players.get_mut(player as usize) else {
            return;
        };
        if !state.connected {
            info!("Player {} connected", player + 1);
        }
        state.connected = true;
        state.last_seen_ms = now_ms;
    }

    /// Expire idle players; one scheduler stage per tick
    pub fn task(&mut self, now_ms: u32) {
        for (index, state) in self.players.iter_mut().enumerate() {
            if state.connected && now_ms.wrapping_sub(state.last_seen_ms) > PLAYER_TIMEOUT_MS {
                info!("Player {} idle, disconnecting", index + 1);
                state.connected = false;
            }
        }
    }

    pub fn is_connected(&self, player: u8) -> bool {
        self.players
            .get(player as usize)
            .map(|p| p.connected)
            .unwrap_or(false)
    }

    pub fn count(&self) -> u8 {
        self.players.iter().filter(|p| p.connected).count() as u8
    }

    /// LED index assigned to a player (identity mapping on this board)
    pub fn led_index(&self, player: u8) -> usize {
        player as usize % MAX_PLAYERS
    }
}
