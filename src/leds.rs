//! Status and player LED service
//!
//! Produces one RGB frame per tick: a status LED carrying the connection
//! heartbeat and active-profile indicator blinks, plus one LED per player
//! slot colored from the player palette or from host feedback. The physical
//! WS2812 chain is driven by the board support layer; this module only
//! computes colors.

use rgb::RGB8;

use crate::player::PlayerManager;
use crate::MAX_PLAYERS;

/// Index of the status LED in the frame
pub const STATUS_LED: usize = 0;
/// Status LED + one per player
pub const NLEDS: usize = 1 + MAX_PLAYERS;

/// Breathing period while USB is not up
const HEARTBEAT_PERIOD_MS: u32 = 3000;
/// Half-period of a profile indicator blink
const BLINK_MS: u32 = 150;

const OFF: RGB8 = RGB8::new(0, 0, 0);
/// Amber breathing color while disconnected
const IDLE_COLOR: RGB8 = RGB8::new(251, 188, 0);
/// Steady color once the host configured us
const CONNECTED_COLOR: RGB8 = RGB8::new(0, 80, 0);
/// Profile indicator blink color
const PROFILE_COLOR: RGB8 = RGB8::new(0, 0, 255);

fn scale(color: RGB8, level: u8) -> RGB8 {
    let mul = |c: u8| ((c as u16 * level as u16) / 255) as u8;
    RGB8::new(mul(color.r), mul(color.g), mul(color.b))
}

/// Triangle wave in `0..=255` over `period` milliseconds
fn triangle(now_ms: u32, period: u32) -> u8 {
    let phase = now_ms % period;
    let half = period / 2;
    if phase < half {
        (phase * 255 / half) as u8
    } else {
        ((period - phase) * 255 / half) as u8
    }
}

pub struct LedService {
    frame: [RGB8; NLEDS],
    player_colors: [RGB8; MAX_PLAYERS],
    /// Host-driven color overrides (e.g. a lightbar color)
    overrides: [Option<RGB8>; MAX_PLAYERS],
    last_profile: u8,
    /// Active blink sequence: remaining half-periods and its start time
    blink: Option<(u8, u32)>,
}

impl Default for LedService {
    fn default() -> Self {
        Self::new()
    }
}

impl LedService {
    pub fn new() -> Self {
        Self {
            frame: [OFF; NLEDS],
            player_colors: crate::config::CONFIG.player_colors,
            overrides: [None; MAX_PLAYERS],
            last_profile: 0,
            blink: None,
        }
    }

    /// Host feedback wants a player LED color
    pub fn set_player_color(&mut self, player: u8, color: RGB8) {
        if let Some(slot) = self.overrides.get_mut(player as usize) {
            *slot = Some(color);
        }
    }

    /// Recompute the frame; one scheduler stage per tick
    pub fn tick(&mut self, now_ms: u32, usb_on: bool, active_profile: u8, players: &PlayerManager) {
        // A profile switch announces itself with (index + 1) blinks
        if active_profile != self.last_profile {
            self.last_profile = active_profile;
            self.blink = Some(((active_profile + 1) * 2, now_ms));
        }

        self.frame[STATUS_LED] = match self.blink {
            Some((halves, start)) => {
                let step = now_ms.wrapping_sub(start) / BLINK_MS;
                if step >= halves as u32 {
                    self.blink = None;
                    self.status_heartbeat(now_ms, usb_on)
                } else if step % 2 == 0 {
                    PROFILE_COLOR
                } else {
                    OFF
                }
            }
            None => self.status_heartbeat(now_ms, usb_on),
        };

        for player in 0..MAX_PLAYERS {
            let led = 1 + players.led_index(player as u8);
            self.frame[led] = match self.overrides[player] {
                Some(color) => color,
                None if players.is_connected(player as u8) => self.player_colors[player],
                None => OFF,
            };
        }
    }

    fn status_heartbeat(&self, now_ms: u32, usb_on: bool) -> RGB8 {
        if usb_on {
            CONNECTED_COLOR
        } else {
            scale(IDLE_COLOR, triangle(now_ms, HEARTBEAT_PERIOD_MS))
        }
    }

    /// Colors to push to the LED chain this tick
    pub fn frame(&self) -> &[RGB8; NLEDS] {
        &self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_status_is_steady() {
        let mut leds = LedService::new();
        let players = PlayerManager::new();
        leds.tick(0, true, 0, &players);
        let first = leds.frame()[STATUS_LED];
        leds.tick(777, true, 0, &players);
        assert_eq!(leds.frame()[STATUS_LED], first);
        assert_eq!(first, CONNECTED_COLOR);
    }

    #[test]
    fn disconnected_status_breathes() {
        let mut leds = LedService::new();
        let players = PlayerManager::new();
        leds.tick(0, false, 0, &players);
        let dark = leds.frame()[STATUS_LED];
        leds.tick(HEARTBEAT_PERIOD_MS / 2, false, 0, &players);
        let bright = leds.frame()[STATUS_LED];
        assert_eq!(dark, OFF);
        assert_eq!(bright, IDLE_COLOR);
    }

    #[test]
    fn profile_switch_blinks_index_plus_one_times() {
        let mut leds = LedService::new();
        let players = PlayerManager::new();
        leds.tick(0, true, 0, &players);

        // Switch to profile 1: two blinks, four half-periods
        leds.tick(1000, true, 1, &players);
        assert_eq!(leds.frame()[STATUS_LED], PROFILE_COLOR);
        leds.tick(1000 + BLINK_MS, true, 1, &players);
        assert_eq!(leds.frame()[STATUS_LED], OFF);
        leds.tick(1000 + 2 * BLINK_MS, true, 1, &players);
        assert_eq!(leds.frame()[STATUS_LED], PROFILE_COLOR);
        leds.tick(1000 + 3 * BLINK_MS, true, 1, &players);
        assert_eq!(leds.frame()[STATUS_LED], OFF);

        // Sequence over, back to the steady connected color
        leds.tick(1000 + 4 * BLINK_MS, true, 1, &players);
        assert_eq!(leds.frame()[STATUS_LED], CONNECTED_COLOR);
    }

    #[test]
    fn player_leds_follow_connection_and_feedback() {
        let mut leds = LedService::new();
        let mut players = PlayerManager::new();
        players.note_event(1, 0);

        leds.tick(0, true, 0, &players);
        assert_eq!(leds.frame()[1], OFF);
        assert_eq!(leds.frame()[2], crate::config::CONFIG.player_colors[1]);

        leds.set_player_color(0, RGB8::new(10, 20, 30));
        leds.tick(1, true, 0, &players);
        assert_eq!(leds.frame()[1], RGB8::new(10, 20, 30));
    }
}
