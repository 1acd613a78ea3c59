//! Compiled-in defaults
//!
//! Everything a board ships with before the flash record overrides it:
//! the Switch identity choice, the built-in profile with its hotkey combos
//! and the player LED palette. Build-time options (features and the PIO-USB
//! pin override) surface here too, so the rest of the code reads plain
//! values instead of sprinkling `cfg!` everywhere.

use rgb::RGB8;

use crate::event::Button;
use crate::profile::{BuiltinProfile, ComboAction, ComboRule, SWITCH_DWELL_MS};
use crate::usbd::modes::switch::SwitchIdentity;
use crate::MAX_PLAYERS;

pub struct Config {
    /// Which known-good identity the Switch mode presents
    pub switch_identity: SwitchIdentity,
    /// Built-in profile applied in front of any custom profile
    pub usb_profile: &'static BuiltinProfile,
    pub player_colors: [RGB8; MAX_PLAYERS],
    /// PIO USB host port compiled in (`usb-host` feature)
    pub usb_host: bool,
    /// Bluetooth input transport compiled in (`btstack` feature)
    pub btstack: bool,
}

const fn chord(a: Button, b: Button, c: Button) -> u32 {
    a.mask() | b.mask() | c.mask()
}

/// Hold Select+Start plus a d-pad direction to switch profiles
static USB_PROFILE: BuiltinProfile = BuiltinProfile {
    name: "default",
    remap: &[],
    combos: &[
        ComboRule {
            mask: chord(Button::S1, Button::S2, Button::DpadLeft),
            dwell_ms: SWITCH_DWELL_MS,
            action: ComboAction::SwitchProfile(0),
        },
        ComboRule {
            mask: chord(Button::S1, Button::S2, Button::DpadUp),
            dwell_ms: SWITCH_DWELL_MS,
            action: ComboAction::SwitchProfile(1),
        },
        ComboRule {
            mask: chord(Button::S1, Button::S2, Button::DpadRight),
            dwell_ms: SWITCH_DWELL_MS,
            action: ComboAction::SwitchProfile(2),
        },
        ComboRule {
            mask: chord(Button::S1, Button::S2, Button::DpadDown),
            dwell_ms: SWITCH_DWELL_MS,
            action: ComboAction::SwitchProfile(3),
        },
    ],
};

pub static CONFIG: Config = Config {
    switch_identity: SwitchIdentity::Horipad,
    usb_profile: &USB_PROFILE,
    player_colors: [
        RGB8::new(0, 0, 64),
        RGB8::new(64, 0, 0),
        RGB8::new(0, 64, 0),
        RGB8::new(64, 0, 64),
    ],
    usb_host: cfg!(feature = "usb-host"),
    btstack: cfg!(feature = "btstack"),
};
