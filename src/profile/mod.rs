//! Button remapping, stick calibration and combos
//!
//! The profile engine sits between the router and the wire report builders:
//! every consumed input event passes through [`ProfileEngine::apply`], which
//! runs combo detection, the built-in per-target remap and (if one is active)
//! a custom profile, then mirrors the result onto the telemetry stream for
//! the configuration console.

/// Chord detection state machine
pub mod combo;

use bitfield::bitfield;
use fixed::types::I16F16;
use serde::{Deserialize, Serialize};

use crate::event::{Button, Buttons, InputEvent, AXIS_CENTER};
use crate::log::*;
use crate::telemetry::{self, TelemetrySink};
use crate::MAX_PLAYERS;

pub use combo::{ComboAction, ComboRule, Detector, MAX_RULES};

/// Number of persisted custom profile slots
pub const PROFILE_SLOTS: usize = 4;

/// Remap table length (entries beyond [`Button::ALL`] are reserved)
pub const REMAP_ENTRIES: usize = 24;

/// Remap table entry meaning "keep the source button"
pub const REMAP_NONE: u8 = 0xff;

/// Combo rules per custom profile
pub const RULES_PER_PROFILE: usize = 4;

/// Default dwell for profile-switch combos
pub const SWITCH_DWELL_MS: u16 = 2000;

bitfield! {
    /// Custom profile behavior switches
    #[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
    #[cfg_attr(test, derive(Debug))]
    pub struct ProfileFlags(u8);
    pub swap_sticks, set_swap_sticks: 0;
    pub invert_ly, set_invert_ly: 1;
    pub invert_ry, set_invert_ry: 2;
}

impl ProfileFlags {
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

/// A user-editable profile, persisted in a flash record slot
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub struct CustomProfile {
    /// Source button index to destination button index, [`REMAP_NONE`] = keep
    pub remap: [u8; REMAP_ENTRIES],
    /// Left stick sensitivity in percent
    pub sens_l: u8,
    /// Right stick sensitivity in percent
    pub sens_r: u8,
    pub flags: ProfileFlags,
    pub rule_count: u8,
    pub rules: [ComboRule; RULES_PER_PROFILE],
}

impl CustomProfile {
    const NO_RULE: ComboRule = ComboRule {
        mask: 0,
        dwell_ms: 0,
        action: ComboAction::SwitchProfile(0),
    };

    /// Profile that changes nothing
    pub const fn identity() -> Self {
        Self {
            remap: [REMAP_NONE; REMAP_ENTRIES],
            sens_l: 100,
            sens_r: 100,
            flags: ProfileFlags(0),
            rule_count: 0,
            rules: [Self::NO_RULE; RULES_PER_PROFILE],
        }
    }

    pub fn rules(&self) -> &[ComboRule] {
        let count = (self.rule_count as usize).min(RULES_PER_PROFILE);
        &self.rules[..count]
    }
}

impl Default for CustomProfile {
    fn default() -> Self {
        Self::identity()
    }
}

/// Fixed remap and combos a target applies before any custom profile
pub struct BuiltinProfile {
    pub name: &'static str,
    pub remap: &'static [(Button, Button)],
    pub combos: &'static [ComboRule],
}

/// Identity built-in, for targets without conventions of their own
pub static PASSTHROUGH: BuiltinProfile = BuiltinProfile {
    name: "default",
    remap: &[],
    combos: &[],
};

/// Post-remap controller state fed to a mode's report builder
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(Debug))]
pub struct ProfileOutput {
    pub buttons: Buttons,
    pub lx: u8,
    pub ly: u8,
    pub rx: u8,
    pub ry: u8,
    pub l2: u8,
    pub r2: u8,
    pub accel: Option<[i16; 3]>,
    pub gyro: Option<[i16; 3]>,
    pub pressure: Option<[u8; 12]>,
}

impl ProfileOutput {
    /// Unmodified copy of an input event
    pub fn passthrough(event: &InputEvent) -> Self {
        Self {
            buttons: event.buttons,
            lx: event.lx,
            ly: event.ly,
            rx: event.rx,
            ry: event.ry,
            l2: event.l2,
            r2: event.r2,
            accel: event.accel,
            gyro: event.gyro,
            pressure: event.pressure,
        }
    }
}

/// Scale one axis around the center with saturation
fn scale_axis(value: u8, percent: u8) -> u8 {
    if percent == 100 {
        return value;
    }
    let scale = I16F16::from_num(percent as i32) / 100;
    let centered = I16F16::from_num(value as i32 - AXIS_CENTER as i32);
    let scaled = (centered * scale).to_num::<i32>() + AXIS_CENTER as i32;
    scaled.clamp(0, 255) as u8
}

/// Apply a remap table built from `(src, dst)` moves to a button set
fn remap_pairs(buttons: Buttons, pairs: impl Iterator<Item = (Button, Button)>) -> Buttons {
    let mut kept = buttons.0;
    let mut moved = 0;
    for (src, dst) in pairs {
        if buttons.pressed(src) {
            kept &= !src.mask();
            moved |= dst.mask();
        }
    }
    Buttons(kept | moved)
}

/// Mapping/calibration layer between raw input events and wire reports
pub struct ProfileEngine {
    builtin: &'static BuiltinProfile,
    slots: [CustomProfile; PROFILE_SLOTS],
    active: u8,
    detectors: [Detector; MAX_PLAYERS],
    pending_save: Option<u8>,
}

impl ProfileEngine {
    const SLOT_NAMES: [&'static str; PROFILE_SLOTS] =
        ["custom-1", "custom-2", "custom-3", "custom-4"];

    pub fn new(builtin: &'static BuiltinProfile) -> Self {
        Self {
            builtin,
            slots: [CustomProfile::identity(); PROFILE_SLOTS],
            active: 0,
            detectors: [(); MAX_PLAYERS].map(|_| Detector::new()),
            pending_save: None,
        }
    }

    /// Load persisted slots and the active index
    pub fn restore(&mut self, slots: [CustomProfile; PROFILE_SLOTS], active: u8) {
        self.slots = slots;
        if (active as usize) <= PROFILE_SLOTS {
            self.active = active;
        } else {
            warn!("Persisted profile index {} out of range", active);
            self.active = 0;
        }
    }

    /// Total selectable profiles (built-in + custom slots)
    pub fn count(&self) -> u8 {
        1 + PROFILE_SLOTS as u8
    }

    /// Currently active profile index; 0 is the built-in
    pub fn active(&self) -> u8 {
        self.active
    }

    pub fn set_active(&mut self, index: u8) -> bool {
        if index < self.count() {
            if index != self.active {
                info!("Switching to profile {}", index);
            }
            self.active = index;
            true
        } else {
            warn!("Ignoring switch to unknown profile {}", index);
            false
        }
    }

    pub fn name(&self, index: u8) -> &'static str {
        match index {
            0 => self.builtin.name,
            i if (i as usize) <= PROFILE_SLOTS => Self::SLOT_NAMES[i as usize - 1],
            _ => "?",
        }
    }

    pub fn slots_mut(&mut self) -> &mut [CustomProfile; PROFILE_SLOTS] {
        &mut self.slots
    }

    /// Active profile index that a combo asked to persist, if any
    pub fn take_save_request(&mut self) -> Option<u8> {
        self.pending_save.take()
    }

    fn active_slot(&self) -> Option<&CustomProfile> {
        match self.active {
            0 => None,
            i => self.slots.get(i as usize - 1),
        }
    }

    /// Run one event through combos, built-in remap and the active custom
    /// profile, mirroring the result to the telemetry stream
    pub fn apply(
        &mut self,
        event: &InputEvent,
        now_ms: u32,
        sink: &mut dyn TelemetrySink,
    ) -> ProfileOutput {
        // Built-in rules first, custom rules after: ties resolve in favor of
        // the built-ins (first declared)
        let mut rules: heapless::Vec<ComboRule, MAX_RULES> = heapless::Vec::new();
        for rule in self.builtin.combos {
            rules.push(*rule).ok();
        }
        if let Some(slot) = self.active_slot() {
            for rule in slot.rules() {
                rules.push(*rule).ok();
            }
        }

        let detector = &mut self.detectors[event.player as usize % MAX_PLAYERS];
        let effect = detector.step(&rules, event.buttons, now_ms);
        if let Some(index) = effect.switch_to {
            if self.set_active(index) {
                self.pending_save = Some(index);
            }
        }

        let mut out = ProfileOutput::passthrough(event);
        out.buttons = Buttons((event.buttons.0 & !effect.suppress) | effect.press);
        out.buttons = remap_pairs(out.buttons, self.builtin.remap.iter().copied());

        if let Some(slot) = self.active_slot() {
            out.buttons = remap_pairs(
                out.buttons,
                slot.remap.iter().enumerate().filter_map(|(src, &dst)| {
                    Some((Button::from_index(src as u8)?, Button::from_index(dst)?))
                }),
            );

            out.lx = scale_axis(out.lx, slot.sens_l);
            out.ly = scale_axis(out.ly, slot.sens_l);
            out.rx = scale_axis(out.rx, slot.sens_r);
            out.ry = scale_axis(out.ry, slot.sens_r);

            if slot.flags.swap_sticks() {
                core::mem::swap(&mut out.lx, &mut out.rx);
                core::mem::swap(&mut out.ly, &mut out.ry);
            }
            if slot.flags.invert_ly() {
                out.ly = 255 - out.ly;
            }
            if slot.flags.invert_ry() {
                out.ry = 255 - out.ry;
            }
        }

        telemetry::publish(sink, event.player, &out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullTelemetry;

    fn engine() -> ProfileEngine {
        ProfileEngine::new(&PASSTHROUGH)
    }

    fn apply(engine: &mut ProfileEngine, event: &InputEvent, now_ms: u32) -> ProfileOutput {
        engine.apply(event, now_ms, &mut NullTelemetry)
    }

    #[test]
    fn identity_profile_is_identity() {
        let mut eng = engine();
        assert!(eng.set_active(1)); // identity custom slot
        let mut ev = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B2));
        ev.lx = 0x12;
        ev.ly = 0xf0;
        ev.rx = 0x80;
        ev.ry = 0x33;
        let out = apply(&mut eng, &ev, 0);
        assert_eq!(out.buttons, ev.buttons);
        assert_eq!(
            (out.lx, out.ly, out.rx, out.ry),
            (ev.lx, ev.ly, ev.rx, ev.ry)
        );
    }

    #[test]
    fn invert_ly() {
        let mut eng = engine();
        eng.slots_mut()[0].flags.set_invert_ly(true);
        eng.set_active(1);
        let mut ev = InputEvent::idle(0);
        ev.ly = 0x20;
        assert_eq!(apply(&mut eng, &ev, 0).ly, 0xdf);
    }

    #[test]
    fn swap_sticks() {
        let mut eng = engine();
        eng.slots_mut()[0].flags.set_swap_sticks(true);
        eng.set_active(1);
        let mut ev = InputEvent::idle(0);
        ev.lx = 0x10;
        ev.ly = 0x20;
        ev.rx = 0x30;
        ev.ry = 0x40;
        let out = apply(&mut eng, &ev, 0);
        assert_eq!((out.lx, out.ly), (0x30, 0x40));
        assert_eq!((out.rx, out.ry), (0x10, 0x20));
    }

    #[test]
    fn sensitivity_scales_around_center() {
        let mut eng = engine();
        eng.slots_mut()[0].sens_l = 50;
        eng.slots_mut()[0].sens_r = 200;
        eng.set_active(1);
        let mut ev = InputEvent::idle(0);
        ev.lx = 0x00; // full deflection, halved
        ev.ly = 0x80;
        ev.rx = 0xa0; // +0x20, doubled
        ev.ry = 0xff; // doubled, saturates
        let out = apply(&mut eng, &ev, 0);
        assert_eq!(out.lx, 0x40);
        assert_eq!(out.ly, 0x80);
        assert_eq!(out.rx, 0xc0);
        assert_eq!(out.ry, 0xff);
    }

    #[test]
    fn custom_remap_moves_buttons() {
        let mut eng = engine();
        let slot = &mut eng.slots_mut()[0];
        slot.remap[Button::B1 as usize] = Button::B4 as u8;
        eng.set_active(1);
        let ev = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1).with(Button::L1));
        let out = apply(&mut eng, &ev, 0);
        assert!(!out.buttons.pressed(Button::B1));
        assert!(out.buttons.pressed(Button::B4));
        assert!(out.buttons.pressed(Button::L1));
    }

    #[test]
    fn builtin_remap_runs_before_custom() {
        static SWAPPED: BuiltinProfile = BuiltinProfile {
            name: "swapped",
            remap: &[(Button::B1, Button::B2)],
            combos: &[],
        };
        let mut eng = ProfileEngine::new(&SWAPPED);
        // Custom moves the built-in's destination further on
        eng.slots_mut()[0].remap[Button::B2 as usize] = Button::B3 as u8;
        eng.set_active(1);
        let ev = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1));
        let out = apply(&mut eng, &ev, 0);
        assert_eq!(out.buttons, Buttons::NONE.with(Button::B3));
    }

    #[test]
    fn combo_switches_profile_and_requests_save() {
        static WITH_COMBO: BuiltinProfile = BuiltinProfile {
            name: "combo",
            remap: &[],
            combos: &[ComboRule {
                mask: Button::S1.mask() | Button::S2.mask(),
                dwell_ms: SWITCH_DWELL_MS,
                action: ComboAction::SwitchProfile(1),
            }],
        };
        let mut eng = ProfileEngine::new(&WITH_COMBO);
        let held = InputEvent::with_buttons(0, Buttons::NONE.with(Button::S1).with(Button::S2));

        let out = apply(&mut eng, &held, 0);
        assert_eq!(eng.active(), 0);
        assert_eq!(out.buttons, held.buttons);

        let out = apply(&mut eng, &held, SWITCH_DWELL_MS as u32);
        assert_eq!(eng.active(), 1);
        assert!(out.buttons.is_empty(), "fired chord must be suppressed");
        assert_eq!(eng.take_save_request(), Some(1));
        assert_eq!(eng.take_save_request(), None);
    }

    #[test]
    fn combo_synthesizes_button() {
        let mut eng = engine();
        let slot = &mut eng.slots_mut()[0];
        slot.rule_count = 1;
        slot.rules[0] = ComboRule {
            mask: Button::L1.mask() | Button::R1.mask(),
            dwell_ms: 0,
            action: ComboAction::Press(Button::A1),
        };
        eng.set_active(1);
        let held = InputEvent::with_buttons(0, Buttons::NONE.with(Button::L1).with(Button::R1));
        let out = apply(&mut eng, &held, 0);
        assert_eq!(out.buttons, Buttons::NONE.with(Button::A1));
    }

    #[test]
    fn motion_and_pressure_pass_through() {
        let mut eng = engine();
        eng.set_active(1);
        let mut ev = InputEvent::idle(0);
        ev.accel = Some([1, -2, 3]);
        ev.gyro = Some([-4, 5, -6]);
        ev.pressure = Some([7; 12]);
        let out = apply(&mut eng, &ev, 0);
        assert_eq!(out.accel, ev.accel);
        assert_eq!(out.gyro, ev.gyro);
        assert_eq!(out.pressure, ev.pressure);
    }

    #[test]
    fn restore_rejects_out_of_range_index() {
        let mut eng = engine();
        eng.restore([CustomProfile::identity(); PROFILE_SLOTS], 9);
        assert_eq!(eng.active(), 0);
    }
}
