//! Xbox 360 XInput mode
//!
//! Not HID: the 360 controller is a vendor-specific class (0xff/0x5d/0x01)
//! with its own undocumented interface descriptor, and Windows matches it by
//! the MS OS 1.0 "XUSB10" compatible id served through vendor control
//! requests (see [`crate::usbd::class::XInputClass`]). The d-pad stays four
//! independent bits on this wire instead of a hat.

use crate::event::Button;
use crate::feedback::OutputFeedback;
use crate::profile::ProfileOutput;
use crate::usbd::mode::{ClassKind, DeviceIdentity, DeviceMode, ModeId};

pub const REPORT_LEN: usize = 20;

static IDENTITY: DeviceIdentity = DeviceIdentity {
    vid: 0x045e,
    pid: 0x028e,
    device_class: 0xff,
    device_sub_class: 0xff,
    device_protocol: 0xff,
    device_release: 0x0114,
    usb_release: 0x0200,
    manufacturer: "©Microsoft Corporation",
    product: "Controller",
    max_power_ma: 500,
};

// Byte 2 of the report
const DPAD_UP: u8 = 0x01;
const DPAD_DOWN: u8 = 0x02;
const DPAD_LEFT: u8 = 0x04;
const DPAD_RIGHT: u8 = 0x08;
const START: u8 = 0x10;
const BACK: u8 = 0x20;
const STICK_L: u8 = 0x40;
const STICK_R: u8 = 0x80;

// Byte 3 of the report
const BUMPER_L: u8 = 0x01;
const BUMPER_R: u8 = 0x02;
const GUIDE: u8 = 0x04;
const BTN_A: u8 = 0x10;
const BTN_B: u8 = 0x20;
const BTN_X: u8 = 0x40;
const BTN_Y: u8 = 0x80;

/// 0..255 axis to the signed 16-bit wire range, optionally flipped (the 360
/// wire counts Y up as positive)
fn axis(value: u8, invert: bool) -> i16 {
    let centered = (value as i16) - 0x80;
    let centered = if invert {
        centered.saturating_neg().min(127)
    } else {
        centered
    };
    centered.saturating_mul(256)
}

pub struct XInputMode {
    rumble: (u8, u8),
    led_player: u8,
    dirty: bool,
}

impl XInputMode {
    pub fn new() -> Self {
        Self {
            rumble: (0, 0),
            led_player: 0,
            dirty: false,
        }
    }
}

impl Default for XInputMode {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMode for XInputMode {
    fn id(&self) -> ModeId {
        ModeId::XInput
    }

    fn identity(&self) -> &'static DeviceIdentity {
        &IDENTITY
    }

    fn class(&self) -> ClassKind {
        ClassKind::XInputVendor
    }

    fn report_descriptor(&self) -> &'static [u8] {
        // Vendor class, no HID report descriptor on the wire
        &[]
    }

    fn report_len(&self) -> usize {
        REPORT_LEN
    }

    fn build_report(&mut self, _player: u8, state: &ProfileOutput, buf: &mut [u8]) -> Option<usize> {
        let buttons = state.buttons;
        let mut b0 = 0;
        let mut b1 = 0;
        for (button, bit) in [
            (Button::DpadUp, DPAD_UP),
            (Button::DpadDown, DPAD_DOWN),
            (Button::DpadLeft, DPAD_LEFT),
            (Button::DpadRight, DPAD_RIGHT),
            (Button::S2, START),
            (Button::S1, BACK),
            (Button::L3, STICK_L),
            (Button::R3, STICK_R),
        ] {
            if buttons.pressed(button) {
                b0 |= bit;
            }
        }
        for (button, bit) in [
            (Button::L1, BUMPER_L),
            (Button::R1, BUMPER_R),
            (Button::A1, GUIDE),
            (Button::B1, BTN_A),
            (Button::B2, BTN_B),
            (Button::B3, BTN_X),
            (Button::B4, BTN_Y),
        ] {
            if buttons.pressed(button) {
                b1 |= bit;
            }
        }

        // Digital trigger presses count as full pull even without analog data
        let lt = state.l2.max(if buttons.pressed(Button::L2) { 0xff } else { 0 });
        let rt = state.r2.max(if buttons.pressed(Button::R2) { 0xff } else { 0 });

        let report = &mut buf[..REPORT_LEN];
        report.fill(0);
        report[0] = 0x00; // message type: input
        report[1] = REPORT_LEN as u8;
        report[2] = b0;
        report[3] = b1;
        report[4] = lt;
        report[5] = rt;
        report[6..8].copy_from_slice(&axis(state.lx, false).to_le_bytes());
        report[8..10].copy_from_slice(&axis(state.ly, true).to_le_bytes());
        report[10..12].copy_from_slice(&axis(state.rx, false).to_le_bytes());
        report[12..14].copy_from_slice(&axis(state.ry, true).to_le_bytes());
        Some(REPORT_LEN)
    }

    fn handle_output(&mut self, _report_id: u8, data: &[u8]) {
        match data {
            // Rumble: [0x00, 0x08, _, left, right, ...]
            [0x00, 0x08, _, left, right, ..] => {
                self.rumble = (*left, *right);
                self.dirty = true;
            }
            // Player LED: [0x01, 0x03, pattern]; patterns 2..=5 are the
            // steady per-player states, 6..=9 the blinking ones
            [0x01, 0x03, pattern, ..] => {
                self.led_player = match pattern {
                    2..=5 => pattern - 2,
                    6..=9 => pattern - 6,
                    _ => 0,
                };
                self.dirty = true;
            }
            _ => {}
        }
    }

    fn feedback(&mut self) -> Option<OutputFeedback> {
        let feedback = OutputFeedback {
            rumble_left: self.rumble.0,
            rumble_right: self.rumble.1,
            led_player: self.led_player,
            led: rgb::RGB8::default(),
            dirty: self.dirty,
        };
        self.dirty = false;
        Some(feedback)
    }

    fn rumble(&self) -> Option<(u8, u8)> {
        Some(self.rumble)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Buttons, InputEvent};

    fn build(state: &ProfileOutput) -> ([u8; REPORT_LEN], XInputMode) {
        let mut mode = XInputMode::new();
        let mut buf = [0u8; 32];
        let len = mode.build_report(0, state, &mut buf).unwrap();
        assert_eq!(len, REPORT_LEN);
        (buf[..REPORT_LEN].try_into().unwrap(), mode)
    }

    #[test]
    fn dpad_stays_four_bits() {
        let state = ProfileOutput::passthrough(&InputEvent::with_buttons(
            0,
            Buttons::NONE.with(Button::DpadUp).with(Button::DpadRight),
        ));
        let (report, _) = build(&state);
        assert_eq!(report[2], DPAD_UP | DPAD_RIGHT);
    }

    #[test]
    fn face_buttons_use_360_layout() {
        let state = ProfileOutput::passthrough(&InputEvent::with_buttons(
            0,
            Buttons::NONE.with(Button::B1).with(Button::B4),
        ));
        let (report, _) = build(&state);
        assert_eq!(report[3], BTN_A | BTN_Y);
    }

    #[test]
    fn centered_sticks_are_zero() {
        let state = ProfileOutput::passthrough(&InputEvent::idle(0));
        let (report, _) = build(&state);
        assert_eq!(&report[6..14], &[0; 8]);
    }

    #[test]
    fn stick_up_is_positive_y() {
        let mut ev = InputEvent::idle(0);
        ev.ly = 0x00; // pushed fully up
        let (report, _) = build(&ProfileOutput::passthrough(&ev));
        let y = i16::from_le_bytes([report[8], report[9]]);
        assert!(y > 30000, "up must map to a large positive Y, got {}", y);
    }

    #[test]
    fn digital_trigger_press_is_full_pull() {
        let state = ProfileOutput::passthrough(&InputEvent::with_buttons(
            0,
            Buttons::NONE.with(Button::L2),
        ));
        let (report, _) = build(&state);
        assert_eq!(report[4], 0xff);
        assert_eq!(report[5], 0x00);
    }

    #[test]
    fn rumble_output_report_sets_feedback_once() {
        let mut mode = XInputMode::new();
        mode.handle_output(0, &[0x00, 0x08, 0x00, 0xaa, 0x55, 0, 0, 0]);
        let feedback = mode.feedback().unwrap();
        assert!(feedback.dirty);
        assert_eq!((feedback.rumble_left, feedback.rumble_right), (0xaa, 0x55));
        // Dirty clears on read
        assert!(!mode.feedback().unwrap().dirty);
    }

    #[test]
    fn led_pattern_maps_to_player() {
        let mut mode = XInputMode::new();
        mode.handle_output(0, &[0x01, 0x03, 0x03]);
        assert_eq!(mode.feedback().unwrap().led_player, 1);
        mode.handle_output(0, &[0x01, 0x03, 0x08]);
        assert_eq!(mode.feedback().unwrap().led_player, 2);
    }
}
