//! Keyboard + mouse composite mode
//!
//! One HID interface with two numbered reports: a keyboard report built from
//! the mapped buttons and a relative mouse report derived from stick
//! deflection. The mouse report is also emitted as the idle report each tick
//! so holding a stick keeps the pointer moving even when no new input event
//! arrives.

use crate::event::{Button, AXIS_CENTER};
use crate::profile::ProfileOutput;
use crate::usbd::mode::{ClassKind, DeviceIdentity, DeviceMode, ModeId};

pub const KEYBOARD_REPORT_ID: u8 = 1;
pub const MOUSE_REPORT_ID: u8 = 2;

/// id + modifiers + reserved + 6 keycodes
pub const KEYBOARD_REPORT_LEN: usize = 9;
/// id + buttons + dx + dy
pub const MOUSE_REPORT_LEN: usize = 4;

/// Stick deflection divider for pointer speed
const MOUSE_DIVIDER: i16 = 8;

#[rustfmt::skip]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    // Keyboard
    0x05, 0x01,        // Usage Page (Generic Desktop)
    0x09, 0x06,        // Usage (Keyboard)
    0xa1, 0x01,        // Collection (Application)
    0x85, KEYBOARD_REPORT_ID,
    0x05, 0x07,        //   Usage Page (Key Codes)
    0x19, 0xe0,        //   Usage Minimum (LCtrl)
    0x29, 0xe7,        //   Usage Maximum (RGui)
    0x15, 0x00,        //   Logical Minimum (0)
    0x25, 0x01,        //   Logical Maximum (1)
    0x75, 0x01,        //   Report Size (1)
    0x95, 0x08,        //   Report Count (8)
    0x81, 0x02,        //   Input (Data,Var,Abs), modifiers
    0x95, 0x01,        //   Report Count (1)
    0x75, 0x08,        //   Report Size (8)
    0x81, 0x01,        //   Input (Const), reserved
    0x95, 0x06,        //   Report Count (6)
    0x75, 0x08,        //   Report Size (8)
    0x15, 0x00,        //   Logical Minimum (0)
    0x25, 0x65,        //   Logical Maximum (101)
    0x05, 0x07,        //   Usage Page (Key Codes)
    0x19, 0x00,        //   Usage Minimum (0)
    0x29, 0x65,        //   Usage Maximum (101)
    0x81, 0x00,        //   Input (Data,Array)
    0xc0,              // End Collection
    // Mouse
    0x05, 0x01,        // Usage Page (Generic Desktop)
    0x09, 0x02,        // Usage (Mouse)
    0xa1, 0x01,        // Collection (Application)
    0x85, MOUSE_REPORT_ID,
    0x09, 0x01,        //   Usage (Pointer)
    0xa1, 0x00,        //   Collection (Physical)
    0x05, 0x09,        //     Usage Page (Button)
    0x19, 0x01,        //     Usage Minimum (Button 1)
    0x29, 0x03,        //     Usage Maximum (Button 3)
    0x15, 0x00,        //     Logical Minimum (0)
    0x25, 0x01,        //     Logical Maximum (1)
    0x95, 0x03,        //     Report Count (3)
    0x75, 0x01,        //     Report Size (1)
    0x81, 0x02,        //     Input (Data,Var,Abs)
    0x95, 0x01,        //     Report Count (1)
    0x75, 0x05,        //     Report Size (5)
    0x81, 0x01,        //     Input (Const), pad
    0x05, 0x01,        //     Usage Page (Generic Desktop)
    0x09, 0x30,        //     Usage (X)
    0x09, 0x31,        //     Usage (Y)
    0x15, 0x81,        //     Logical Minimum (-127)
    0x25, 0x7f,        //     Logical Maximum (127)
    0x75, 0x08,        //     Report Size (8)
    0x95, 0x02,        //     Report Count (2)
    0x81, 0x06,        //     Input (Data,Var,Rel)
    0xc0,              //   End Collection
    0xc0,              // End Collection
];

static IDENTITY: DeviceIdentity = DeviceIdentity {
    // VOTI free pair recognised as a keyboard, like the composite it is
    vid: 0x16c0,
    pid: 0x27db,
    device_class: 0,
    device_sub_class: 0,
    device_protocol: 0,
    device_release: 0x0100,
    usb_release: 0x0200,
    manufacturer: "padbridge",
    product: "padbridge kb/mouse",
    max_power_ma: 100,
};

/// Buttons that type keys (HID usage ids from the keyboard page)
#[rustfmt::skip]
const KEYMAP: [(Button, u8); 10] = [
    (Button::DpadUp,    0x52), // Up Arrow
    (Button::DpadDown,  0x51), // Down Arrow
    (Button::DpadLeft,  0x50), // Left Arrow
    (Button::DpadRight, 0x4f), // Right Arrow
    (Button::B1,        0x1d), // Z
    (Button::B2,        0x1b), // X
    (Button::B3,        0x06), // C
    (Button::B4,        0x19), // V
    (Button::S1,        0x29), // Escape
    (Button::S2,        0x28), // Enter
];

fn mouse_delta(value: u8) -> i8 {
    (((value as i16) - AXIS_CENTER as i16) / MOUSE_DIVIDER) as i8
}

pub struct KbMouseMode {
    /// Stick/button state from the last event, driving the idle mouse report
    dx: i8,
    dy: i8,
    mouse_buttons: u8,
    /// Keyboard LED bits last written by the host
    host_leds: u8,
}

impl KbMouseMode {
    pub fn new() -> Self {
        Self {
            dx: 0,
            dy: 0,
            mouse_buttons: 0,
            host_leds: 0,
        }
    }

    pub fn host_leds(&self) -> u8 {
        self.host_leds
    }

    fn mouse_report(&self, buf: &mut [u8]) -> usize {
        buf[0] = MOUSE_REPORT_ID;
        buf[1] = self.mouse_buttons;
        buf[2] = self.dx as u8;
        buf[3] = self.dy as u8;
        MOUSE_REPORT_LEN
    }
}

impl Default for KbMouseMode {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMode for KbMouseMode {
    fn id(&self) -> ModeId {
        ModeId::KbMouse
    }

    fn identity(&self) -> &'static DeviceIdentity {
        &IDENTITY
    }

    fn class(&self) -> ClassKind {
        ClassKind::Hid { out_endpoint: false }
    }

    fn report_descriptor(&self) -> &'static [u8] {
        REPORT_DESCRIPTOR
    }

    fn report_len(&self) -> usize {
        KEYBOARD_REPORT_LEN
    }

    fn build_report(&mut self, _player: u8, state: &ProfileOutput, buf: &mut [u8]) -> Option<usize> {
        // Track pointer state for the idle report
        self.dx = mouse_delta(state.lx);
        self.dy = mouse_delta(state.ly);
        self.mouse_buttons = (state.buttons.pressed(Button::L3) as u8)
            | ((state.buttons.pressed(Button::R3) as u8) << 1);

        let report = &mut buf[..KEYBOARD_REPORT_LEN];
        report.fill(0);
        report[0] = KEYBOARD_REPORT_ID;
        let mut next = 3;
        for (button, usage) in KEYMAP {
            if state.buttons.pressed(button) && next < KEYBOARD_REPORT_LEN {
                report[next] = usage;
                next += 1;
            }
        }
        Some(KEYBOARD_REPORT_LEN)
    }

    fn idle_report(&mut self, buf: &mut [u8]) -> Option<usize> {
        Some(self.mouse_report(buf))
    }

    fn handle_output(&mut self, report_id: u8, data: &[u8]) {
        // Keyboard LED state (num/caps/scroll lock)
        if report_id == KEYBOARD_REPORT_ID {
            if let Some(leds) = data.first() {
                self.host_leds = *leds;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Buttons, InputEvent};

    #[test]
    fn buttons_type_mapped_keys() {
        let mut mode = KbMouseMode::new();
        let state = ProfileOutput::passthrough(&InputEvent::with_buttons(
            0,
            Buttons::NONE.with(Button::DpadUp).with(Button::S2),
        ));
        let mut buf = [0u8; 16];
        let len = mode.build_report(0, &state, &mut buf).unwrap();
        assert_eq!(len, KEYBOARD_REPORT_LEN);
        assert_eq!(buf[0], KEYBOARD_REPORT_ID);
        assert_eq!(&buf[3..5], &[0x52, 0x28]);
        assert_eq!(&buf[5..9], &[0; 4]);
    }

    #[test]
    fn idle_report_keeps_pointer_moving() {
        let mut mode = KbMouseMode::new();
        let mut ev = InputEvent::idle(0);
        ev.lx = 0xff; // full right
        ev.ly = 0x00; // full up
        let state = ProfileOutput::passthrough(&ev);
        let mut buf = [0u8; 16];
        mode.build_report(0, &state, &mut buf).unwrap();

        // No further events: the idle report still carries the motion
        let mut idle = [0u8; 8];
        let len = mode.idle_report(&mut idle).unwrap();
        assert_eq!(len, MOUSE_REPORT_LEN);
        assert_eq!(idle[0], MOUSE_REPORT_ID);
        assert!((idle[2] as i8) > 0, "right deflection moves +x");
        assert!((idle[3] as i8) < 0, "up deflection moves -y");
    }

    #[test]
    fn idle_mouse_report_flows_without_any_event() {
        let mut mode = KbMouseMode::new();
        let mut buf = [0u8; 8];
        let len = mode.idle_report(&mut buf).unwrap();
        assert_eq!(&buf[..len], &[MOUSE_REPORT_ID, 0, 0, 0]);
    }

    #[test]
    fn stick_clicks_are_mouse_buttons() {
        let mut mode = KbMouseMode::new();
        let state = ProfileOutput::passthrough(&InputEvent::with_buttons(
            0,
            Buttons::NONE.with(Button::L3).with(Button::R3),
        ));
        let mut buf = [0u8; 16];
        mode.build_report(0, &state, &mut buf).unwrap();
        let mut idle = [0u8; 8];
        mode.idle_report(&mut idle).unwrap();
        assert_eq!(idle[1], 0b11);
    }

    #[test]
    fn host_led_output_is_recorded() {
        let mut mode = KbMouseMode::new();
        mode.handle_output(KEYBOARD_REPORT_ID, &[0x02]);
        assert_eq!(mode.host_leds(), 0x02);
    }
}
