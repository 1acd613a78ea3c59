//! Switch Pro Controller mode
//!
//! Speaks the plain USB HID dialect understood by the console dock (the
//! HORI fight-stick protocol, not the full Joy-Con feature report stack):
//! an 8-byte input report with 14 buttons, a hat and four axes. Several
//! different identities are known to work and consoles are picky about the
//! pairing, so the VID/PID is a configuration choice instead of a
//! hard-coded constant.

use packed_struct::prelude::*;

use crate::event::Button;
use crate::profile::ProfileOutput;
use crate::usbd::mode::{dpad_to_hat, ClassKind, DeviceIdentity, DeviceMode, ModeId};

#[rustfmt::skip]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01,        // Usage Page (Generic Desktop)
    0x09, 0x05,        // Usage (Gamepad)
    0xa1, 0x01,        // Collection (Application)
    0x15, 0x00,        //   Logical Minimum (0)
    0x25, 0x01,        //   Logical Maximum (1)
    0x35, 0x00,        //   Physical Minimum (0)
    0x45, 0x01,        //   Physical Maximum (1)
    0x75, 0x01,        //   Report Size (1)
    0x95, 0x10,        //   Report Count (16)
    0x05, 0x09,        //   Usage Page (Button)
    0x19, 0x01,        //   Usage Minimum (Button 1)
    0x29, 0x10,        //   Usage Maximum (Button 16)
    0x81, 0x02,        //   Input (Data,Var,Abs)
    0x05, 0x01,        //   Usage Page (Generic Desktop)
    0x25, 0x07,        //   Logical Maximum (7)
    0x46, 0x3b, 0x01,  //   Physical Maximum (315)
    0x75, 0x04,        //   Report Size (4)
    0x95, 0x01,        //   Report Count (1)
    0x65, 0x14,        //   Unit (Degrees)
    0x09, 0x39,        //   Usage (Hat Switch)
    0x81, 0x42,        //   Input (Data,Var,Abs,Null)
    0x65, 0x00,        //   Unit (None)
    0x95, 0x01,        //   Report Count (1), pad nibble
    0x81, 0x01,        //   Input (Const)
    0x26, 0xff, 0x00,  //   Logical Maximum (255)
    0x46, 0xff, 0x00,  //   Physical Maximum (255)
    0x09, 0x30,        //   Usage (X)
    0x09, 0x31,        //   Usage (Y)
    0x09, 0x32,        //   Usage (Z)
    0x09, 0x35,        //   Usage (Rz)
    0x75, 0x08,        //   Report Size (8)
    0x95, 0x04,        //   Report Count (4)
    0x81, 0x02,        //   Input (Data,Var,Abs)
    0x06, 0x00, 0xff,  //   Usage Page (Vendor)
    0x09, 0x20,        //   Usage (0x20)
    0x95, 0x01,        //   Report Count (1)
    0x81, 0x02,        //   Input (Data,Var,Abs)
    0x0a, 0x21, 0x26,  //   Usage (0x2621)
    0x95, 0x08,        //   Report Count (8)
    0x91, 0x02,        //   Output (Data,Var,Abs)
    0xc0,              // End Collection
];

/// Which known-good Switch identity to present
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum SwitchIdentity {
    /// Genuine Pro Controller pairing
    ProController,
    /// HORIPAD S, the most broadly accepted third-party identity
    Horipad,
    /// Pokken Tournament DX Pro Pad
    Pokken,
}

static PRO_CONTROLLER: DeviceIdentity = DeviceIdentity {
    vid: 0x057e,
    pid: 0x2009,
    device_class: 0,
    device_sub_class: 0,
    device_protocol: 0,
    device_release: 0x0200,
    usb_release: 0x0200,
    manufacturer: "Nintendo Co., Ltd.",
    product: "Pro Controller",
    max_power_ma: 500,
};

static HORIPAD: DeviceIdentity = DeviceIdentity {
    vid: 0x0f0d,
    pid: 0x00c1,
    device_class: 0,
    device_sub_class: 0,
    device_protocol: 0,
    device_release: 0x0100,
    usb_release: 0x0200,
    manufacturer: "HORI CO.,LTD.",
    product: "HORIPAD S",
    max_power_ma: 500,
};

static POKKEN: DeviceIdentity = DeviceIdentity {
    vid: 0x0f0d,
    pid: 0x0092,
    device_class: 0,
    device_sub_class: 0,
    device_protocol: 0,
    device_release: 0x0100,
    usb_release: 0x0200,
    manufacturer: "HORI CO.,LTD.",
    product: "POKKEN CONTROLLER",
    max_power_ma: 500,
};

impl SwitchIdentity {
    fn identity(self) -> &'static DeviceIdentity {
        match self {
            SwitchIdentity::ProController => &PRO_CONTROLLER,
            SwitchIdentity::Horipad => &HORIPAD,
            SwitchIdentity::Pokken => &POKKEN,
        }
    }
}

/// Switch wire button bits
#[rustfmt::skip]
const BUTTON_BITS: [(Button, u16); 14] = [
    (Button::B3, 1 << 0),   // Y
    (Button::B1, 1 << 1),   // B
    (Button::B2, 1 << 2),   // A
    (Button::B4, 1 << 3),   // X
    (Button::L1, 1 << 4),   // L
    (Button::R1, 1 << 5),   // R
    (Button::L2, 1 << 6),   // ZL
    (Button::R2, 1 << 7),   // ZR
    (Button::S1, 1 << 8),   // Minus
    (Button::S2, 1 << 9),   // Plus
    (Button::L3, 1 << 10),
    (Button::R3, 1 << 11),
    (Button::A1, 1 << 12),  // Home
    (Button::A2, 1 << 13),  // Capture
];

#[derive(Clone, Copy, Debug, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "8")]
pub struct SwitchReport {
    #[packed_field]
    pub buttons: u16,
    #[packed_field]
    pub hat: u8,
    #[packed_field]
    pub lx: u8,
    #[packed_field]
    pub ly: u8,
    #[packed_field]
    pub rx: u8,
    #[packed_field]
    pub ry: u8,
    #[packed_field]
    pub vendor: u8,
}

pub struct SwitchMode {
    identity: SwitchIdentity,
}

impl SwitchMode {
    pub fn new() -> Self {
        Self::with_identity(crate::config::CONFIG.switch_identity)
    }

    pub fn with_identity(identity: SwitchIdentity) -> Self {
        Self { identity }
    }
}

impl Default for SwitchMode {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMode for SwitchMode {
    fn id(&self) -> ModeId {
        ModeId::SwitchPro
    }

    fn identity(&self) -> &'static DeviceIdentity {
        self.identity.identity()
    }

    fn class(&self) -> ClassKind {
        ClassKind::Hid { out_endpoint: true }
    }

    fn report_descriptor(&self) -> &'static [u8] {
        REPORT_DESCRIPTOR
    }

    fn report_len(&self) -> usize {
        8
    }

    fn build_report(&mut self, _player: u8, state: &ProfileOutput, buf: &mut [u8]) -> Option<usize> {
        let mut buttons = 0;
        for (button, bit) in BUTTON_BITS {
            if state.buttons.pressed(button) {
                buttons |= bit;
            }
        }
        let report = SwitchReport {
            buttons,
            hat: dpad_to_hat(state.buttons),
            lx: state.lx,
            ly: state.ly,
            rx: state.rx,
            ry: state.ry,
            vendor: 0,
        };
        let packed = report.pack().ok()?;
        buf[..packed.len()].copy_from_slice(&packed);
        Some(packed.len())
    }

    // Hosts send an 8-byte vendor output report; it carries nothing we act on
    fn handle_output(&mut self, _report_id: u8, _data: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Buttons, InputEvent};
    use crate::usbd::mode::hat;

    fn build(buttons: Buttons) -> [u8; 8] {
        let mut mode = SwitchMode::with_identity(SwitchIdentity::Horipad);
        let state = ProfileOutput::passthrough(&InputEvent::with_buttons(0, buttons));
        let mut buf = [0u8; 8];
        let len = mode.build_report(0, &state, &mut buf).unwrap();
        assert_eq!(len, 8);
        buf
    }

    #[test]
    fn b1_is_wire_b() {
        let report = build(Buttons::NONE.with(Button::B1));
        assert_eq!(
            report,
            [0x02, 0x00, 0x08, 0x80, 0x80, 0x80, 0x80, 0x00],
            "B maps to wire bit 1, hat centered, sticks centered"
        );
    }

    #[test]
    fn diagonal_dpad_becomes_hat() {
        let report = build(Buttons::NONE.with(Button::DpadUp).with(Button::DpadRight));
        assert_eq!(report[2], hat::UP_RIGHT);
        assert_eq!(&report[..2], &[0x00, 0x00], "dpad must not leak into buttons");
    }

    #[test]
    fn face_buttons_follow_switch_layout() {
        let report = build(
            Buttons::NONE
                .with(Button::B3)
                .with(Button::B4)
                .with(Button::A1),
        );
        // Y | X | Home
        assert_eq!(u16::from_le_bytes([report[0], report[1]]), 0x0001 | 0x0008 | 0x1000);
    }

    #[test]
    fn identity_choice_changes_vid_pid() {
        let pro = SwitchMode::with_identity(SwitchIdentity::ProController);
        let hori = SwitchMode::with_identity(SwitchIdentity::Horipad);
        assert_eq!(
            (pro.identity().vid, pro.identity().pid),
            (0x057e, 0x2009)
        );
        assert_eq!(
            (hori.identity().vid, hori.identity().pid),
            (0x0f0d, 0x00c1)
        );
    }
}
