//! Generic HID gamepad mode (DInput layout)
//!
//! The least surprising identity: 16 buttons, an 8-direction hat and six
//! 8-bit axes. Its report descriptor doubles as the firmware-wide default
//! for modes that do not bring their own.

use packed_struct::prelude::*;

use crate::event::Button;
use crate::profile::ProfileOutput;
use crate::usbd::mode::{dpad_to_hat, DeviceIdentity, DeviceMode, ModeId};

#[rustfmt::skip]
pub const REPORT_DESCRIPTOR: &[u8] = &[
    0x05, 0x01,        // Usage Page (Generic Desktop)
    0x09, 0x05,        // Usage (Gamepad)
    0xa1, 0x01,        // Collection (Application)
    0x05, 0x09,        //   Usage Page (Button)
    0x19, 0x01,        //   Usage Minimum (Button 1)
    0x29, 0x10,        //   Usage Maximum (Button 16)
    0x15, 0x00,        //   Logical Minimum (0)
    0x25, 0x01,        //   Logical Maximum (1)
    0x95, 0x10,        //   Report Count (16)
    0x75, 0x01,        //   Report Size (1)
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
    0x09, 0x33,        //   Usage (Rx), left trigger
    0x09, 0x34,        //   Usage (Ry), right trigger
    0x75, 0x08,        //   Report Size (8)
    0x95, 0x06,        //   Report Count (6)
    0x81, 0x02,        //   Input (Data,Var,Abs)
    0xc0,              // End Collection
];

static IDENTITY: DeviceIdentity = DeviceIdentity {
    // VOTI free pair recognised as a generic joystick
    vid: 0x16c0,
    pid: 0x27dc,
    device_class: 0,
    device_sub_class: 0,
    device_protocol: 0,
    device_release: 0x0100,
    usb_release: 0x0200,
    manufacturer: "padbridge",
    product: "padbridge gamepad",
    max_power_ma: 100,
};

/// Wire button order of the DInput layout
#[rustfmt::skip]
const BUTTON_BITS: [(Button, u16); 16] = [
    (Button::B3, 1 << 0),
    (Button::B1, 1 << 1),
    (Button::B2, 1 << 2),
    (Button::B4, 1 << 3),
    (Button::L1, 1 << 4),
    (Button::R1, 1 << 5),
    (Button::L2, 1 << 6),
    (Button::R2, 1 << 7),
    (Button::S1, 1 << 8),
    (Button::S2, 1 << 9),
    (Button::L3, 1 << 10),
    (Button::R3, 1 << 11),
    (Button::A1, 1 << 12),
    (Button::A2, 1 << 13),
    (Button::L4, 1 << 14),
    (Button::R4, 1 << 15),
];

#[derive(Clone, Copy, Debug, PartialEq, Default, PackedStruct)]
#[packed_struct(endian = "lsb", size_bytes = "9")]
pub struct DinputReport {
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
    pub l2: u8,
    #[packed_field]
    pub r2: u8,
}

pub struct DinputMode;

impl DinputMode {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DinputMode {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceMode for DinputMode {
    fn id(&self) -> ModeId {
        ModeId::HidDinput
    }

    fn identity(&self) -> &'static DeviceIdentity {
        &IDENTITY
    }

    fn report_len(&self) -> usize {
        9
    }

    fn build_report(&mut self, _player: u8, state: &ProfileOutput, buf: &mut [u8]) -> Option<usize> {
        let mut buttons = 0;
        for (button, bit) in BUTTON_BITS {
            if state.buttons.pressed(button) {
                buttons |= bit;
            }
        }
        let report = DinputReport {
            buttons,
            hat: dpad_to_hat(state.buttons),
            lx: state.lx,
            ly: state.ly,
            rx: state.rx,
            ry: state.ry,
            l2: state.l2,
            r2: state.r2,
        };
        let packed = report.pack().ok()?;
        buf[..packed.len()].copy_from_slice(&packed);
        Some(packed.len())
    }
}
