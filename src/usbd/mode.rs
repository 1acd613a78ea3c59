//! USB device mode contract and registry
//!
//! A mode is one emulated USB device identity: descriptors, report builder,
//! class driver flavor and feedback state. The registry is the compiled-in
//! set of supported modes; selecting one happens once at boot from the
//! persisted record, and changing it requires persisting and rebooting
//! because descriptors cannot change on an enumerated device.

use crate::event::{Button, Buttons};
use crate::feedback::OutputFeedback;
use crate::profile::ProfileOutput;

use super::modes::{dinput, kbmouse, switch, xinput};

/// Wire identities the firmware knows about
///
/// Ids are stable because they are persisted in the flash record. Not every
/// id has an in-tree implementation; console-specific modes with external
/// auth requirements plug in out of tree and absent ones fall back to
/// [`DEFAULT_MODE`] at boot.
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
#[repr(u8)]
pub enum ModeId {
    /// Generic HID gamepad (DInput layout)
    HidDinput = 0,
    /// Xbox Original XID (USB 1.1)
    XboxOriginal = 1,
    /// Xbox 360 XInput
    XInput = 2,
    /// DualShock 3 (auth feature reports)
    Ps3 = 3,
    /// DualShock 4 (auth feature reports)
    Ps4 = 4,
    /// Switch Pro Controller
    SwitchPro = 5,
    /// PlayStation Classic mini pad
    PsClassic = 6,
    /// Xbox One GIP
    XboxOne = 7,
    /// Xbox Adaptive Controller layout
    Xac = 8,
    /// Keyboard + mouse composite
    KbMouse = 9,
    /// GameCube controller adapter (vendor class)
    GcAdapter = 10,
}

/// Mode used when nothing valid is persisted
pub const DEFAULT_MODE: ModeId = ModeId::HidDinput;

impl ModeId {
    pub const ALL: [ModeId; 11] = [
        ModeId::HidDinput,
        ModeId::XboxOriginal,
        ModeId::XInput,
        ModeId::Ps3,
        ModeId::Ps4,
        ModeId::SwitchPro,
        ModeId::PsClassic,
        ModeId::XboxOne,
        ModeId::Xac,
        ModeId::KbMouse,
        ModeId::GcAdapter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModeId::HidDinput => "dinput",
            ModeId::XboxOriginal => "xbox-og",
            ModeId::XInput => "xinput",
            ModeId::Ps3 => "ps3",
            ModeId::Ps4 => "ps4",
            ModeId::SwitchPro => "switch",
            ModeId::PsClassic => "ps-classic",
            ModeId::XboxOne => "xbox-one",
            ModeId::Xac => "xac",
            ModeId::KbMouse => "kbmouse",
            ModeId::GcAdapter => "gc-adapter",
        }
    }
}

impl TryFrom<u8> for ModeId {
    type Error = ();

    fn try_from(raw: u8) -> Result<Self, ()> {
        Self::ALL
            .get(raw as usize)
            .copied()
            .filter(|id| *id as u8 == raw)
            .ok_or(())
    }
}

/// Everything that goes into the device descriptor and device strings
pub struct DeviceIdentity {
    pub vid: u16,
    pub pid: u16,
    pub device_class: u8,
    pub device_sub_class: u8,
    pub device_protocol: u8,
    /// bcdDevice
    pub device_release: u16,
    /// bcdUSB the emulated device reports; USB 1.1 identities must not
    /// negotiate high speed (moot on this chip, the controller is FS-only)
    pub usb_release: u16,
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub max_power_ma: u16,
}

/// Which class driver the mode substitutes into the device
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ClassKind {
    /// Built-in HID class with the mode's report descriptor
    Hid {
        /// Whether the interface takes host-to-device interrupt transfers
        out_endpoint: bool,
    },
    /// Xbox 360 vendor-specific class
    XInputVendor,
}

/// Capability set of one USB device mode
///
/// Optional capabilities are default methods; a mode that does not override
/// one simply has that feature disabled, never an error.
pub trait DeviceMode {
    fn id(&self) -> ModeId;

    fn identity(&self) -> &'static DeviceIdentity;

    fn class(&self) -> ClassKind {
        ClassKind::Hid {
            out_endpoint: false,
        }
    }

    /// HID report descriptor; the default is the generic gamepad one
    fn report_descriptor(&self) -> &'static [u8] {
        dinput::REPORT_DESCRIPTOR
    }

    /// Wire size of one input report
    fn report_len(&self) -> usize;

    fn init(&mut self) {}

    /// Housekeeping run every scheduler tick, before reports are built
    fn tick(&mut self, _now_ms: u32) {}

    /// Build the wire report for one player; `None` if this state produces
    /// no report. A produced report is always exactly [`Self::report_len`]
    /// bytes.
    fn build_report(&mut self, player: u8, state: &ProfileOutput, buf: &mut [u8]) -> Option<usize>;

    /// Report to emit even without a pending event (keyboard/mouse keeps
    /// relative motion flowing this way)
    fn idle_report(&mut self, _buf: &mut [u8]) -> Option<usize> {
        None
    }

    /// Host-to-device report (rumble, LEDs, feature configuration)
    fn handle_output(&mut self, _report_id: u8, _data: &[u8]) {}

    /// Canned GET_REPORT answer (auth/feature blobs); default absent
    fn get_report(&mut self, _report_type: u8, _report_id: u8, _buf: &mut [u8]) -> Option<usize> {
        None
    }

    /// Rich feedback snapshot; implementations clear their dirty flag here
    fn feedback(&mut self) -> Option<OutputFeedback> {
        None
    }

    /// Scalar rumble fallback
    fn rumble(&self) -> Option<(u8, u8)> {
        None
    }
}

/// D-pad hat byte values used by the HID-style modes
pub mod hat {
    pub const UP: u8 = 0;
    pub const UP_RIGHT: u8 = 1;
    pub const RIGHT: u8 = 2;
    pub const DOWN_RIGHT: u8 = 3;
    pub const DOWN: u8 = 4;
    pub const DOWN_LEFT: u8 = 5;
    pub const LEFT: u8 = 6;
    pub const UP_LEFT: u8 = 7;
    pub const CENTER: u8 = 8;
}

/// Encode the four d-pad buttons as an 8-direction + center hat value
///
/// Total over all 16 subsets; opposite directions cancel each other, so
/// contradictory states degrade to the remaining axis or [`hat::CENTER`].
pub fn dpad_to_hat(buttons: Buttons) -> u8 {
    let up = buttons.pressed(Button::DpadUp) && !buttons.pressed(Button::DpadDown);
    let down = buttons.pressed(Button::DpadDown) && !buttons.pressed(Button::DpadUp);
    let left = buttons.pressed(Button::DpadLeft) && !buttons.pressed(Button::DpadRight);
    let right = buttons.pressed(Button::DpadRight) && !buttons.pressed(Button::DpadLeft);

    match (up, down, left, right) {
        (true, _, false, false) => hat::UP,
        (true, _, false, true) => hat::UP_RIGHT,
        (false, false, false, true) => hat::RIGHT,
        (_, true, false, true) => hat::DOWN_RIGHT,
        (_, true, false, false) => hat::DOWN,
        (_, true, true, false) => hat::DOWN_LEFT,
        (false, false, true, false) => hat::LEFT,
        (true, _, true, false) => hat::UP_LEFT,
        _ => hat::CENTER,
    }
}

/// Mode ids with an in-tree implementation
pub const SUPPORTED: &[ModeId] = &[
    ModeId::HidDinput,
    ModeId::SwitchPro,
    ModeId::XInput,
    ModeId::KbMouse,
];

/// The selected mode with its private state
///
/// Variants carry their own report/feedback state; this is the registry
/// entry come alive after boot selection.
pub enum ActiveMode {
    Dinput(dinput::DinputMode),
    Switch(switch::SwitchMode),
    XInput(xinput::XInputMode),
    KbMouse(kbmouse::KbMouseMode),
}

macro_rules! dispatch {
    ($self:expr, $mode:ident => $body:expr) => {
        match $self {
            ActiveMode::Dinput($mode) => $body,
            ActiveMode::Switch($mode) => $body,
            ActiveMode::XInput($mode) => $body,
            ActiveMode::KbMouse($mode) => $body,
        }
    };
}

impl ActiveMode {
    /// Instantiate a supported mode; `None` if the id has no in-tree
    /// implementation
    pub fn new(id: ModeId) -> Option<Self> {
        match id {
            ModeId::HidDinput => Some(ActiveMode::Dinput(dinput::DinputMode::new())),
            ModeId::SwitchPro => Some(ActiveMode::Switch(switch::SwitchMode::new())),
            ModeId::XInput => Some(ActiveMode::XInput(xinput::XInputMode::new())),
            ModeId::KbMouse => Some(ActiveMode::KbMouse(kbmouse::KbMouseMode::new())),
            _ => None,
        }
    }

    /// Resolve the persisted mode byte, falling back to [`DEFAULT_MODE`]
    /// when the value is unknown or not in the registry
    pub fn boot(persisted: u8) -> Self {
        let id = ModeId::try_from(persisted)
            .ok()
            .filter(|id| SUPPORTED.contains(id))
            .unwrap_or(DEFAULT_MODE);
        // The default mode is always registered
        Self::new(id).unwrap_or(ActiveMode::Dinput(dinput::DinputMode::new()))
    }
}

impl DeviceMode for ActiveMode {
    fn id(&self) -> ModeId {
        dispatch!(self, m => m.id())
    }

    fn identity(&self) -> &'static DeviceIdentity {
        dispatch!(self, m => m.identity())
    }

    fn class(&self) -> ClassKind {
        dispatch!(self, m => m.class())
    }

    fn report_descriptor(&self) -> &'static [u8] {
        dispatch!(self, m => m.report_descriptor())
    }

    fn report_len(&self) -> usize {
        dispatch!(self, m => m.report_len())
    }

    fn init(&mut self) {
        dispatch!(self, m => m.init())
    }

    fn tick(&mut self, now_ms: u32) {
        dispatch!(self, m => m.tick(now_ms))
    }

    fn build_report(&mut self, player: u8, state: &ProfileOutput, buf: &mut [u8]) -> Option<usize> {
        dispatch!(self, m => m.build_report(player, state, buf))
    }

    fn idle_report(&mut self, buf: &mut [u8]) -> Option<usize> {
        dispatch!(self, m => m.idle_report(buf))
    }

    fn handle_output(&mut self, report_id: u8, data: &[u8]) {
        dispatch!(self, m => m.handle_output(report_id, data))
    }

    fn get_report(&mut self, report_type: u8, report_id: u8, buf: &mut [u8]) -> Option<usize> {
        dispatch!(self, m => m.get_report(report_type, report_id, buf))
    }

    fn feedback(&mut self) -> Option<OutputFeedback> {
        dispatch!(self, m => m.feedback())
    }

    fn rumble(&self) -> Option<(u8, u8)> {
        dispatch!(self, m => m.rumble())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InputEvent;

    #[test]
    fn mode_id_round_trips_and_rejects_unknown() {
        for id in ModeId::ALL {
            assert_eq!(ModeId::try_from(id as u8), Ok(id));
        }
        assert_eq!(ModeId::try_from(11), Err(()));
        assert_eq!(ModeId::try_from(0xff), Err(()));
    }

    #[test]
    fn every_supported_mode_reports_declared_size() {
        let state = ProfileOutput::passthrough(&InputEvent::with_buttons(
            0,
            Buttons::NONE.with(Button::B1).with(Button::DpadUp),
        ));
        for id in SUPPORTED {
            let mut mode = ActiveMode::new(*id).unwrap();
            let mut buf = [0u8; 64];
            let len = mode
                .build_report(0, &state, &mut buf)
                .expect("supported mode must build a report");
            assert_eq!(len, mode.report_len(), "mode {:?}", id);
        }
    }

    #[test]
    fn unknown_persisted_mode_boots_default() {
        assert_eq!(ActiveMode::boot(0xff).id(), DEFAULT_MODE);
        // In the registry list but without in-tree implementation
        assert_eq!(ActiveMode::boot(ModeId::Ps3 as u8).id(), DEFAULT_MODE);
        assert_eq!(ActiveMode::boot(ModeId::SwitchPro as u8).id(), ModeId::SwitchPro);
    }

    #[test]
    fn hat_is_total_and_matches_canonical_subsets() {
        use Button::*;

        // All 16 subsets produce a valid value
        for bits in 0u32..16 {
            let buttons = Buttons(bits); // dpad occupies the low four bits
            let value = dpad_to_hat(buttons);
            assert!(value <= hat::CENTER);
        }

        let cases: [(&[Button], u8); 9] = [
            (&[], hat::CENTER),
            (&[DpadUp], hat::UP),
            (&[DpadUp, DpadRight], hat::UP_RIGHT),
            (&[DpadRight], hat::RIGHT),
            (&[DpadDown, DpadRight], hat::DOWN_RIGHT),
            (&[DpadDown], hat::DOWN),
            (&[DpadDown, DpadLeft], hat::DOWN_LEFT),
            (&[DpadLeft], hat::LEFT),
            (&[DpadUp, DpadLeft], hat::UP_LEFT),
        ];
        for (chord, expected) in cases {
            assert_eq!(dpad_to_hat(chord.iter().copied().collect()), expected);
        }

        // Opposite pairs cancel
        assert_eq!(
            dpad_to_hat([DpadUp, DpadDown].into_iter().collect()),
            hat::CENTER
        );
        assert_eq!(
            dpad_to_hat([DpadLeft, DpadRight].into_iter().collect()),
            hat::CENTER
        );
        assert_eq!(
            dpad_to_hat([DpadUp, DpadDown, DpadLeft].into_iter().collect()),
            hat::LEFT
        );
    }
}
