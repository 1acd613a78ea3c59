//! USB device mode manager
//!
//! Owns the selected [`mode::ActiveMode`] and moves data between the router,
//! the profile engine and the usb-device stack. The USB identity is fixed for
//! the lifetime of a boot: [`change_mode`] persists the new mode, verifies
//! the write and reboots through the watchdog, because an enumerated device
//! cannot swap descriptors.

/// usb-device class drivers (descriptor dispatch)
pub mod class;
/// Mode contract, registry and the d-pad hat encoder
pub mod mode;
/// In-tree mode implementations
pub mod modes;

use heapless::Vec;

use crate::event::InputEvent;
use crate::feedback::OutputFeedback;
use crate::interface::{Cx, OutputInterface};
use crate::log::*;
use crate::profile::ProfileEngine;
use crate::router::Target;
use crate::storage::{SettingsSector, SettingsService, StoreError};
use crate::MAX_PLAYERS;

pub use class::{ModeClass, UsbDeviceIo};
pub use mode::{ActiveMode, DeviceMode, ModeId, SUPPORTED};

/// Upper bound on any wire report handled here
pub const MAX_REPORT: usize = 64;

/// One host-to-device report drained from the class driver
pub struct OutReport {
    pub report_id: u8,
    pub data: Vec<u8, MAX_REPORT>,
}

/// Latest-wins mailbox: one slot per player, overwritten by arrival,
/// cleared on consumption
pub struct PendingEvents {
    slots: [Option<InputEvent>; MAX_PLAYERS],
}

impl Default for PendingEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingEvents {
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_PLAYERS],
        }
    }

    /// Write the slot; an unconsumed previous event is superseded
    pub fn publish(&mut self, player: u8, event: &InputEvent) {
        if let Some(slot) = self.slots.get_mut(player as usize) {
            *slot = Some(*event);
        }
    }

    /// Consume the slot
    pub fn take(&mut self, player: u8) -> Option<InputEvent> {
        self.slots.get_mut(player as usize)?.take()
    }

    /// Put an unconsumed event back unless something newer arrived
    pub fn restore(&mut self, player: u8, event: &InputEvent) {
        if let Some(slot) = self.slots.get_mut(player as usize) {
            if slot.is_none() {
                *slot = Some(*event);
            }
        }
    }
}

/// The mode manager's view of the USB stack
///
/// Splitting this out keeps the manager logic free of bus specifics; the
/// firmware uses [`UsbDeviceIo`], tests use a mock.
pub trait UsbdIo {
    /// Run the device stack pump; true if any endpoint saw traffic
    fn pump(&mut self) -> bool;

    /// Enumerated and configured
    fn ready(&self) -> bool;

    /// Push one input report; false if the endpoint cannot take it now
    fn write_report(&mut self, data: &[u8]) -> bool;

    /// Drain host-to-device reports received since the last call
    fn poll_output(&mut self, handle: &mut dyn FnMut(u8, &[u8]));
}

/// The USB device output backend (the primary output of the firmware)
pub struct UsbdOutput<IO: UsbdIo> {
    pub(crate) io: IO,
    mode: ActiveMode,
    engine: ProfileEngine,
}

impl<IO: UsbdIo> UsbdOutput<IO> {
    pub fn new(io: IO, mode: ActiveMode, engine: ProfileEngine) -> Self {
        Self { io, mode, engine }
    }

    pub fn mode(&self) -> &ActiveMode {
        &self.mode
    }

    pub fn engine_mut(&mut self) -> &mut ProfileEngine {
        &mut self.engine
    }
}

impl<IO: UsbdIo> OutputInterface for UsbdOutput<IO> {
    fn name(&self) -> &'static str {
        self.mode.id().name()
    }

    fn target(&self) -> Target {
        Target::USB_DEVICE
    }

    fn init(&mut self, cx: &mut Cx) {
        // The tap must exist before routing is enabled; publishing into the
        // void is a dropped event, not a crash
        cx.router.set_tap(Target::USB_DEVICE);
        self.mode.init();
        info!("USB device mode: {}", self.mode.id().name());
    }

    fn task(&mut self, cx: &mut Cx) {
        let Self { io, mode, engine } = self;

        io.pump();
        io.poll_output(&mut |report_id, data| mode.handle_output(report_id, data));
        mode.tick(cx.now_ms);

        if !io.ready() {
            // Drop this tick's emission, keep pending events for the next one
            return;
        }

        if let Some(tap) = cx.router.tap(Target::USB_DEVICE) {
            for player in 0..MAX_PLAYERS as u8 {
                let Some(event) = tap.take(player) else {
                    continue;
                };
                cx.players.note_event(player, cx.now_ms);
                let state = engine.apply(&event, cx.now_ms, cx.telemetry);
                if let Some(index) = engine.take_save_request() {
                    cx.save_active_profile = Some(index);
                }
                let mut buf = [0u8; MAX_REPORT];
                if let Some(len) = mode.build_report(player, &state, &mut buf) {
                    if !io.write_report(&buf[..len]) {
                        tap.restore(player, &event);
                    }
                }
            }
        }

        // Keyboard/mouse keeps relative motion flowing between events
        let mut buf = [0u8; MAX_REPORT];
        if let Some(len) = mode.idle_report(&mut buf) {
            io.write_report(&buf[..len]);
        }
    }

    fn is_ready(&self) -> bool {
        self.io.ready()
    }

    fn feedback(&mut self) -> Option<OutputFeedback> {
        self.mode.feedback()
    }

    fn rumble(&mut self) -> Option<(u8, u8)> {
        self.mode.rumble()
    }

    fn profile_count(&self) -> u8 {
        self.engine.count()
    }

    fn active_profile(&self) -> u8 {
        self.engine.active()
    }

    fn set_active_profile(&mut self, index: u8) {
        self.engine.set_active(index);
    }

    fn profile_name(&self, index: u8) -> &'static str {
        self.engine.name(index)
    }
}

/// Arms the ~100 ms watchdog reset that re-enters `main` with the new mode
///
/// The hardware implementation never returns control to the cooperative
/// loop; the mock used in tests records the arming instead.
pub trait ResetControl {
    fn reset_for_mode_change(&mut self);
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum ModeChangeError {
    /// Target id is unknown or has no registered implementation
    UnsupportedMode,
    /// Flash write failed; the running mode stays usable
    Store(StoreError),
    /// The record read back does not carry the new mode
    VerifyMismatch,
}

/// Persist a new USB output mode and reboot into it
///
/// On any error the persisted and in-RAM settings are left with the old
/// mode and no reset is armed.
pub fn change_mode<S: SettingsSector>(
    requested: u8,
    settings: &mut SettingsService<S>,
    reset: &mut dyn ResetControl,
) -> Result<(), ModeChangeError> {
    let id = ModeId::try_from(requested)
        .ok()
        .filter(|id| SUPPORTED.contains(id))
        .ok_or(ModeChangeError::UnsupportedMode)?;

    let previous = settings.record().usb_output_mode;
    settings.record_mut().usb_output_mode = id as u8;
    if let Err(e) = settings.save_now() {
        settings.record_mut().usb_output_mode = previous;
        return Err(ModeChangeError::Store(e));
    }

    let verified = settings
        .reload()
        .map(|record| record.usb_output_mode == id as u8)
        .unwrap_or(false);
    if !verified {
        settings.record_mut().usb_output_mode = previous;
        return Err(ModeChangeError::VerifyMismatch);
    }

    info!("Mode change to {} persisted, resetting", id.name());
    reset.reset_for_mode_change();
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testutil::{MockIo, MockReset};
    use super::*;
    use crate::event::{Button, Buttons};
    use crate::player::PlayerManager;
    use crate::profile::PASSTHROUGH;
    use crate::router::Router;
    use crate::storage::RamSector;
    use crate::telemetry::NullTelemetry;

    fn usbd(mode_id: ModeId) -> UsbdOutput<MockIo> {
        UsbdOutput::new(
            MockIo::new(),
            ActiveMode::new(mode_id).unwrap(),
            ProfileEngine::new(&PASSTHROUGH),
        )
    }

    struct Fixture {
        router: Router,
        players: PlayerManager,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                router: Router::new(),
                players: PlayerManager::new(),
            }
        }

        fn run<IO: UsbdIo>(&mut self, out: &mut UsbdOutput<IO>, now_ms: u32) -> Option<u8> {
            let mut telemetry = NullTelemetry;
            let mut cx = Cx {
                now_ms,
                router: &mut self.router,
                players: &mut self.players,
                telemetry: &mut telemetry,
                save_active_profile: None,
            };
            if now_ms == 0 {
                out.init(&mut cx);
            }
            out.task(&mut cx);
            cx.save_active_profile
        }
    }

    #[test]
    fn pending_queue_is_latest_wins() {
        let mut pending = PendingEvents::new();
        let a = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1));
        let b = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B2));
        pending.publish(0, &a);
        pending.publish(0, &b);
        assert_eq!(pending.take(0), Some(b));
        assert_eq!(pending.take(0), None);
    }

    #[test]
    fn restore_does_not_clobber_newer_event() {
        let mut pending = PendingEvents::new();
        let old = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1));
        let newer = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B2));
        pending.restore(0, &old);
        assert_eq!(pending.take(0), Some(old));

        pending.publish(0, &newer);
        pending.restore(0, &old);
        assert_eq!(pending.take(0), Some(newer));
    }

    #[test]
    fn second_publish_before_task_wins_end_to_end() {
        let mut usbd = usbd(ModeId::SwitchPro);
        let mut fx = Fixture::new();
        fx.run(&mut usbd, 0); // init + first task

        let a = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1));
        let b = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B2));
        fx.router.publish(Target::USB_DEVICE, 0, &a);
        fx.router.publish(Target::USB_DEVICE, 0, &b);
        fx.run(&mut usbd, 1);

        // Only B's report (wire A button, 0x0004) ever reaches the wire
        assert_eq!(usbd.io.written.len(), 1);
        assert_eq!(
            usbd.io.written[0],
            &[0x04, 0x00, 0x08, 0x80, 0x80, 0x80, 0x80, 0x00]
        );
    }

    #[test]
    fn not_ready_keeps_the_pending_event() {
        let mut usbd = usbd(ModeId::SwitchPro);
        let mut fx = Fixture::new();
        fx.run(&mut usbd, 0);

        usbd.io.ready = false;
        let ev = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1));
        fx.router.publish(Target::USB_DEVICE, 0, &ev);
        fx.run(&mut usbd, 1);
        assert!(usbd.io.written.is_empty());

        usbd.io.ready = true;
        fx.run(&mut usbd, 2);
        assert_eq!(usbd.io.written.len(), 1);
    }

    #[test]
    fn failed_write_restores_the_event() {
        let mut usbd = usbd(ModeId::SwitchPro);
        let mut fx = Fixture::new();
        fx.run(&mut usbd, 0);

        usbd.io.fail_writes = true;
        let ev = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1));
        fx.router.publish(Target::USB_DEVICE, 0, &ev);
        fx.run(&mut usbd, 1);
        assert!(usbd.io.written.is_empty());

        usbd.io.fail_writes = false;
        fx.run(&mut usbd, 2);
        assert_eq!(usbd.io.written.len(), 1);
    }

    #[test]
    fn kbmouse_emits_idle_mouse_report_without_events() {
        let mut usbd = usbd(ModeId::KbMouse);
        let mut fx = Fixture::new();
        fx.run(&mut usbd, 0);
        assert_eq!(
            usbd.io.written.last().map(std::vec::Vec::as_slice),
            Some(&[modes::kbmouse::MOUSE_REPORT_ID, 0, 0, 0][..])
        );
    }

    #[test]
    fn host_output_reports_reach_the_mode() {
        let mut usbd = usbd(ModeId::XInput);
        let mut fx = Fixture::new();
        fx.run(&mut usbd, 0);

        usbd.io
            .host_reports
            .push((0, vec![0x00, 0x08, 0x00, 0x40, 0x80, 0, 0, 0]));
        fx.run(&mut usbd, 1);
        let feedback = usbd.feedback().unwrap();
        assert!(feedback.dirty);
        assert_eq!((feedback.rumble_left, feedback.rumble_right), (0x40, 0x80));
    }

    #[test]
    fn mode_change_persists_verifies_and_arms_reset() {
        let mut settings = SettingsService::new(RamSector::new());
        let mut reset = MockReset::default();
        change_mode(ModeId::SwitchPro as u8, &mut settings, &mut reset).unwrap();

        assert_eq!(reset.armed, 1);
        assert_eq!(
            settings.reload().unwrap().usb_output_mode,
            ModeId::SwitchPro as u8
        );
        // After the (mocked) reboot the new mode comes up
        assert_eq!(
            ActiveMode::boot(settings.record().usb_output_mode).id(),
            ModeId::SwitchPro
        );
    }

    #[test]
    fn mode_change_rejects_unsupported_ids() {
        let mut settings = SettingsService::new(RamSector::new());
        let mut reset = MockReset::default();
        assert_eq!(
            change_mode(0xff, &mut settings, &mut reset),
            Err(ModeChangeError::UnsupportedMode)
        );
        assert_eq!(
            change_mode(ModeId::Ps4 as u8, &mut settings, &mut reset),
            Err(ModeChangeError::UnsupportedMode)
        );
        assert_eq!(reset.armed, 0);
    }

    #[test]
    fn failed_save_aborts_without_reset() {
        let mut sector = RamSector::new();
        sector.fail_program = true;
        let mut settings = SettingsService::new(sector);
        let mut reset = MockReset::default();

        let result = change_mode(ModeId::SwitchPro as u8, &mut settings, &mut reset);
        assert_eq!(result, Err(ModeChangeError::Store(StoreError::Program)));
        assert_eq!(reset.armed, 0, "old mode must keep working");
        assert_eq!(settings.record().usb_output_mode, 0);
    }
}
