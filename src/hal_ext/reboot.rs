//! Watchdog-driven reset
//!
//! The firmware has no normal exit. The one deliberate reset is the USB mode
//! change: settings are persisted and verified first, then the watchdog is
//! armed with a short timeout and the core spins until it bites. The reset
//! re-enters `main`, which reads the new mode and brings the USB stack up
//! with the new identity.

use rp2040_hal::fugit::ExtU32;
use rp2040_hal::pac;
use rp2040_hal::Watchdog;

use crate::usbd::ResetControl;

/// Watchdog timeout for the mode-change reset
const MODE_CHANGE_TIMEOUT_MS: u32 = 100;

/// Check (without clearing) whether the last reboot came from the watchdog
pub fn watchdog_caused_reboot() -> bool {
    // Reason register survives until the next watchdog arm
    let watchdog = unsafe { &*pac::WATCHDOG::ptr() };
    watchdog.reason().read().timer().bit_is_set()
}

/// [`ResetControl`] over the system watchdog
pub struct WatchdogReset<'a> {
    watchdog: &'a mut Watchdog,
}

impl<'a> WatchdogReset<'a> {
    pub fn new(watchdog: &'a mut Watchdog) -> Self {
        Self { watchdog }
    }
}

impl ResetControl for WatchdogReset<'_> {
    fn reset_for_mode_change(&mut self) {
        self.watchdog.start(MODE_CHANGE_TIMEOUT_MS.millis());
        loop {
            cortex_m::asm::nop();
        }
    }
}
