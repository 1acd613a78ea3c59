//! Input event distribution
//!
//! One tap per output target: an output registers its latest-wins mailbox
//! (see [`crate::usbd::PendingEvents`]) and inputs publish events at it.
//! Publishing is a synchronous slot write on core 0 with no queueing of its
//! own; the tap decides buffering. Events for a target without a registered
//! tap are dropped with a warning, never dereferenced blindly.

use crate::event::InputEvent;
use crate::log::*;
use crate::usbd::PendingEvents;
use crate::MAX_PLAYERS;

/// Output destination id
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub struct Target(pub u8);

impl Target {
    /// The native USB controller emulating a console protocol
    pub const USB_DEVICE: Target = Target(0);
    /// Native GameCube console output (bit-banged, external driver)
    pub const GAMECUBE: Target = Target(1);
    /// Native PCEngine console output (external driver)
    pub const PCENGINE: Target = Target(2);
}

/// Highest supported target id + 1
pub const MAX_TARGETS: usize = 4;

/// Event fan-in point between input backends and the active output
#[derive(Default)]
pub struct Router {
    taps: [Option<PendingEvents>; MAX_TARGETS],
}

impl Router {
    pub const fn new() -> Self {
        Self {
            taps: [None, None, None, None],
        }
    }

    /// Register the tap for `target`, enabling routing to it
    ///
    /// Must be called by the output during init, before any input may
    /// publish. Re-registration resets the mailbox.
    pub fn set_tap(&mut self, target: Target) {
        match self.taps.get_mut(target.0 as usize) {
            Some(tap) => *tap = Some(PendingEvents::new()),
            None => error!("Tap target {} out of range", target.0),
        }
    }

    /// Deliver one event to the tap registered for `target`
    ///
    /// Latest-wins: a second publish to the same player before the output
    /// consumed the first overwrites it. Events with an out-of-range player
    /// index are ignored.
    pub fn publish(&mut self, target: Target, player: u8, event: &InputEvent) {
        if player as usize >= MAX_PLAYERS {
            warn!("Dropping event for invalid player {}", player);
            return;
        }
        match self.taps.get_mut(target.0 as usize).and_then(Option::as_mut) {
            Some(tap) => tap.publish(player, event),
            None => warn!("No tap registered for target {}", target.0),
        }
    }

    /// The mailbox registered for `target`, if any (used by the owning output)
    pub fn tap(&mut self, target: Target) -> Option<&mut PendingEvents> {
        self.taps.get_mut(target.0 as usize).and_then(Option::as_mut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Button, Buttons};

    #[test]
    fn publish_without_tap_is_dropped() {
        let mut router = Router::new();
        // Must not crash; the event is just gone
        router.publish(Target::USB_DEVICE, 0, &InputEvent::idle(0));
        assert!(router.tap(Target::USB_DEVICE).is_none());
    }

    #[test]
    fn publish_reaches_registered_tap() {
        let mut router = Router::new();
        router.set_tap(Target::USB_DEVICE);
        let ev = InputEvent::with_buttons(1, Buttons::NONE.with(Button::B1));
        router.publish(Target::USB_DEVICE, 1, &ev);

        let tap = router.tap(Target::USB_DEVICE).unwrap();
        assert_eq!(tap.take(1), Some(ev));
        assert_eq!(tap.take(1), None);
    }

    #[test]
    fn latest_wins_per_player() {
        let mut router = Router::new();
        router.set_tap(Target::USB_DEVICE);
        let a = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B1));
        let b = InputEvent::with_buttons(0, Buttons::NONE.with(Button::B2));
        router.publish(Target::USB_DEVICE, 0, &a);
        router.publish(Target::USB_DEVICE, 0, &b);

        let tap = router.tap(Target::USB_DEVICE).unwrap();
        assert_eq!(tap.take(0), Some(b));
        assert_eq!(tap.take(0), None);
    }

    #[test]
    fn invalid_player_is_ignored() {
        let mut router = Router::new();
        router.set_tap(Target::USB_DEVICE);
        router.publish(Target::USB_DEVICE, MAX_PLAYERS as u8, &InputEvent::idle(0));
        let tap = router.tap(Target::USB_DEVICE).unwrap();
        for player in 0..MAX_PLAYERS as u8 {
            assert_eq!(tap.take(player), None);
        }
    }

    #[test]
    fn targets_are_independent() {
        let mut router = Router::new();
        router.set_tap(Target::USB_DEVICE);
        router.set_tap(Target::GAMECUBE);
        let ev = InputEvent::idle(0);
        router.publish(Target::GAMECUBE, 0, &ev);
        assert_eq!(router.tap(Target::USB_DEVICE).unwrap().take(0), None);
        assert_eq!(router.tap(Target::GAMECUBE).unwrap().take(0), Some(ev));
    }
}
