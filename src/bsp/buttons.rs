//! GPIO button pad input
//!
//! The reference input backend: one active-low GPIO per button, polled every
//! scheduler tick. Events are published every poll; they are idempotent
//! snapshots, so the latest-wins mailbox downstream makes re-publishing
//! harmless and keeps the wire state fresh.

use embedded_hal::digital::InputPin;

use crate::event::{Button, Buttons, InputEvent};
use crate::interface::{Cx, InputInterface};
use crate::router::Target;

pub struct GpioPad<P: InputPin, const N: usize> {
    pins: [P; N],
    map: [Button; N],
    target: Target,
    player: u8,
}

impl<P: InputPin, const N: usize> GpioPad<P, N> {
    /// `pins[i]` pressed (low) sets `map[i]`
    pub fn new(pins: [P; N], map: [Button; N], target: Target, player: u8) -> Self {
        Self {
            pins,
            map,
            target,
            player,
        }
    }

    fn scan(&mut self) -> Buttons {
        let mut buttons = Buttons::NONE;
        for (pin, button) in self.pins.iter_mut().zip(self.map) {
            if pin.is_low().unwrap_or(false) {
                buttons = buttons.with(button);
            }
        }
        buttons
    }
}

impl<P: InputPin, const N: usize> InputInterface for GpioPad<P, N> {
    fn name(&self) -> &'static str {
        "gpio-pad"
    }

    fn task(&mut self, cx: &mut Cx) {
        let event = InputEvent::with_buttons(self.player, self.scan());
        cx.router.publish(self.target, self.player, &event);
    }
}
