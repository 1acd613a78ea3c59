//! Host feedback distribution
//!
//! Feedback flows opposite to events: the host updates rumble/LED state
//! through the active USB device mode, the feedback plane pulls it from the
//! active output once per tick and pushes it to every input that can return
//! rumble, plus the LED service. Pull-model: the producer sets `dirty` and
//! clears it when read, so one host update is distributed exactly once.

use rgb::RGB8;

use crate::interface::{InputInterface, OutputInterface};
use crate::leds::LedService;

/// Rumble and LED state returned from the host
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(test, derive(Debug))]
pub struct OutputFeedback {
    pub rumble_left: u8,
    pub rumble_right: u8,
    /// Player the LED state belongs to
    pub led_player: u8,
    pub led: RGB8,
    /// Set by the producer on host updates, cleared when the plane reads it
    pub dirty: bool,
}

/// One feedback-plane tick for the active output
pub fn service(
    output: &mut dyn OutputInterface,
    inputs: &mut [&mut dyn InputInterface],
    leds: &mut LedService,
) {
    let feedback = match output.feedback() {
        Some(feedback) => feedback,
        // Scalar fallback when the rich struct is unavailable
        None => match output.rumble() {
            Some((rumble_left, rumble_right)) => OutputFeedback {
                rumble_left,
                rumble_right,
                dirty: true,
                ..Default::default()
            },
            None => return,
        },
    };

    if !feedback.dirty {
        return;
    }

    for input in inputs.iter_mut() {
        input.apply_feedback(&feedback);
    }
    leds.set_player_color(feedback.led_player, feedback.led);
}
