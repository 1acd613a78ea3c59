//! Input/output backend contracts
//!
//! Backends are plugged into the scheduler as trait objects. Optional
//! capabilities are default methods: a backend that does not override one
//! simply has the feature disabled, mirroring the "absent = disabled" rule
//! used everywhere in the pipeline. Concrete drivers beyond the USB device
//! output live out of tree; [`crate::bsp::buttons`] carries the reference
//! input implementation.

use crate::feedback::OutputFeedback;
use crate::player::PlayerManager;
use crate::router::{Router, Target};
use crate::telemetry::TelemetrySink;

/// A task to bind to core 1, owning it forever
pub type Core1Task = fn() -> !;

/// Per-iteration context handed to backend tasks
///
/// This is the explicit-state replacement for firmware-wide globals: tasks
/// reach the router, player bookkeeping and the telemetry stream only
/// through it.
pub struct Cx<'a> {
    /// Milliseconds since boot
    pub now_ms: u32,
    pub router: &'a mut Router,
    pub players: &'a mut PlayerManager,
    pub telemetry: &'a mut dyn TelemetrySink,
    /// Set by an output when a fired combo wants the new active profile
    /// persisted; collected by the scheduler after the stage runs
    pub save_active_profile: Option<u8>,
}

/// A source of controller events
pub trait InputInterface {
    fn name(&self) -> &'static str;

    /// One-time hardware/bookkeeping setup
    fn init(&mut self, _cx: &mut Cx) {}

    /// Poll the hardware and publish fresh events at the router
    fn task(&mut self, cx: &mut Cx);

    /// Accept rumble/LED feedback; default: input has no feedback channel
    fn apply_feedback(&mut self, _feedback: &OutputFeedback) {}
}

/// A sink emitting controller state on some wire
pub trait OutputInterface {
    fn name(&self) -> &'static str;

    /// The router target this output consumes
    fn target(&self) -> Target;

    /// One-time setup; must register the router tap before returning
    fn init(&mut self, cx: &mut Cx);

    /// Drain pending events and emit reports
    fn task(&mut self, cx: &mut Cx);

    /// Timing-critical half to bind to core 1; at most one output in the
    /// system may return one
    fn core1_task(&self) -> Option<Core1Task> {
        None
    }

    /// Whether the far side is up (drives the connection heartbeat)
    fn is_ready(&self) -> bool {
        false
    }

    /// Rich host feedback, if the backend tracks it
    fn feedback(&mut self) -> Option<OutputFeedback> {
        None
    }

    /// Scalar rumble fallback
    fn rumble(&mut self) -> Option<(u8, u8)> {
        None
    }

    /// Number of selectable profiles
    fn profile_count(&self) -> u8 {
        1
    }

    fn active_profile(&self) -> u8 {
        0
    }

    fn set_active_profile(&mut self, _index: u8) {}

    fn profile_name(&self, _index: u8) -> &'static str {
        "default"
    }

    /// Analog level above which a trigger counts as pressed, if the wire
    /// protocol needs a digital trigger
    fn trigger_threshold(&self) -> Option<u8> {
        None
    }
}
