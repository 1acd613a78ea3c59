#![cfg_attr(target_os = "none", no_std)]

//! Controller adapter firmware core
//!
//! Accepts gamepad state from heterogeneous inputs (USB host, native console
//! protocols, serial) and emits it on one selected output, most notably the
//! native USB controller emulating one of several console protocols. The
//! modules here form the input-to-output pipeline: [`router`] carries normalized
//! [`event::InputEvent`]s to the active output, [`profile`] applies remapping
//! and calibration, [`usbd`] dispatches the whole USB device identity based on
//! the persisted mode, [`storage`] keeps settings in flash, and [`scheduler`]
//! runs everything cooperatively on core 0 with an optional timing-critical
//! task bound to core 1.

/// Board support: pins, LED chain, USB bus bring-up
pub mod bsp;
/// Compiled-in defaults
pub mod config;
/// Normalized controller state
pub mod event;
/// Host feedback (rumble, LED colors) distribution
pub mod feedback;
/// Chip-level helpers: flash programming, multicore, reset
pub mod hal_ext;
/// Input/output backend contracts
pub mod interface;
/// Status and player LED service
pub mod leds;
/// Per-player state
pub mod player;
/// Button remapping, calibration and combos
pub mod profile;
/// Input event distribution
pub mod router;
/// Cooperative core-0 main loop
pub mod scheduler;
/// Flash-resident settings store
pub mod storage;
/// Post-profile state stream for the configuration console
pub mod telemetry;
/// USB device mode manager
pub mod usbd;

/// Maximum number of simultaneously tracked players
pub const MAX_PLAYERS: usize = 4;

// Core modules log through this alias so host tests use `log` while the
// firmware uses `defmt`.
#[cfg(test)]
pub(crate) mod log {
    pub use log::{debug, error, info, warn};
}

#[cfg(not(test))]
pub(crate) mod log {
    pub use defmt::{debug, error, info, warn};
}
