//! Chip-level helpers (RP2040 only)
//!
//! Everything here touches raw hardware and is compiled for the target only;
//! the portable core talks to it through the traits in [`crate::storage`]
//! and [`crate::usbd`].

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod flash;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod multicore;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod reboot;
