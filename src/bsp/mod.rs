//! Board support
//!
//! Constants and drivers for the reference board: an RP2040 with a WS2812
//! chain (one status LED plus one LED per player), a directly wired button
//! pad and an optional PIO-driven second USB port whose D+ GPIO comes from
//! the build script (`PADBRIDGE_PIO_USB_DP`).

/// GPIO button pad input backend
pub mod buttons;

include!(concat!(env!("OUT_DIR"), "/board_pins.rs"));

/// Crystal on every supported board
pub const XOSC_CRYSTAL_FREQ: u32 = 12_000_000;

/// Total flash size of the reference board
pub const FLASH_SIZE: u32 = 2 * 1024 * 1024;

/// Flash offset of the dedicated settings sector (the last sector;
/// `memory.x` keeps the program image out of it)
pub const SETTINGS_SECTOR_OFFSET: u32 = FLASH_SIZE - crate::storage::SECTOR_SIZE as u32;

/// WS2812 data line
pub const LED_DATA_PIN: u8 = 15;
