//! In-tree USB device mode implementations
//!
//! Each mode privately owns its wire report layout, output-report handling
//! and feedback state. Console modes that need external auth hardware (PS3,
//! PS4, Xbox One) or exotic stacks (Xbox OG XID, GC adapter) plug in out of
//! tree through the same [`crate::usbd::mode::DeviceMode`] contract.

/// Generic HID gamepad (DInput layout); also the default report descriptor
pub mod dinput;
/// Keyboard + mouse composite
pub mod kbmouse;
/// Switch Pro Controller / HORI-compatible pad
pub mod switch;
/// Xbox 360 XInput vendor class
pub mod xinput;
