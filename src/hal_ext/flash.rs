//! Settings sector access and RAM-resident flash programming
//!
//! While the ROM erase/program routines run, XIP is down: nothing on either
//! core may fetch from flash. The routines here are therefore placed in RAM
//! (`.data.ram_func`), take every value they need by register-friendly
//! arguments, and are only entered with interrupts masked and core 1 parked
//! through the lockout protocol (see [`super::multicore`]).

use core::fmt::Write as _;

use rp2040_hal::rom_data;

use super::multicore;
use crate::storage::{SettingsSector, StoreError, SECTOR_SIZE};

/// Flash as seen by the cores
pub const XIP_BASE: u32 = 0x1000_0000;

/// ROM flash routines resolved ahead of time; the lookups themselves run
/// from flash and must happen before XIP is exited
#[repr(C)]
struct RomFuncs {
    connect_internal_flash: unsafe extern "C" fn(),
    flash_exit_xip: unsafe extern "C" fn(),
    flash_range_erase: unsafe extern "C" fn(u32, usize, u32, u8),
    flash_range_program: unsafe extern "C" fn(u32, *const u8, usize),
    flash_flush_cache: unsafe extern "C" fn(),
    flash_enter_cmd_xip: unsafe extern "C" fn(),
}

impl RomFuncs {
    fn get() -> Self {
        Self {
            connect_internal_flash: rom_data::connect_internal_flash::ptr(),
            flash_exit_xip: rom_data::flash_exit_xip::ptr(),
            flash_range_erase: rom_data::flash_range_erase::ptr(),
            flash_range_program: rom_data::flash_range_program::ptr(),
            flash_flush_cache: rom_data::flash_flush_cache::ptr(),
            flash_enter_cmd_xip: rom_data::flash_enter_cmd_xip::ptr(),
        }
    }
}

/// Erase one sector and program `len` bytes at its start
///
/// # Safety
///
/// Interrupts must be masked, core 1 must be parked in RAM/ROM, DMA must not
/// touch flash. `addr` must be sector-aligned, `data` must point to RAM,
/// `len` must be a multiple of the 256-byte page size.
#[inline(never)]
#[link_section = ".data.ram_func"]
unsafe fn sector_rewrite_ram(funcs: &RomFuncs, addr: u32, data: *const u8, len: usize) {
    (funcs.connect_internal_flash)();
    (funcs.flash_exit_xip)();
    (funcs.flash_range_erase)(addr, SECTOR_SIZE, 1 << 31, 0);
    (funcs.flash_range_program)(addr, data, len);
    (funcs.flash_flush_cache)();
    (funcs.flash_enter_cmd_xip)();
}

/// Issue one SPI read command with the flash controller halted
///
/// # Safety
///
/// Same environment as [`sector_rewrite_ram`]. `out` must point to RAM with
/// room for `len` bytes.
#[inline(never)]
#[link_section = ".data.ram_func"]
unsafe fn read_cmd_ram(funcs: &RomFuncs, cmd: u8, dummy: usize, out: *mut u8, len: usize) {
    // SSI registers, RP2040 datasheet 4.10.13
    const SSI_CTRLR0: *mut u32 = 0x1800_0000 as *mut u32;
    const SSI_CTRLR1: *mut u32 = 0x1800_0004 as *mut u32;
    const SSI_SSIENR: *mut u32 = 0x1800_0008 as *mut u32;
    const SSI_SR: *mut u32 = 0x1800_0028 as *mut u32;
    const SSI_DR0: *mut u32 = 0x1800_0060 as *mut u32;
    const SR_RFNE: u32 = 1 << 3;

    (funcs.connect_internal_flash)();
    (funcs.flash_exit_xip)();

    SSI_SSIENR.write_volatile(0);
    // TMOD = EEPROM read: transmit the command, then clock in NDF+1 frames
    SSI_CTRLR0.write_volatile(SSI_CTRLR0.read_volatile() | 0x300);
    SSI_CTRLR1.write_volatile((dummy + len - 1) as u32);
    SSI_SSIENR.write_volatile(1);
    SSI_DR0.write_volatile(cmd as u32);

    let mut skip = dummy;
    let mut got = 0;
    while got < len {
        while SSI_SR.read_volatile() & SR_RFNE == 0 {}
        let byte = SSI_DR0.read_volatile() as u8;
        if skip > 0 {
            skip -= 1;
        } else {
            out.add(got).write_volatile(byte);
            got += 1;
        }
    }

    SSI_SSIENR.write_volatile(0);
    // CTRLR1 must return to its reset value or XIP re-entry misbehaves
    SSI_CTRLR1.write_volatile(0);
    (funcs.flash_enter_cmd_xip)();
}

/// SPI flash unique id (command 0x4B, supported by the Winbond parts on
/// every board we ship)
pub fn unique_id() -> u64 {
    let funcs = RomFuncs::get();
    let mut id = [0u8; 8];
    cortex_m::interrupt::free(|_| unsafe {
        // Boot path: core 1 is not up yet, no parking needed
        read_cmd_ram(&funcs, 0x4b, 4, id.as_mut_ptr(), id.len());
    });
    u64::from_le_bytes(id)
}

/// The 12-hex-character USB serial derived from the flash unique id
pub fn unique_id_hex() -> heapless::String<12> {
    let mut serial = heapless::String::new();
    // 48 bits fill exactly 12 hex digits
    write!(serial, "{:012X}", unique_id() & 0xffff_ffff_ffff).ok();
    serial
}

/// Record area padded to the flash page size
const PROGRAM_LEN: usize = 512;

/// The dedicated settings sector of the on-board flash
pub struct SettingsFlash {
    offset: u32,
}

impl SettingsFlash {
    /// `offset` is relative to flash start and must be sector-aligned
    pub const fn new(offset: u32) -> Self {
        Self { offset }
    }
}

impl SettingsSector for SettingsFlash {
    fn read(&mut self, buf: &mut [u8]) {
        let base = (XIP_BASE + self.offset) as *const u8;
        for (index, byte) in buf.iter_mut().enumerate() {
            *byte = unsafe { base.add(index).read_volatile() };
        }
    }

    fn commit(&mut self, data: &[u8]) -> Result<(), StoreError> {
        if data.len() > PROGRAM_LEN {
            return Err(StoreError::Program);
        }
        let mut page = [0xffu8; PROGRAM_LEN];
        page[..data.len()].copy_from_slice(data);

        let funcs = RomFuncs::get();
        let offset = self.offset;
        multicore::with_core1_parked(|| {
            cortex_m::interrupt::free(|_| unsafe {
                sector_rewrite_ram(&funcs, offset, page.as_ptr(), PROGRAM_LEN);
            })
        })
        // No lockout peer means core 1 was never launched; refuse to write
        .ok_or(StoreError::Program)
    }
}
