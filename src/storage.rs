//! Flash-resident settings store
//!
//! Settings live in one dedicated flash sector as a fixed-size record framed
//! by a magic number and a CRC-32:
//!
//! ```text
//! [magic u32][version u16][reserved u16][usb_output_mode u8]
//! [active_profile_index u8][profile slots][crc32 u32]
//! ```
//!
//! All fields are little-endian and the CRC covers every byte before it. A
//! record with a bad magic, version or CRC is treated as absent and the
//! caller falls back to compiled-in defaults. The record is only ever
//! rewritten as a whole sector; [`SettingsSector`] abstracts the physical
//! erase/program primitive so the codec and store logic run in host tests
//! against RAM (the RP2040 implementation parks core 1 for the duration, see
//! [`crate::hal_ext::flash`]).

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::log::*;
use crate::profile::{
    ComboAction, ComboRule, CustomProfile, ProfileFlags, PROFILE_SLOTS, REMAP_ENTRIES,
    RULES_PER_PROFILE,
};

pub const MAGIC: u32 = 0x5041_4442;
pub const VERSION: u16 = 1;

/// Dedicated settings sector size
pub const SECTOR_SIZE: usize = 4096;

const RULE_LEN: usize = 8;
const PROFILE_LEN: usize = REMAP_ENTRIES + 2 + 1 + 1 + RULES_PER_PROFILE * RULE_LEN;
/// Encoded record size, header + slots + CRC
pub const RECORD_LEN: usize = 10 + PROFILE_SLOTS * PROFILE_LEN + 4;

static_assertions::const_assert!(RECORD_LEN <= SECTOR_SIZE);

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Everything the firmware persists
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub struct SettingsRecord {
    /// Raw persisted mode id; validated against the registry at boot
    pub usb_output_mode: u8,
    pub active_profile_index: u8,
    pub profiles: [CustomProfile; PROFILE_SLOTS],
}

impl Default for SettingsRecord {
    fn default() -> Self {
        Self {
            usb_output_mode: 0,
            active_profile_index: 0,
            profiles: [CustomProfile::identity(); PROFILE_SLOTS],
        }
    }
}

fn put(buf: &mut [u8], at: &mut usize, bytes: &[u8]) {
    buf[*at..*at + bytes.len()].copy_from_slice(bytes);
    *at += bytes.len();
}

fn take<'a>(buf: &'a [u8], at: &mut usize, len: usize) -> &'a [u8] {
    let out = &buf[*at..*at + len];
    *at += len;
    out
}

fn encode_rule(rule: &ComboRule, buf: &mut [u8], at: &mut usize) {
    put(buf, at, &rule.mask.to_le_bytes());
    put(buf, at, &rule.dwell_ms.to_le_bytes());
    let (kind, param) = match rule.action {
        ComboAction::Press(button) => (0, button as u8),
        ComboAction::SwitchProfile(profile) => (1, profile),
    };
    put(buf, at, &[kind, param]);
}

fn decode_rule(buf: &[u8], at: &mut usize) -> ComboRule {
    let mask = u32::from_le_bytes(take(buf, at, 4).try_into().unwrap());
    let dwell_ms = u16::from_le_bytes(take(buf, at, 2).try_into().unwrap());
    let kind = take(buf, at, 2);
    let action = match (kind[0], kind[1]) {
        (0, param) => crate::event::Button::from_index(param).map(ComboAction::Press),
        (1, param) => Some(ComboAction::SwitchProfile(param)),
        _ => None,
    };
    match action {
        Some(action) => ComboRule {
            mask,
            dwell_ms,
            action,
        },
        // Unknown action: neutralize the rule instead of rejecting the record
        None => ComboRule {
            mask: 0,
            dwell_ms: 0,
            action: ComboAction::SwitchProfile(0),
        },
    }
}

impl SettingsRecord {
    pub fn encode(&self, buf: &mut [u8; RECORD_LEN]) {
        let at = &mut 0;
        put(buf, at, &MAGIC.to_le_bytes());
        put(buf, at, &VERSION.to_le_bytes());
        put(buf, at, &[0, 0]); // reserved
        put(buf, at, &[self.usb_output_mode, self.active_profile_index]);
        for profile in &self.profiles {
            put(buf, at, &profile.remap);
            put(buf, at, &[profile.sens_l, profile.sens_r]);
            put(buf, at, &[profile.flags.bits(), profile.rule_count]);
            for rule in &profile.rules {
                encode_rule(rule, buf, at);
            }
        }
        debug_assert_eq!(*at, RECORD_LEN - 4);
        let crc = CRC32.checksum(&buf[..RECORD_LEN - 4]);
        put(buf, at, &crc.to_le_bytes());
    }

    /// `None` if the magic, version or CRC does not match
    pub fn decode(buf: &[u8; RECORD_LEN]) -> Option<Self> {
        let at = &mut 0;
        if u32::from_le_bytes(take(buf, at, 4).try_into().unwrap()) != MAGIC {
            return None;
        }
        if u16::from_le_bytes(take(buf, at, 2).try_into().unwrap()) != VERSION {
            return None;
        }
        let stored = u32::from_le_bytes(buf[RECORD_LEN - 4..].try_into().unwrap());
        if CRC32.checksum(&buf[..RECORD_LEN - 4]) != stored {
            return None;
        }
        *at += 2; // reserved
        let head = take(buf, at, 2);
        let (usb_output_mode, active_profile_index) = (head[0], head[1]);
        let mut profiles = [CustomProfile::identity(); PROFILE_SLOTS];
        for profile in profiles.iter_mut() {
            profile.remap.copy_from_slice(take(buf, at, REMAP_ENTRIES));
            let sens = take(buf, at, 2);
            profile.sens_l = sens[0];
            profile.sens_r = sens[1];
            let head = take(buf, at, 2);
            profile.flags = ProfileFlags::from_bits(head[0]);
            profile.rule_count = head[1].min(RULES_PER_PROFILE as u8);
            for rule in profile.rules.iter_mut() {
                *rule = decode_rule(buf, at);
            }
        }
        Some(Self {
            usb_output_mode,
            active_profile_index,
            profiles,
        })
    }
}

/// Store failure surfaced to the caller
#[derive(Clone, Copy, PartialEq, Eq, Debug, defmt::Format)]
pub enum StoreError {
    /// The erase/program primitive reported failure
    Program,
    /// The read-back after programming does not match what was written
    Verify,
}

/// Physical access to the dedicated settings sector
pub trait SettingsSector {
    /// Read `buf.len()` bytes from the start of the sector
    fn read(&mut self, buf: &mut [u8]);
    /// Erase the sector and program `data` at its start; synchronous
    fn commit(&mut self, data: &[u8]) -> Result<(), StoreError>;
}

/// Record-level access on top of a [`SettingsSector`]
pub struct SettingsStore<S: SettingsSector> {
    sector: S,
}

impl<S: SettingsSector> SettingsStore<S> {
    pub fn new(sector: S) -> Self {
        Self { sector }
    }

    /// Load the persisted record; `None` means use defaults
    pub fn load(&mut self) -> Option<SettingsRecord> {
        let mut buf = [0u8; RECORD_LEN];
        self.sector.read(&mut buf);
        SettingsRecord::decode(&buf)
    }

    /// Write the record and verify it by reading back
    ///
    /// Must complete before any subsequent read; blocking for the flash
    /// erase/program interval is the one permitted stall in the system.
    pub fn save_now(&mut self, record: &SettingsRecord) -> Result<(), StoreError> {
        let mut buf = [0u8; RECORD_LEN];
        record.encode(&mut buf);
        self.sector.commit(&buf)?;

        let mut check = [0u8; RECORD_LEN];
        self.sector.read(&mut check);
        if check != buf {
            return Err(StoreError::Verify);
        }
        Ok(())
    }
}

/// Scheduler-facing settings state: the RAM copy plus deferred saves
pub struct SettingsService<S: SettingsSector> {
    store: SettingsStore<S>,
    record: SettingsRecord,
    queued: bool,
}

impl<S: SettingsSector> SettingsService<S> {
    /// Load the record, falling back to defaults on a missing/corrupt one
    pub fn new(sector: S) -> Self {
        let mut store = SettingsStore::new(sector);
        let record = match store.load() {
            Some(record) => record,
            None => {
                warn!("No valid settings record, using defaults");
                SettingsRecord::default()
            }
        };
        Self {
            store,
            record,
            queued: false,
        }
    }

    pub fn record(&self) -> &SettingsRecord {
        &self.record
    }

    pub fn record_mut(&mut self) -> &mut SettingsRecord {
        &mut self.record
    }

    /// Ask for the RAM copy to be flushed on the next storage tick
    pub fn queue_save(&mut self) {
        self.queued = true;
    }

    /// Synchronous write of the RAM copy (mode-change path)
    pub fn save_now(&mut self) -> Result<(), StoreError> {
        self.queued = false;
        self.store.save_now(&self.record)
    }

    /// Re-read the persisted record (mode-change verification)
    pub fn reload(&mut self) -> Option<SettingsRecord> {
        self.store.load()
    }

    /// Storage stage of the main loop: flush a deferred save
    pub fn task(&mut self) {
        if self.queued {
            if let Err(e) = self.save_now() {
                error!("Deferred settings save failed: {:?}", e);
            }
        }
    }
}

/// RAM-backed sector for host tests
#[cfg(test)]
pub(crate) struct RamSector {
    pub data: [u8; SECTOR_SIZE],
    pub fail_program: bool,
}

#[cfg(test)]
impl RamSector {
    pub fn new() -> Self {
        Self {
            data: [0xff; SECTOR_SIZE],
            fail_program: false,
        }
    }
}

#[cfg(test)]
impl SettingsSector for RamSector {
    fn read(&mut self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.data[..buf.len()]);
    }

    fn commit(&mut self, data: &[u8]) -> Result<(), StoreError> {
        if self.fail_program {
            return Err(StoreError::Program);
        }
        self.data.fill(0xff);
        self.data[..data.len()].copy_from_slice(data);
        Ok(())
    }
}
