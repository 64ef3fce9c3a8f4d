//! Static table of the variables the ventilation unit is known to expose.

use crate::types::VariableId;

/// Variable ids, named after what they hold.
pub mod id {
    use crate::types::VariableId;

    pub const CALENDAR_MON: VariableId = 0x00;
    pub const CALENDAR_SUN: VariableId = 0x06;
    pub const TIME_OF_DAY: VariableId = 0x08;
    pub const PREHEAT_TEMP_ALT: VariableId = 0x0e;
    pub const PARTY_ENABLED: VariableId = 0x0f;
    pub const PARTY_REMAINING: VariableId = 0x10;
    pub const PARTY_TIME: VariableId = 0x11;
    pub const HOURS_ON: VariableId = 0x15;
    pub const FAN_1_VOLTAGE: VariableId = 0x16;
    pub const FAN_4_VOLTAGE: VariableId = 0x19;
    pub const BYPASS1_TEMP: VariableId = 0x1e;
    pub const FAN_LEVEL: VariableId = 0x35;
    pub const FILTER_INTERVAL: VariableId = 0x38;
    pub const SENSORS_TEMP: VariableId = 0x3a;
    pub const SENSORS_CO2: VariableId = 0x3b;
    pub const SENSORS_HUMIDITY: VariableId = 0x3c;
    pub const PARTY_LEVEL: VariableId = 0x42;
    pub const RUN_ON_TIME: VariableId = 0x49;
    pub const PREHEAT_ENABLED: VariableId = 0x4f;
    pub const PREHEAT_TEMP: VariableId = 0x50;
    pub const QUIET_REMAINING: VariableId = 0x54;
    pub const QUIET_ENABLED: VariableId = 0x55;
    pub const QUIET_TIME: VariableId = 0x56;
    pub const QUIET_LEVEL: VariableId = 0x57;
    pub const BYPASS2_TEMP: VariableId = 0x60;
}

/// How many bytes a variable's value takes on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Width {
    /// A single value of 1, 2, 3 or 4 bytes.
    Bytes(u8),
    /// A bulk record of `count` elements, `width` bytes each.
    Array { count: u8, width: u8 },
}

impl Width {
    pub const fn byte_len(self) -> usize {
        match self {
            Width::Bytes(n) => n as usize,
            Width::Array { count, width } => count as usize * width as usize,
        }
    }
}

/// How to interpret a variable's raw value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decode {
    /// Plain integer: minutes, hours, months, levels, flags.
    Raw,
    /// Physical quantity in tenths (°C or V).
    Tenths,
    /// Bit-packed control word.
    ControlWord,
    /// Day schedule, two half-hour levels per byte.
    Schedule,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// One row of the catalog.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VariableEntry {
    pub id: VariableId,
    pub name: &'static str,
    pub width: Width,
    pub decode: Decode,
    pub access: Access,
}

const fn entry(
    id: VariableId,
    name: &'static str,
    width: Width,
    decode: Decode,
    access: Access,
) -> VariableEntry {
    VariableEntry {
        id,
        name,
        width,
        decode,
        access,
    }
}

use Access::{ReadOnly, ReadWrite, WriteOnly};
use Decode::{ControlWord, Raw, Schedule};

const B1: Width = Width::Bytes(1);
const B2: Width = Width::Bytes(2);
const B3: Width = Width::Bytes(3);
const B4: Width = Width::Bytes(4);
/// Three leading bytes, then 24 bytes holding two half-hour levels each.
const DAY: Width = Width::Array { count: 27, width: 1 };
const FAN_VOLTS: Width = Width::Array { count: 2, width: 2 };

// Sorted by id, lookup() relies on it.
static CATALOG: [VariableEntry; 47] = [
    entry(0x00, "calendar monday", DAY, Schedule, ReadWrite),
    entry(0x01, "calendar tuesday", DAY, Schedule, ReadWrite),
    entry(0x02, "calendar wednesday", DAY, Schedule, ReadWrite),
    entry(0x03, "calendar thursday", DAY, Schedule, ReadWrite),
    entry(0x04, "calendar friday", DAY, Schedule, ReadWrite),
    entry(0x05, "calendar saturday", DAY, Schedule, ReadWrite),
    entry(0x06, "calendar sunday", DAY, Schedule, ReadWrite),
    entry(0x07, "date month year", B3, Raw, ReadWrite),
    entry(0x08, "time hour min", B2, Raw, ReadWrite),
    entry(0x0d, "back up heating", B1, Raw, ReadWrite),
    entry(0x0e, "preheating temperatur", B2, Decode::Tenths, ReadOnly),
    entry(0x0f, "party enabled", B1, Raw, WriteOnly),
    entry(0x10, "party current time", B2, Raw, ReadOnly),
    entry(0x11, "party time", B2, Raw, ReadWrite),
    entry(0x14, "external contact", B1, Raw, ReadOnly),
    entry(0x15, "hours on", B4, Raw, ReadOnly),
    entry(0x16, "fan 1 voltage", FAN_VOLTS, Decode::Tenths, ReadWrite),
    entry(0x17, "fan 2 voltage", FAN_VOLTS, Decode::Tenths, ReadWrite),
    entry(0x18, "fan 3 voltage", FAN_VOLTS, Decode::Tenths, ReadWrite),
    entry(0x19, "fan 4 voltage", FAN_VOLTS, Decode::Tenths, ReadWrite),
    entry(0x1a, "vacation start", B3, Raw, ReadWrite),
    entry(0x1b, "vacation end", B3, Raw, ReadWrite),
    entry(0x1e, "bypass1 temperature", B2, Decode::Tenths, ReadWrite),
    entry(0x1f, "frostschutz", B2, Decode::Tenths, ReadWrite),
    entry(0x21, "week offset co2", B1, Raw, ReadWrite),
    entry(0x22, "week offset humdty", B1, Raw, ReadWrite),
    entry(0x23, "week offset temp", B1, Raw, ReadWrite),
    entry(0x35, "fan level", B2, ControlWord, ReadWrite),
    entry(0x37, "minimum fan level", B1, Raw, ReadWrite),
    entry(0x38, "change filter", B1, Raw, ReadWrite),
    entry(0x3a, "sensors temperature", Width::Array { count: 10, width: 2 }, Decode::Tenths, ReadOnly),
    entry(0x3b, "sensors co2", Width::Array { count: 4, width: 2 }, Decode::Tenths, ReadOnly),
    entry(0x3c, "sensors humidity", Width::Array { count: 4, width: 2 }, Decode::Tenths, ReadOnly),
    entry(0x42, "party level", B1, Raw, ReadWrite),
    entry(0x45, "zuluft level", B1, Raw, ReadWrite),
    entry(0x46, "abluft level", B1, Raw, ReadWrite),
    entry(0x48, "software version", B2, Raw, ReadOnly),
    entry(0x49, "nachlaufzeit", B1, Raw, ReadWrite),
    entry(0x4e, "vacation enabled", B1, Raw, ReadWrite),
    entry(0x4f, "preheating enabled", B1, Raw, ReadWrite),
    entry(0x50, "preheating temperature", B2, Decode::Tenths, ReadWrite),
    entry(0x52, "week offset enabled", B1, Raw, ReadWrite),
    entry(0x54, "quiet current time", B2, Raw, ReadOnly),
    entry(0x55, "quiet enabled", B1, Raw, WriteOnly),
    entry(0x56, "quiet time", B1, Raw, ReadWrite),
    entry(0x57, "quiet_level", B1, Raw, ReadWrite),
    entry(0x60, "bypass2 temperature", B1, Raw, ReadOnly),
];

/// Find the catalog row of a variable.
pub fn lookup(id: VariableId) -> Option<&'static VariableEntry> {
    CATALOG
        .binary_search_by_key(&id, |entry| entry.id)
        .ok()
        .map(|index| &CATALOG[index])
}

/// Human readable name of a variable, "unknown" if it isn't catalogued.
pub fn name(id: VariableId) -> &'static str {
    lookup(id).map_or("unknown", |entry| entry.name)
}

/// Declared length of a value report of `id`: the variable byte plus its value.
pub fn status_len(id: VariableId) -> Option<u8> {
    lookup(id).map(|entry| entry.width.byte_len() as u8 + 1)
}

impl VariableEntry {
    /// The value of a single-valued variable from its little-endian bytes.
    /// `None` for bulk records and when `bytes` is too short.
    pub fn read(&self, bytes: &[u8]) -> Option<u32> {
        let len = match self.width {
            Width::Bytes(len) => len as usize,
            Width::Array { .. } => return None,
        };
        let bytes = bytes.get(..len)?;
        Some(
            bytes
                .iter()
                .rev()
                .fold(0, |value, byte| value << 8 | u32::from(*byte)),
        )
    }
}

/// All catalogued variables, ordered by id.
pub fn entries() -> &'static [VariableEntry] {
    &CATALOG
}
