//! This module defines range-checked types for bus addresses, frame kinds
//! and the small numeric domains of the ventilation unit, meant to keep
//! magic numbers out of the protocol engine.

use snafu::{ensure, OptionExt, Snafu};

use core::convert::{TryFrom, TryInto};
use core::fmt;
use core::ops::{Deref, RangeInclusive};

/// Error type for this module
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The value isn't one of the device addresses 0x10..=0x13.
    #[snafu(display("Invalid address"))]
    InvalidAddress,
    /// The value isn't a known frame kind.
    #[snafu(display("Invalid frame kind"))]
    InvalidKind,
    /// The value isn't a fan level.
    #[snafu(display("Invalid fan level"))]
    InvalidFanLevel,
    /// The value isn't a weekday index 0..=6.
    #[snafu(display("Invalid weekday"))]
    InvalidWeekday,
}

const fn invalid_address() -> InvalidAddressSnafu {
    InvalidAddressSnafu
}

/// One-byte protocol variable index.
pub type VariableId = u8;

const ADDR_RANGE: RangeInclusive<u8> = 0x10..=0x13;

/// Address is a range-checked \[0x10, 0x13\] integer, representing a device on the bus.
///
/// ## Example
/// ```
/// use kwl_bus::Address;
/// use std::convert::TryInto;
/// let addr = Address::new(0x13).unwrap();
/// let addr: Address = 0x13u8.try_into().unwrap();
/// ```
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct Address(u8);

/// Create a new [`Address`], panics if it is out of range.
pub const fn addr(a: u8) -> Address {
    if a >= 0x10 && a <= 0x13 {
        return Address(a);
    }
    panic!("Invalid address.")
}

/// The address this application impersonates when it transmits.
pub const OWN_ADDRESS: Address = addr(0x13);

impl Address {
    /// Create a new address, checking that the address is in \[0x10, 0x13\].
    /// # Errors
    /// Returns [`Error::InvalidAddress`] if `address` is out of range.
    pub fn new(address: impl TryInto<u8>) -> Result<Self, Error> {
        let address = address.try_into().ok().with_context(invalid_address)?;
        ensure!(ADDR_RANGE.contains(&address), invalid_address());
        Ok(Self(address))
    }

    pub const fn as_byte(self) -> u8 {
        self.0
    }
}

impl Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<u8> for Address {
    fn eq(&self, other: &u8) -> bool {
        self.0 == *other
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Frame kind, the second header byte.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum Kind {
    /// Read request, or keepalive ping when the frame has no payload.
    Read,
    /// Write, or a status reply carrying a value.
    Write,
    /// Acknowledgement of a write.
    Acknowledge,
}

impl Kind {
    pub const fn as_byte(self) -> u8 {
        match self {
            Kind::Read => 0,
            Kind::Write => 1,
            Kind::Acknowledge => 5,
        }
    }
}

impl TryFrom<u8> for Kind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Kind::Read),
            1 => Ok(Kind::Write),
            5 => Ok(Kind::Acknowledge),
            _ => InvalidKindSnafu.fail(),
        }
    }
}

/// A quantity in tenths, e.g. 195 is 19.5 °C or 19.5 V.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
pub struct Tenths(pub u16);

impl Tenths {
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

/// Whether the unit picks its fan level itself.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum FanMode {
    Manual,
    Auto,
}

/// Highest fan level the unit knows.
pub const MAX_FAN_LEVEL: u8 = 4;

/// Check that `level` is a fan level in \[0, 4\].
/// # Errors
/// Returns [`Error::InvalidFanLevel`] otherwise.
pub fn fan_level(level: impl TryInto<u8>) -> Result<u8, Error> {
    let level = level.try_into().ok().context(InvalidFanLevelSnafu)?;
    ensure!(level <= MAX_FAN_LEVEL, InvalidFanLevelSnafu);
    Ok(level)
}

const FAN_SELECT: u8 = 0xaa;
const FAN_KEEP: u8 = 0xbb;

/// The two-byte control word written to (and echoed by) the fan level variable.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum FanControl {
    /// `aa 00`: switch to manual mode.
    Manual,
    /// `aa 01`: switch to auto mode.
    Auto,
    /// `aa bb`: leave everything as is.
    NoChange,
    /// `aa xx`: mode byte the unit doesn't document.
    Mode(u8),
    /// `ll bb`: set the numeric level.
    Level(u8),
    /// `ll xx`: level with an unexpected second byte.
    Other(u8, u8),
}

impl FanControl {
    pub fn from_bytes(first: u8, second: u8) -> Self {
        match (first, second) {
            (FAN_SELECT, 0) => FanControl::Manual,
            (FAN_SELECT, 1) => FanControl::Auto,
            (FAN_SELECT, FAN_KEEP) => FanControl::NoChange,
            (FAN_SELECT, mode) => FanControl::Mode(mode),
            (level, FAN_KEEP) => FanControl::Level(level),
            (level, other) => FanControl::Other(level, other),
        }
    }

    pub const fn to_bytes(self) -> [u8; 2] {
        match self {
            FanControl::Manual => [FAN_SELECT, 0],
            FanControl::Auto => [FAN_SELECT, 1],
            FanControl::NoChange => [FAN_SELECT, FAN_KEEP],
            FanControl::Mode(mode) => [FAN_SELECT, mode],
            FanControl::Level(level) => [level, FAN_KEEP],
            FanControl::Other(level, other) => [level, other],
        }
    }

    /// The control word as the 16-bit little-endian value sent on the wire.
    pub const fn to_word(self) -> u16 {
        let [lo, hi] = self.to_bytes();
        (hi as u16) << 8 | lo as u16
    }
}

/// Day of the week, as used by the calendar variables and the broadcast.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone, Hash)]
pub enum Weekday {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

impl Weekday {
    /// Weekday from its index, Monday being 0.
    /// # Errors
    /// Returns [`Error::InvalidWeekday`] if `index` is above 6.
    pub fn from_index(index: impl TryInto<usize>) -> Result<Self, Error> {
        let index = index.try_into().ok().context(InvalidWeekdaySnafu)?;
        WEEKDAYS.get(index).copied().context(InvalidWeekdaySnafu)
    }

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn abbrev(self) -> &'static str {
        match self {
            Weekday::Mon => "Mon",
            Weekday::Tue => "Tue",
            Weekday::Wed => "Wed",
            Weekday::Thu => "Thu",
            Weekday::Fri => "Fri",
            Weekday::Sat => "Sat",
            Weekday::Sun => "Sun",
        }
    }
}
