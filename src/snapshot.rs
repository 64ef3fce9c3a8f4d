//! The application's cached view of the unit, see [`DeviceSnapshot`].

use arrayvec::ArrayVec;
use core::fmt;

use crate::frame::Frame;
use crate::types::{FanMode, Tenths, Weekday};

/// Temperature reported for a sensor that isn't fitted.
pub const NO_SENSOR: u16 = 9990;
/// Size of the periodic status broadcast.
pub const BROADCAST_LEN: usize = 27;

/// The four temperature sensors, in the order of the sensor bundle.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Sensor {
    /// Outside air entering the unit.
    Outdoor,
    /// Air extracted from the rooms.
    Extract,
    /// Air leaving the building.
    Exhaust,
    /// Air supplied to the rooms.
    Supply,
}

impl Sensor {
    /// Order used on the status line.
    pub const DISPLAY_ORDER: [Sensor; 4] =
        [Sensor::Outdoor, Sensor::Supply, Sensor::Extract, Sensor::Exhaust];

    pub const fn symbol(self) -> &'static str {
        match self {
            Sensor::Outdoor => "↓",
            Sensor::Extract => "←",
            Sensor::Exhaust => "↑",
            Sensor::Supply => "→",
        }
    }
}

/// A retained copy of the 27-byte status broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    raw: ArrayVec<u8, BROADCAST_LEN>,
}

impl Broadcast {
    /// Copy a broadcast frame, `None` if it doesn't have the broadcast size.
    pub fn from_frame(frame: &Frame<'_>) -> Option<Self> {
        if !frame.is_broadcast() || frame.len() != BROADCAST_LEN {
            return None;
        }
        let mut raw = ArrayVec::new();
        raw.try_extend_from_slice(frame.raw()).ok()?;
        Some(Self { raw })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn day(&self) -> u8 {
        self.raw[3]
    }

    pub fn weekday(&self) -> Option<Weekday> {
        Weekday::from_index(self.raw[4]).ok()
    }

    pub fn month(&self) -> u8 {
        self.raw[5]
    }

    /// Two-digit year.
    pub fn year(&self) -> u8 {
        self.raw[6]
    }

    pub fn hour(&self) -> u8 {
        self.raw[7]
    }

    pub fn minute(&self) -> u8 {
        self.raw[8]
    }

    pub fn fan_level(&self) -> u8 {
        self.raw[9]
    }

    pub fn fan_mode(&self) -> FanMode {
        if self.raw[10] > 0 {
            FanMode::Auto
        } else {
            FanMode::Manual
        }
    }
}

/// Latest known values of the variables the engine tracks.
///
/// Everything starts out unknown and only becomes concrete once the
/// matching variable has been seen on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceSnapshot {
    fan_level: Option<u8>,
    fan_mode: Option<FanMode>,
    bypass: Option<Tenths>,
    party_minutes: u16,
    quiet_minutes: u16,
    sensors: [Option<Tenths>; 4],
    last_broadcast: Option<Broadcast>,
}

impl DeviceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fan_level(&self) -> Option<u8> {
        self.fan_level
    }

    pub fn fan_mode(&self) -> Option<FanMode> {
        self.fan_mode
    }

    pub fn set_fan(&mut self, level: u8, mode: FanMode) {
        self.fan_level = Some(level);
        self.fan_mode = Some(mode);
    }

    /// Forget the fan state so the next report refreshes it.
    pub fn invalidate_fan(&mut self) {
        self.fan_level = None;
        self.fan_mode = None;
    }

    pub fn bypass(&self) -> Option<Tenths> {
        self.bypass
    }

    pub fn set_bypass(&mut self, temp: Tenths) {
        self.bypass = Some(temp);
    }

    /// Remaining party minutes, 0 if party mode is off.
    pub fn party_minutes(&self) -> u16 {
        self.party_minutes
    }

    pub fn set_party_minutes(&mut self, minutes: u16) {
        self.party_minutes = minutes;
    }

    /// Remaining quiet minutes, 0 if quiet mode is off.
    pub fn quiet_minutes(&self) -> u16 {
        self.quiet_minutes
    }

    pub fn set_quiet_minutes(&mut self, minutes: u16) {
        self.quiet_minutes = minutes;
    }

    pub fn sensor(&self, sensor: Sensor) -> Option<Tenths> {
        self.sensors[sensor as usize]
    }

    /// Store raw sensor readings; [`NO_SENSOR`] marks a missing sensor.
    pub fn set_sensors(&mut self, raw: [u16; 4]) {
        for (slot, value) in self.sensors.iter_mut().zip(raw.iter()) {
            *slot = if *value == NO_SENSOR {
                None
            } else {
                Some(Tenths(*value))
            };
        }
    }

    pub fn last_broadcast(&self) -> Option<&Broadcast> {
        self.last_broadcast.as_ref()
    }

    /// Keep the broadcast and take the fan state from it.
    pub fn apply_broadcast(&mut self, broadcast: Broadcast) {
        self.set_fan(broadcast.fan_level(), broadcast.fan_mode());
        self.last_broadcast = Some(broadcast);
    }

    /// Status line for the last broadcast combined with the other known values.
    pub fn status_line(&self) -> Option<StatusLine> {
        let broadcast = self.last_broadcast.clone()?;
        Some(StatusLine {
            broadcast,
            sensors: self.sensors,
            bypass: self.bypass,
            party_minutes: self.party_minutes,
            quiet_minutes: self.quiet_minutes,
        })
    }
}

/// One line summarising the unit, rendered whenever a broadcast arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub broadcast: Broadcast,
    pub sensors: [Option<Tenths>; 4],
    pub bypass: Option<Tenths>,
    pub party_minutes: u16,
    pub quiet_minutes: u16,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.broadcast;
        write!(
            f,
            "{} {:02}.{:02}.20{:02} {}:{:02} {}/{}",
            b.weekday().map_or("???", Weekday::abbrev),
            b.day(),
            b.month(),
            b.year(),
            b.hour(),
            b.minute(),
            match b.fan_mode() {
                FanMode::Auto => "auto",
                FanMode::Manual => "MANUAL",
            },
            b.fan_level()
        )?;
        for sensor in Sensor::DISPLAY_ORDER.iter() {
            if let Some(temp) = self.sensors[*sensor as usize] {
                write!(f, " {}{}°C", sensor.symbol(), temp)?;
            }
        }
        if let Some(bypass) = self.bypass {
            write!(f, " bypass {}°C", bypass)?;
        }
        if self.party_minutes != 0 {
            write!(f, " party {}min", self.party_minutes)?;
        }
        if self.quiet_minutes != 0 {
            write!(f, " quiet {}min", self.quiet_minutes)?;
        }
        Ok(())
    }
}
