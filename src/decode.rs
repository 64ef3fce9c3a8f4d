//! Classification of received frames into [`Event`]s, updating the
//! [`DeviceSnapshot`] along the way.

use core::fmt;
use core::time::Duration;

use crate::catalog::{self, id, Access, Decode};
use crate::frame::{Frame, FrameBytes, Hex, Malformed, MAX_FRAME_LEN};
use crate::snapshot::{Broadcast, DeviceSnapshot, StatusLine};
use crate::types::{FanControl, Tenths, VariableId, Weekday};

/// CO₂ reading of a missing sensor.
pub const NO_CO2_SENSOR: u16 = 9999;
/// Humidity reading of a missing sensor.
pub const NO_HUMIDITY_SENSOR: u16 = 999;
/// Half-hour slots in a day schedule.
pub const CALENDAR_SLOTS: usize = 48;

/// Something worth telling the user about the bus traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A device acknowledged a write of `var`.
    Acknowledged { var: VariableId },
    /// Fan level for each half hour of `day`.
    Calendar {
        day: Weekday,
        levels: [u8; CALENDAR_SLOTS],
    },
    PreheatTemp(Tenths),
    PreheatEnabled(bool),
    /// Remaining party minutes, 0 if off.
    PartyRemaining(u16),
    PartyTime(u16),
    PartyLevel(u8),
    HoursOn(u32),
    FanVoltage {
        level: u8,
        supply: Tenths,
        exhaust: Tenths,
    },
    Bypass1(Tenths),
    /// Whole degrees.
    Bypass2(u8),
    Fan(FanControl),
    /// Months between filter changes.
    FilterInterval(u8),
    Co2([Option<Tenths>; 4]),
    Humidity([Option<Tenths>; 4]),
    /// Seconds the fans keep running after heating stops.
    RunOnTime(u8),
    /// Remaining quiet minutes, 0 if off.
    QuietRemaining(u16),
    QuietEnabled(u8),
    QuietTime(u8),
    QuietLevel(u8),
    /// A catalogued single value without a dedicated report.
    Value { var: VariableId, value: u32 },
    /// The periodic broadcast combined with the other known values.
    Status(StatusLine),
    /// A broadcast of unexpected size.
    BadBroadcast(usize),
    /// A device frame nothing here knows how to read.
    Unrecognized { idle_ms: u64, raw: FrameBytes },
    /// A frame from an unknown bus participant.
    Unknown { idle_ms: u64, raw: FrameBytes },
    /// A frame that failed validation.
    Ignored { raw: FrameBytes, reason: Malformed },
    /// The receive buffer filled up without an idle gap.
    Overflow,
}

pub(crate) fn copy_raw(raw: &[u8]) -> FrameBytes {
    let mut bytes = FrameBytes::new();
    bytes.extend(raw.iter().copied().take(MAX_FRAME_LEN));
    bytes
}

fn millis(idle: Duration) -> u64 {
    idle.as_millis() as u64
}

fn readings(frame: &Frame<'_>, missing: u16) -> [Option<Tenths>; 4] {
    let mut values = [None; 4];
    for (index, value) in values.iter_mut().enumerate() {
        *value = frame.u16_at(index).filter(|v| *v != missing).map(Tenths);
    }
    values
}

fn calendar(frame: &Frame<'_>) -> Option<Event> {
    let day = Weekday::from_index(frame.variable()?).ok()?;
    let mut levels = [0; CALENDAR_SLOTS];
    for (hour, pair) in levels.chunks_mut(2).enumerate() {
        let byte = frame.u8_at(3 + hour)?;
        pair[0] = byte & 0x0f;
        pair[1] = byte >> 4;
    }
    Some(Event::Calendar { day, levels })
}

/// A write of `var` with the length the catalog gives for it.
fn reports(frame: &Frame<'_>, var: VariableId) -> bool {
    catalog::status_len(var).map_or(false, |len| frame.is_status(var, len))
}

/// Air volume in m³/h the unit moves at a fan voltage given in tenths.
pub fn volume_flow(tenths: u16) -> u16 {
    const STEPS: [(u16, u16); 14] = [
        (1, 0),
        (24, 60),
        (30, 80),
        (37, 100),
        (43, 120),
        (50, 140),
        (56, 160),
        (63, 180),
        (69, 200),
        (76, 220),
        (82, 240),
        (89, 260),
        (95, 280),
        (100, 300),
    ];
    STEPS
        .iter()
        .find(|(below, _)| tenths < *below)
        .map_or(315, |(_, flow)| *flow)
}

/// Classify a valid frame from a device or the broadcast and update `snapshot`.
///
/// Returns `None` for frames that only update the snapshot: the sensor
/// bundle, and in `interactive` mode the values shown on the status line.
pub fn classify(
    frame: &Frame<'_>,
    snapshot: &mut DeviceSnapshot,
    interactive: bool,
    idle: Duration,
) -> Option<Event> {
    let var = frame.variable();
    let u8_value = || frame.u8_at(0).unwrap_or_default();
    let u16_value = || frame.u16_at(0).unwrap_or_default();

    let event = if frame.is_ack() {
        Event::Acknowledged {
            var: var.unwrap_or_default(),
        }
    } else if var.map_or(false, |v| v <= id::CALENDAR_SUN && reports(frame, v)) {
        match calendar(frame) {
            Some(event) => event,
            None => unrecognized(frame, idle),
        }
    } else if reports(frame, id::PREHEAT_TEMP_ALT) || reports(frame, id::PREHEAT_TEMP) {
        Event::PreheatTemp(Tenths(u16_value()))
    } else if reports(frame, id::PARTY_REMAINING) {
        snapshot.set_party_minutes(u16_value());
        if interactive {
            return None;
        }
        Event::PartyRemaining(u16_value())
    } else if reports(frame, id::PARTY_TIME) {
        Event::PartyTime(u16_value())
    } else if reports(frame, id::HOURS_ON) {
        Event::HoursOn(frame.u32_at(0).unwrap_or_default())
    } else if var.map_or(false, |v| {
        (id::FAN_1_VOLTAGE..=id::FAN_4_VOLTAGE).contains(&v) && reports(frame, v)
    }) {
        Event::FanVoltage {
            level: var.unwrap_or_default() - id::FAN_1_VOLTAGE + 1,
            supply: Tenths(u16_value()),
            exhaust: Tenths(frame.u16_at(1).unwrap_or_default()),
        }
    } else if reports(frame, id::BYPASS1_TEMP) {
        snapshot.set_bypass(Tenths(u16_value()));
        if interactive {
            return None;
        }
        Event::Bypass1(Tenths(u16_value()))
    } else if reports(frame, id::FAN_LEVEL) {
        Event::Fan(FanControl::from_bytes(
            u8_value(),
            frame.u8_at(1).unwrap_or_default(),
        ))
    } else if reports(frame, id::FILTER_INTERVAL) {
        Event::FilterInterval(u8_value())
    } else if reports(frame, id::SENSORS_TEMP) {
        let mut temps = [0; 4];
        for (index, temp) in temps.iter_mut().enumerate() {
            *temp = frame.u16_at(index + 1).unwrap_or_default();
        }
        snapshot.set_sensors(temps);
        return None;
    } else if reports(frame, id::SENSORS_CO2) {
        Event::Co2(readings(frame, NO_CO2_SENSOR))
    } else if reports(frame, id::SENSORS_HUMIDITY) {
        Event::Humidity(readings(frame, NO_HUMIDITY_SENSOR))
    } else if reports(frame, id::PARTY_LEVEL) {
        Event::PartyLevel(u8_value())
    } else if reports(frame, id::RUN_ON_TIME) {
        Event::RunOnTime(u8_value())
    } else if reports(frame, id::PREHEAT_ENABLED) {
        Event::PreheatEnabled(u8_value() != 0)
    } else if reports(frame, id::QUIET_REMAINING) {
        snapshot.set_quiet_minutes(u16_value());
        if interactive {
            return None;
        }
        Event::QuietRemaining(u16_value())
    } else if reports(frame, id::QUIET_ENABLED) {
        Event::QuietEnabled(u8_value())
    } else if reports(frame, id::QUIET_TIME) {
        Event::QuietTime(u8_value())
    } else if reports(frame, id::QUIET_LEVEL) {
        Event::QuietLevel(u8_value())
    } else if reports(frame, id::BYPASS2_TEMP) {
        Event::Bypass2(u8_value())
    } else if frame.is_broadcast() {
        match Broadcast::from_frame(frame) {
            Some(broadcast) => {
                snapshot.apply_broadcast(broadcast);
                Event::Status(snapshot.status_line()?)
            }
            None => Event::BadBroadcast(frame.len()),
        }
    } else if let Some(entry) = var.filter(|v| reports(frame, *v)).and_then(catalog::lookup) {
        match entry.read(frame.value()) {
            Some(value) => Event::Value {
                var: entry.id,
                value,
            },
            None => unrecognized(frame, idle),
        }
    } else {
        unrecognized(frame, idle)
    };
    Some(event)
}

fn unrecognized(frame: &Frame<'_>, idle: Duration) -> Event {
    Event::Unrecognized {
        idle_ms: millis(idle),
        raw: copy_raw(frame.raw()),
    }
}

/// Report for a frame from outside the device range, `None` for the pings of
/// other panels.
pub fn foreign(frame: &Frame<'_>, idle: Duration) -> Option<Event> {
    if frame.is_foreign_ping() {
        return None;
    }
    Some(Event::Unknown {
        idle_ms: millis(idle),
        raw: copy_raw(frame.raw()),
    })
}

fn without_checksum(raw: &[u8]) -> &[u8] {
    raw.split_last().map_or(raw, |(_, rest)| rest)
}

fn write_readings(f: &mut fmt::Formatter<'_>, values: &[Option<Tenths>]) -> fmt::Result {
    for value in values.iter().flatten() {
        write!(f, " {}", value)?;
    }
    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

fn write_remaining(f: &mut fmt::Formatter<'_>, mode: &str, minutes: u16) -> fmt::Result {
    if minutes == 0 {
        write!(f, "{} disabled", mode)
    } else {
        write!(f, "{} enabled for {}min", mode, minutes)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Acknowledged { var } => {
                write!(f, "ack '{}' ({:02x}) written", catalog::name(*var), var)
            }
            Event::Calendar { day, levels } => {
                writeln!(f, "calendar {}", day.abbrev())?;
                for level in levels.iter() {
                    match level {
                        1 => f.write_str("__")?,
                        2 => f.write_str("——")?,
                        3 => f.write_str("‾‾")?,
                        other => write!(f, "{:2}", other)?,
                    }
                }
                writeln!(f)?;
                for hour in 0..CALENDAR_SLOTS / 2 {
                    write!(f, "{:<4}", hour)?;
                }
                Ok(())
            }
            Event::PreheatTemp(temp) => write!(f, "pre-heating = {}°C", temp),
            Event::PreheatEnabled(on) => write!(f, "pre-heating = {}", enabled(*on)),
            Event::PartyRemaining(minutes) => write_remaining(f, "party", *minutes),
            Event::PartyTime(minutes) => write!(f, "party time = {}min", minutes),
            Event::PartyLevel(level) => write!(f, "party level = {}", level),
            Event::HoursOn(hours) => {
                let tenths_of_years = hours.saturating_mul(10) / (365 * 24);
                write!(
                    f,
                    "hours on = {}h ({}.{}yrs)",
                    hours,
                    tenths_of_years / 10,
                    tenths_of_years % 10
                )
            }
            Event::FanVoltage {
                level,
                supply,
                exhaust,
            } => write!(
                f,
                "voltage fan {} = {}V ({}m³/h) / {}V ({}m³/h)",
                level,
                supply,
                volume_flow(supply.get()),
                exhaust,
                volume_flow(exhaust.get())
            ),
            Event::Bypass1(temp) => write!(f, "bypass1 = {}°C", temp),
            Event::Bypass2(degrees) => write!(f, "bypass2 = {}°C", degrees),
            Event::Fan(control) => match control {
                FanControl::NoChange => f.write_str("fan no change"),
                FanControl::Manual => f.write_str("set fan MANUAL"),
                FanControl::Auto => f.write_str("set fan AUTO"),
                FanControl::Mode(mode) => write!(f, "set fan AUTO/MANUAL {}", mode),
                FanControl::Level(level) => write!(f, "set fan LEVEL {}", level),
                FanControl::Other(level, other) => write!(f, "set fan LEVEL {} {}", level, other),
            },
            Event::FilterInterval(months) => write!(f, "change filter = {}mth", months),
            Event::Co2(values) => {
                f.write_str("CO₂")?;
                write_readings(f, values)
            }
            Event::Humidity(values) => {
                f.write_str("humidity")?;
                write_readings(f, values)
            }
            Event::RunOnTime(seconds) => write!(f, "run-on time = {}s", seconds),
            Event::QuietRemaining(minutes) => write_remaining(f, "quiet", *minutes),
            Event::QuietEnabled(flag) => write!(f, "set quiet {} ({})", enabled(*flag != 0), flag),
            Event::QuietTime(minutes) => write!(f, "quiet time = {}min", minutes),
            Event::QuietLevel(level) => write!(f, "quiet level = {}", level),
            Event::Value { var, value } => {
                let entry = catalog::lookup(*var);
                if entry.map_or(false, |entry| entry.access == Access::WriteOnly) {
                    f.write_str("set ")?;
                }
                write!(f, "'{}' = ", catalog::name(*var))?;
                match entry.map(|entry| entry.decode) {
                    Some(Decode::Tenths) => write!(f, "{}", Tenths(*value as u16)),
                    Some(Decode::ControlWord) => write!(f, "{:#06x}", value),
                    _ => write!(f, "{}", value),
                }
            }
            Event::Status(line) => write!(f, "{}", line),
            Event::BadBroadcast(len) => write!(f, "wrong broadcast size {}", len),
            Event::Unrecognized { idle_ms, raw } => write!(
                f,
                "{:4}ms ({:02x}) {}",
                idle_ms,
                raw.first().copied().unwrap_or_default(),
                Hex(without_checksum(raw))
            ),
            Event::Unknown { idle_ms, raw } => {
                write!(f, "{:4}ms unknown {}", idle_ms, Hex(without_checksum(raw)))
            }
            Event::Ignored { raw, .. } => write!(f, "ignoring {}", Hex(raw)),
            Event::Overflow => f.write_str("Buffer overflow"),
        }
    }
}
