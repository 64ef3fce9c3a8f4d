//! Decides, one granted turn at a time, which single command to put on the bus.
//!
//! Intents enter as [`Request`]s. Every turn the pending writes are checked
//! in [`WRITE_PRIORITY`] order, then the pending reads in [`READ_PRIORITY`]
//! order, and the first one that applies produces the command for this turn.
//! When nothing is pending the sequencer either asks to terminate or, in
//! continuous mode, falls back to low-frequency background polling.

use arrayvec::ArrayVec;

use crate::catalog::id;
use crate::frame::Command;
use crate::snapshot::DeviceSnapshot;
use crate::types::{FanControl, FanMode, VariableId, Weekday, MAX_FAN_LEVEL};

/// Bypass temperature below which a toggle switches to the high setting.
pub const BYPASS_TOGGLE_THRESHOLD: u16 = 200;
/// Bypass target in °C when toggling from a low setting.
pub const BYPASS_HIGH: u8 = 28;
/// Bypass target in °C when toggling from a high setting.
pub const BYPASS_LOW: u8 = 18;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BypassRequest {
    /// Switch between [`BYPASS_HIGH`] and [`BYPASS_LOW`] based on the current setting.
    Toggle,
    /// Absolute temperature in °C.
    Degrees(u8),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FanRequest {
    Auto,
    /// Set a numeric level, switching auto mode off in a separate step first
    /// if `disable_auto` is set.
    Manual { level: u8, disable_auto: bool },
    Up,
    Down,
}

/// Party or quiet mode.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimerRequest {
    Off,
    On,
    /// Store the duration in minutes, then switch on.
    For(u16),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BypassRead {
    /// Second bypass temperature, then the first.
    Both,
    /// Only the first bypass temperature.
    Primary,
}

/// Something the user wants done on the unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Request {
    SetTime { hour: u8, minute: u8 },
    SetBypass(BypassRequest),
    SetFan(FanRequest),
    SetParty(TimerRequest),
    SetQuiet(TimerRequest),
    /// Fan voltage of `level` (1..=4) in tenths of a volt, for both fans.
    SetVoltage { level: u8, tenths: u16 },
    GetBypass(BypassRead),
    GetHoursOn,
    GetVoltages,
    GetPartyRemaining,
    GetPartyTime,
    GetPartyLevel,
    GetQuietRemaining,
    GetQuietTime,
    GetQuietLevel,
    GetCalendar(Weekday),
    GetPreheating,
    GetRunOnTime,
    GetFilterInterval,
}

/// What to do with a granted turn.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Turn {
    /// Let the turn pass.
    Idle,
    Send(Command),
    /// Nothing left to do and not running continuously.
    Terminate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteSlot {
    Time,
    Bypass,
    Fan,
    Party,
    Quiet,
    Voltage,
}

/// Pending writes, highest priority first.
pub const WRITE_PRIORITY: [WriteSlot; 6] = [
    WriteSlot::Time,
    WriteSlot::Bypass,
    WriteSlot::Fan,
    WriteSlot::Party,
    WriteSlot::Quiet,
    WriteSlot::Voltage,
];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReadSlot {
    Bypass,
    HoursOn,
    Voltages,
    PartyRemaining,
    PartyTime,
    PartyLevel,
    QuietRemaining,
    QuietTime,
    QuietLevel,
    Calendar,
    Preheating,
    RunOnTime,
    FilterInterval,
}

/// Pending reads, highest priority first.
pub const READ_PRIORITY: [ReadSlot; 13] = [
    ReadSlot::Bypass,
    ReadSlot::HoursOn,
    ReadSlot::Voltages,
    ReadSlot::PartyRemaining,
    ReadSlot::PartyTime,
    ReadSlot::PartyLevel,
    ReadSlot::QuietRemaining,
    ReadSlot::QuietTime,
    ReadSlot::QuietLevel,
    ReadSlot::Calendar,
    ReadSlot::Preheating,
    ReadSlot::RunOnTime,
    ReadSlot::FilterInterval,
];

/// Variables still to be read for one read slot, in order.
type ReadQueue = ArrayVec<VariableId, 4>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Step {
    Up,
    Down,
}

/// Pending fan write, including the second half of two-step writes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FanWrite {
    Auto,
    DisableAutoThen(u8),
    Level(u8),
    Step(Step),
}

/// Pending party or quiet write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum TimerWrite {
    Off,
    On,
    Duration(u16),
}

impl From<TimerRequest> for TimerWrite {
    fn from(request: TimerRequest) -> Self {
        match request {
            TimerRequest::Off | TimerRequest::For(0) => TimerWrite::Off,
            TimerRequest::On => TimerWrite::On,
            TimerRequest::For(minutes) => TimerWrite::Duration(minutes),
        }
    }
}

/// Variables of a timer mode: the enable flag and the duration.
#[derive(Debug, Copy, Clone)]
struct TimerVars {
    enabled: VariableId,
    time: VariableId,
}

const PARTY: TimerVars = TimerVars {
    enabled: id::PARTY_ENABLED,
    time: id::PARTY_TIME,
};

const QUIET: TimerVars = TimerVars {
    enabled: id::QUIET_ENABLED,
    time: id::QUIET_TIME,
};

/// Result of checking one write slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Outcome {
    /// Nothing pending in this slot.
    Skip,
    /// The slot consumed the turn without sending anything.
    Wait,
    Send(Command),
}

/// The priority state machine run on each granted turn.
#[derive(Debug, Clone)]
pub struct CommandSequencer {
    continuous: bool,
    turns: u32,
    bootstrap: bool,
    time: Option<u16>,
    bypass: Option<BypassRequest>,
    fan: Option<FanWrite>,
    party: Option<TimerWrite>,
    quiet: Option<TimerWrite>,
    voltage: Option<(u8, u16)>,
    reads: [ReadQueue; 13],
}

impl Default for CommandSequencer {
    fn default() -> Self {
        Self::new(false)
    }
}

impl CommandSequencer {
    /// A sequencer that terminates once its requests are done, or keeps
    /// polling if `continuous` is set.
    pub fn new(continuous: bool) -> Self {
        Self {
            continuous,
            turns: 0,
            bootstrap: true,
            time: None,
            bypass: None,
            fan: None,
            party: None,
            quiet: None,
            voltage: None,
            reads: Default::default(),
        }
    }

    /// Number of turns granted so far.
    pub fn turns(&self) -> u32 {
        self.turns
    }

    /// Queue a request. A request replaces any pending request of the same slot.
    pub fn request(&mut self, request: Request) {
        log::debug!("Request {:?}", request);
        match request {
            Request::SetTime { hour, minute } => {
                self.time = Some(u16::from(hour) | u16::from(minute) << 8)
            }
            Request::SetBypass(bypass) => self.bypass = Some(bypass),
            Request::SetFan(fan) => {
                self.fan = Some(match fan {
                    FanRequest::Auto => FanWrite::Auto,
                    FanRequest::Manual {
                        level,
                        disable_auto: true,
                    } => FanWrite::DisableAutoThen(level),
                    FanRequest::Manual { level, .. } => FanWrite::Level(level),
                    FanRequest::Up => FanWrite::Step(Step::Up),
                    FanRequest::Down => FanWrite::Step(Step::Down),
                })
            }
            Request::SetParty(party) => self.party = Some(party.into()),
            Request::SetQuiet(quiet) => self.quiet = Some(quiet.into()),
            Request::SetVoltage { level, tenths } => self.voltage = Some((level, tenths)),
            Request::GetBypass(BypassRead::Both) => {
                self.queue(ReadSlot::Bypass, &[id::BYPASS2_TEMP, id::BYPASS1_TEMP])
            }
            Request::GetBypass(BypassRead::Primary) => {
                self.queue(ReadSlot::Bypass, &[id::BYPASS1_TEMP])
            }
            Request::GetHoursOn => self.queue(ReadSlot::HoursOn, &[id::HOURS_ON]),
            Request::GetVoltages => {
                let fans: ArrayVec<VariableId, 4> = (id::FAN_1_VOLTAGE..=id::FAN_4_VOLTAGE).collect();
                self.queue(ReadSlot::Voltages, &fans)
            }
            Request::GetPartyRemaining => {
                self.queue(ReadSlot::PartyRemaining, &[id::PARTY_REMAINING])
            }
            Request::GetPartyTime => self.queue(ReadSlot::PartyTime, &[id::PARTY_TIME]),
            Request::GetPartyLevel => self.queue(ReadSlot::PartyLevel, &[id::PARTY_LEVEL]),
            Request::GetQuietRemaining => {
                self.queue(ReadSlot::QuietRemaining, &[id::QUIET_REMAINING])
            }
            Request::GetQuietTime => self.queue(ReadSlot::QuietTime, &[id::QUIET_TIME]),
            Request::GetQuietLevel => self.queue(ReadSlot::QuietLevel, &[id::QUIET_LEVEL]),
            Request::GetCalendar(day) => {
                self.queue(ReadSlot::Calendar, &[id::CALENDAR_MON + day.index()])
            }
            Request::GetPreheating => self.queue(
                ReadSlot::Preheating,
                &[id::PREHEAT_ENABLED, id::PREHEAT_TEMP],
            ),
            Request::GetRunOnTime => self.queue(ReadSlot::RunOnTime, &[id::RUN_ON_TIME]),
            Request::GetFilterInterval => {
                self.queue(ReadSlot::FilterInterval, &[id::FILTER_INTERVAL])
            }
        }
    }

    fn queue(&mut self, slot: ReadSlot, vars: &[VariableId]) {
        let queue = &mut self.reads[slot as usize];
        queue.clear();
        queue.extend(vars.iter().copied());
    }

    /// Whether any write or read is still waiting for a turn.
    pub fn has_pending(&self) -> bool {
        self.bootstrap
            || self.time.is_some()
            || self.bypass.is_some()
            || self.fan.is_some()
            || self.party.is_some()
            || self.quiet.is_some()
            || self.voltage.is_some()
            || self.reads.iter().any(|queue| !queue.is_empty())
    }

    /// Decide what to do with the turn just granted. Emits at most one command.
    pub fn on_turn_granted(&mut self, snapshot: &mut DeviceSnapshot) -> Turn {
        self.turns = self.turns.wrapping_add(1);
        if self.turns < 2 {
            // the bus state is unknown right after startup
            return Turn::Idle;
        }
        if self.bootstrap {
            self.bootstrap = false;
            return Turn::Send(Command::GetVar(id::SENSORS_TEMP));
        }

        for slot in WRITE_PRIORITY.iter() {
            match self.write(*slot, snapshot) {
                Outcome::Skip => continue,
                Outcome::Wait => return Turn::Idle,
                Outcome::Send(command) => return Turn::Send(command),
            }
        }

        for slot in READ_PRIORITY.iter() {
            let queue = &mut self.reads[*slot as usize];
            if !queue.is_empty() {
                return Turn::Send(Command::GetVar(queue.remove(0)));
            }
        }

        if !self.continuous {
            return Turn::Terminate;
        }
        self.background(snapshot)
    }

    fn background(&self, snapshot: &DeviceSnapshot) -> Turn {
        if self.turns % 4 == 3 {
            Turn::Send(Command::GetVar(id::SENSORS_TEMP))
        } else if self.turns % 8 == 2 && snapshot.party_minutes() != 0 {
            Turn::Send(Command::GetVar(id::PARTY_REMAINING))
        } else if self.turns % 8 == 2 && snapshot.quiet_minutes() != 0 {
            Turn::Send(Command::GetVar(id::QUIET_REMAINING))
        } else {
            Turn::Idle
        }
    }

    fn write(&mut self, slot: WriteSlot, snapshot: &mut DeviceSnapshot) -> Outcome {
        match slot {
            WriteSlot::Time => match self.time.take() {
                Some(word) => Outcome::Send(Command::SetVar16(id::TIME_OF_DAY, word)),
                None => Outcome::Skip,
            },
            WriteSlot::Bypass => self.write_bypass(snapshot),
            WriteSlot::Fan => self.write_fan(snapshot),
            WriteSlot::Party => timer_write(&mut self.party, PARTY),
            WriteSlot::Quiet => timer_write(&mut self.quiet, QUIET),
            WriteSlot::Voltage => match self.voltage.take() {
                Some((level, _)) if !(1..=MAX_FAN_LEVEL).contains(&level) => {
                    log::debug!("Dropping voltage for fan level {}", level);
                    Outcome::Skip
                }
                Some((level, tenths)) => {
                    let tenths = u32::from(tenths);
                    Outcome::Send(Command::SetVar32(
                        id::FAN_1_VOLTAGE + level - 1,
                        tenths | tenths << 16,
                    ))
                }
                None => Outcome::Skip,
            },
        }
    }

    fn write_bypass(&mut self, snapshot: &DeviceSnapshot) -> Outcome {
        let degrees = match self.bypass {
            None => return Outcome::Skip,
            Some(BypassRequest::Degrees(degrees)) => degrees,
            Some(BypassRequest::Toggle) => match snapshot.bypass() {
                None => {
                    log::trace!("Bypass toggle waits for the current bypass temperature");
                    return Outcome::Wait;
                }
                Some(current) if current.get() < BYPASS_TOGGLE_THRESHOLD => BYPASS_HIGH,
                Some(_) => BYPASS_LOW,
            },
        };
        self.bypass = None;
        Outcome::Send(Command::SetVar16(
            id::BYPASS1_TEMP,
            u16::from(degrees) * 10,
        ))
    }

    fn write_fan(&mut self, snapshot: &mut DeviceSnapshot) -> Outcome {
        let fan = match self.fan {
            Some(fan) => fan,
            None => return Outcome::Skip,
        };
        let (control, next) = match fan {
            FanWrite::Auto => (FanControl::Auto, None),
            FanWrite::DisableAutoThen(level) => (FanControl::Manual, Some(FanWrite::Level(level))),
            FanWrite::Level(level) => (FanControl::Level(level), None),
            FanWrite::Step(step) => {
                let (level, mode) = match (snapshot.fan_level(), snapshot.fan_mode()) {
                    (Some(level), Some(mode)) => (level, mode),
                    _ => {
                        log::trace!("Fan step waits for the current fan level");
                        return Outcome::Wait;
                    }
                };
                let target = match step {
                    Step::Up if (1..=3).contains(&level) => level + 1,
                    Step::Down if (2..=4).contains(&level) => level - 1,
                    _ => {
                        log::debug!("Dropping fan step {:?} from level {}", step, level);
                        self.fan = None;
                        return Outcome::Wait;
                    }
                };
                snapshot.invalidate_fan();
                match mode {
                    FanMode::Auto => (FanControl::Manual, Some(FanWrite::Level(target))),
                    FanMode::Manual => (FanControl::Level(target), None),
                }
            }
        };
        self.fan = next;
        Outcome::Send(Command::fan(control))
    }
}

fn timer_write(pending: &mut Option<TimerWrite>, vars: TimerVars) -> Outcome {
    match pending.take() {
        None => Outcome::Skip,
        Some(TimerWrite::Off) => Outcome::Send(Command::SetVar8(vars.enabled, 0)),
        Some(TimerWrite::On) => Outcome::Send(Command::SetVar8(vars.enabled, 1)),
        Some(TimerWrite::Duration(minutes)) => {
            *pending = Some(TimerWrite::On);
            Outcome::Send(Command::SetVar16(vars.time, minutes))
        }
    }
}
