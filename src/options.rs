//! Command line options, turned into engine settings and [`Request`]s.

use snafu::{ensure, OptionExt, Snafu};

use crate::engine::EngineConfig;
use crate::nom_parser::args;
use crate::sequencer::{BypassRead, BypassRequest, FanRequest, Request, TimerRequest};
use crate::types::{self, Weekday};

pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";
/// Longest party or quiet period in minutes.
pub const MAX_TIMER_MINUTES: u16 = 120;
/// Highest fan voltage in tenths.
pub const MAX_VOLTAGE_TENTHS: u16 = 100;

pub const HELP: &str = "
kwl [OPTION...]

 -?, --help                show this help
 -l, --loop                loop execution until Ctrl-C / ESC
 -i, --interactive         same as --loop
 -d, --device PATH         serial device (default /dev/ttyUSB0)

     --get-all             get all values below
     --get-bypass          get bypass temperatures (°C)
     --get-calendar DAY    get calendar for a specific day (0/Mon..6/Sun)
     --get-change-filter   get time before change filter (mth)
     --get-hours-on        get number of hours (h)
     --get-party-enabled   get remaining time for party
     --get-party-time      get party time (min)
     --get-party-level     get party level
     --get-pre-heating     get pre-heating enabled/temperature (°C)
     --get-quiet-enabled   get remaining quiet time
     --get-quiet-time      get quiet time (min)
     --get-quiet-level     get quiet level
     --get-run-on-time     get run-on time (s)
     --get-voltage         get voltage for all fan levels (V)

 -b, --set-bypass 0|1|TEMP set bypass temperature (disable|enable|°C)
 -f, --set-fan a|m:LEVEL   set fan level (auto or manual level 1..4)
 -p, --set-party 0|1|TIME  set party (disable/enable/time)
 -q, --set-quiet 0|1|TIME  set quiet (disable/enable/time)
 -t, --set-time HH:MM      set time of day
 -v, --set-voltage L:V     set voltage for a certain level

     --verbose             show incoming pakets
";

/// Error type for option parsing, displayed as the message for the user
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Unknown option '{}'", option))]
    UnknownOption { option: String },
    #[snafu(display("Option '{}' needs a value", option))]
    MissingValue { option: String },
    #[snafu(display("Option '{}' takes no value", option))]
    UnexpectedValue { option: String },
    #[snafu(display("Unexpected argument '{}'", arg))]
    UnexpectedArgument { arg: String },
    #[snafu(display("get-calendar: wrong day"))]
    CalendarDay,
    #[snafu(display("set-bypass: temperature out of range"))]
    BypassRange,
    #[snafu(display("set-fan: wrong manual format"))]
    FanManualFormat,
    #[snafu(display("set-fan: wrong manual level"))]
    FanManualLevel,
    #[snafu(display("set-fan: a/m:<level>"))]
    FanFormat,
    #[snafu(display("set-party: wrong format"))]
    PartyFormat,
    #[snafu(display("set-quiet: wrong format"))]
    QuietFormat,
    #[snafu(display("set-time: wrong format"))]
    TimeFormat,
    #[snafu(display("set-time: wrong hour"))]
    TimeHour,
    #[snafu(display("set-time: wrong minutes"))]
    TimeMinutes,
    #[snafu(display("set-voltage: format level:voltage"))]
    VoltageFormat,
    #[snafu(display("set-voltage: wrong level"))]
    VoltageLevel,
    #[snafu(display("set-voltage: wrong voltage lower part"))]
    VoltageLowerPart,
    #[snafu(display("set-voltage: voltage too high"))]
    VoltageTooHigh,
}

/// Everything a run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub device: String,
    pub config: EngineConfig,
    /// Requests in the order they were given.
    pub requests: Vec<Request>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            device: DEFAULT_DEVICE.to_owned(),
            config: EngineConfig::default(),
            requests: Vec::new(),
        }
    }
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Run(Options),
    Help,
}

fn long_name(short: char) -> Option<&'static str> {
    Some(match short {
        '?' | 'h' => "help",
        'l' => "loop",
        'i' => "interactive",
        'd' => "device",
        'b' => "set-bypass",
        'f' => "set-fan",
        'p' => "set-party",
        'q' => "set-quiet",
        't' => "set-time",
        'v' => "set-voltage",
        _ => return None,
    })
}

fn takes_value(name: &str) -> bool {
    matches!(
        name,
        "device"
            | "get-calendar"
            | "set-bypass"
            | "set-fan"
            | "set-party"
            | "set-quiet"
            | "set-time"
            | "set-voltage"
    )
}

/// Parse the arguments following the program name.
///
/// Short options take their value attached (`-b28`) or as the next argument,
/// long options as `--set-bypass=28` or `--set-bypass 28`. Short flags can be
/// combined (`-li`).
/// # Errors
/// Returns the first problem found, with the message to show the user.
pub fn parse<I, S>(args: I) -> Result<Parsed, Error>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = Options::default();
    let mut args = args.into_iter().map(|arg| arg.as_ref().to_owned());

    while let Some(arg) = args.next() {
        if let Some(long) = arg.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, value)) => (name, Some(value.to_owned())),
                None => (long, None),
            };
            let value = if takes_value(name) {
                Some(match inline {
                    Some(value) => value,
                    None => args.next().context(MissingValueSnafu { option: &arg })?,
                })
            } else {
                inline
            };
            let help = options.apply(name, value.as_deref())?;
            ensure!(
                value.is_none() || takes_value(name),
                UnexpectedValueSnafu {
                    option: format!("--{}", name)
                }
            );
            if help {
                return Ok(Parsed::Help);
            }
        } else if arg.len() > 1 && arg.starts_with('-') {
            let mut shorts = arg[1..].chars();
            while let Some(short) = shorts.next() {
                let name = long_name(short).context(UnknownOptionSnafu {
                    option: format!("-{}", short),
                })?;
                let value = if takes_value(name) {
                    let attached = shorts.as_str();
                    let value = if attached.is_empty() {
                        args.next().context(MissingValueSnafu {
                            option: format!("-{}", short),
                        })?
                    } else {
                        attached.to_owned()
                    };
                    shorts = "".chars();
                    Some(value)
                } else {
                    None
                };
                if options.apply(name, value.as_deref())? {
                    return Ok(Parsed::Help);
                }
            }
        } else {
            return UnexpectedArgumentSnafu { arg }.fail();
        }
    }
    Ok(Parsed::Run(options))
}

impl Options {
    /// Apply one option. Returns `true` if help was asked for.
    fn apply(&mut self, name: &str, value: Option<&str>) -> Result<bool, Error> {
        let value = value.unwrap_or_default();
        match name {
            "help" => return Ok(true),
            "loop" | "interactive" => {
                self.config.interactive = true;
                self.config.continuous = true;
                self.requests.extend_from_slice(&[
                    Request::GetBypass(BypassRead::Primary),
                    Request::GetPartyRemaining,
                    Request::GetQuietRemaining,
                ]);
            }
            "verbose" => self.config.verbose = true,
            "device" => self.device = value.to_owned(),
            "get-all" => self.requests.extend_from_slice(&[
                Request::GetQuietRemaining,
                Request::GetQuietTime,
                Request::GetQuietLevel,
                Request::GetPartyTime,
                Request::GetPartyLevel,
                Request::GetPartyRemaining,
                Request::GetHoursOn,
                Request::GetVoltages,
                Request::GetBypass(BypassRead::Both),
                Request::GetPreheating,
                Request::GetRunOnTime,
                Request::GetFilterInterval,
            ]),
            "get-bypass" => self.requests.push(Request::GetBypass(BypassRead::Both)),
            "get-calendar" => {
                let day = args::number(value).map_err(|_| Error::CalendarDay)?.1;
                let day = Weekday::from_index(day).map_err(|_| Error::CalendarDay)?;
                self.requests.push(Request::GetCalendar(day));
            }
            "get-change-filter" => self.requests.push(Request::GetFilterInterval),
            "get-hours-on" => self.requests.push(Request::GetHoursOn),
            "get-party-enabled" => self.requests.push(Request::GetPartyRemaining),
            "get-party-time" => self.requests.push(Request::GetPartyTime),
            "get-party-level" => self.requests.push(Request::GetPartyLevel),
            "get-pre-heating" => self.requests.push(Request::GetPreheating),
            "get-quiet-enabled" => self.requests.push(Request::GetQuietRemaining),
            "get-quiet-time" => self.requests.push(Request::GetQuietTime),
            "get-quiet-level" => self.requests.push(Request::GetQuietLevel),
            "get-run-on-time" => self.requests.push(Request::GetRunOnTime),
            "get-voltage" => self.requests.push(Request::GetVoltages),
            "set-bypass" => {
                self.requests
                    .push(Request::SetBypass(BypassRequest::Degrees(bypass(value)?)));
                self.requests.push(Request::GetBypass(BypassRead::Both));
            }
            "set-fan" => self.requests.push(Request::SetFan(fan(value)?)),
            "set-party" => self
                .requests
                .push(Request::SetParty(timer(value).ok_or(Error::PartyFormat)?)),
            "set-quiet" => self
                .requests
                .push(Request::SetQuiet(timer(value).ok_or(Error::QuietFormat)?)),
            "set-time" => {
                let (hour, minute) = time(value)?;
                self.requests.push(Request::SetTime { hour, minute });
            }
            "set-voltage" => {
                let (level, tenths) = voltage(value)?;
                self.requests.push(Request::SetVoltage { level, tenths });
                self.requests.push(Request::GetVoltages);
            }
            _ => {
                return UnknownOptionSnafu {
                    option: format!("--{}", name),
                }
                .fail()
            }
        }
        Ok(false)
    }
}

/// `HH:MM`. The hour is checked before the rest of the format.
fn time(value: &str) -> Result<(u8, u8), Error> {
    let (rest, (hour, minute)) = args::clock(value).map_err(|_| Error::TimeFormat)?;
    ensure!(hour <= 23, TimeHourSnafu);
    let minute = minute.context(TimeFormatSnafu)?;
    ensure!(minute <= 59, TimeMinutesSnafu);
    ensure!(rest.is_empty(), TimeFormatSnafu);
    Ok((hour as u8, minute as u8))
}

/// Bypass temperature in °C. `0` disables the bypass, `1` enables it.
fn bypass(value: &str) -> Result<u8, Error> {
    let degrees = args::number(value).map_err(|_| Error::BypassRange)?.1;
    match degrees {
        0 => Ok(28),
        1 => Ok(18),
        18..=30 => Ok(degrees as u8),
        _ => BypassRangeSnafu.fail(),
    }
}

fn fan(value: &str) -> Result<FanRequest, Error> {
    if value.starts_with('a') {
        return Ok(FanRequest::Auto);
    }
    ensure!(value.starts_with('m'), FanFormatSnafu);
    ensure!(value[1..].starts_with(':'), FanManualFormatSnafu);
    let level = args::manual_level(value)
        .map_err(|_| Error::FanManualLevel)?
        .1;
    let level = running_level(level).context(FanManualLevelSnafu)?;
    Ok(FanRequest::Manual {
        level,
        disable_auto: true,
    })
}

/// A fan level the fans actually run at, 0 is standstill.
fn running_level(level: u8) -> Option<u8> {
    types::fan_level(level).ok().filter(|level| *level != 0)
}

/// `0`, `1` or a duration in minutes.
fn timer(value: &str) -> Option<TimerRequest> {
    if let Ok((_, on)) = args::switch(value) {
        return Some(if on { TimerRequest::On } else { TimerRequest::Off });
    }
    let minutes = args::number(value).ok()?.1;
    if minutes > MAX_TIMER_MINUTES {
        return None;
    }
    Some(TimerRequest::For(minutes))
}

/// Level and voltage in tenths from `L:V` or `L:V.v`.
fn voltage(value: &str) -> Result<(u8, u16), Error> {
    let (level, volts, lower) = args::voltage(value)
        .map_err(|_| Error::VoltageFormat)?
        .1;
    let level = running_level(level).context(VoltageLevelSnafu)?;
    let lower = lower.unwrap_or_default();
    ensure!(lower <= 9, VoltageLowerPartSnafu);
    let tenths = volts
        .checked_mul(10)
        .and_then(|tenths| tenths.checked_add(lower))
        .filter(|tenths| *tenths <= MAX_VOLTAGE_TENTHS)
        .context(VoltageTooHighSnafu)?;
    Ok((level, tenths))
}
