//! Protocol engine for the serial bus of Helios KWL ventilation units.
//!
//! The bus is polled by the ventilation unit. A ping to our panel address
//! ([`types::OWN_ADDRESS`]) at the start of a burst grants us the line for one
//! frame. The [`Engine`] is sans-io: feed it received bytes together with the
//! idle time before each byte, and it hands back the frame to transmit (if
//! any) and the [`Event`]s decoded from the traffic. [`io::Driver`] runs an
//! engine on a blocking byte stream such as a serial port.
//!
//! ```
//! use kwl_bus::{Engine, EngineConfig, Request};
//! use std::time::Duration;
//!
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.request(Request::GetHoursOn);
//!
//! // the unit hands the line to our panel, the first turn is only observed
//! let gap = Duration::from_millis(30);
//! let mut transmit = None;
//! for _ in 0..2 {
//!     for (i, byte) in [0x13, 0x00, 0x00, 0x14].iter().enumerate() {
//!         let idle = if i == 0 { gap } else { Duration::ZERO };
//!         transmit = engine.receive_byte(*byte, idle).transmit;
//!     }
//! }
//! // the second turn reads the temperature sensors
//! assert_eq!(transmit.as_deref(), Some(&[0x13, 0x00, 0x01, 0x3a, 0x4f][..]));
//! ```

mod buffer;
pub mod catalog;
pub mod decode;
pub mod engine;
pub mod frame;
pub mod io;
pub mod keys;
pub mod lock;
mod nom_parser;
pub mod options;
pub mod sequencer;
pub mod snapshot;
pub mod turn;
pub mod types;

pub use decode::Event;
pub use engine::{Engine, EngineConfig, Step};
pub use frame::{Command, Decoded, Frame};
pub use sequencer::{CommandSequencer, Request, Turn};
pub use snapshot::{DeviceSnapshot, StatusLine};
pub use types::{Address, FanControl, FanMode, Kind, Tenths, VariableId, Weekday};
