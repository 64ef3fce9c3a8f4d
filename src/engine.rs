//! The sans-io protocol engine, see [`Engine`].

use core::mem;
use core::time::Duration;

use crate::buffer::RxBuffer;
use crate::decode::{classify, copy_raw, foreign, Event};
use crate::frame::{decode_all, Decoded, FrameBytes, Hex};
use crate::keys::Key;
use crate::sequencer::{CommandSequencer, Request, Turn};
use crate::snapshot::{DeviceSnapshot, StatusLine};
use crate::turn::{is_boundary, BusTurnDetector};

/// How the engine reports and when it stops.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Report routine polling chatter too.
    pub verbose: bool,
    /// Leave values shown on the status line out of the event stream.
    pub interactive: bool,
    /// Keep polling after all requests are done.
    pub continuous: bool,
}

/// Result of feeding one byte to the engine.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Step {
    /// Events to render, in order.
    pub events: Vec<Event>,
    /// Frame to put on the bus now.
    pub transmit: Option<FrameBytes>,
}

/// Protocol engine for one bus.
///
/// The engine does no I/O. It is fed each received byte together with the
/// time the line was idle before it, and answers with the events to render
/// and, during a granted turn, the frame to transmit. `io::Driver` runs it
/// on a serial port.
///
/// ```
/// use kwl_bus::{Engine, EngineConfig};
/// use std::time::Duration;
///
/// let mut engine = Engine::new(EngineConfig::default());
/// let gap = Duration::from_millis(30);
/// for (n, byte) in [0x13, 0x00, 0x00, 0x14].iter().enumerate() {
///     let idle = if n == 0 { gap } else { Duration::from_millis(1) };
///     let step = engine.receive_byte(*byte, idle);
///     // the first turn after startup is never used
///     assert!(step.transmit.is_none());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    rx: RxBuffer,
    turns: BusTurnDetector,
    snapshot: DeviceSnapshot,
    sequencer: CommandSequencer,
    first_frame: bool,
    frames_received: u64,
    terminated: bool,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            rx: RxBuffer::new(),
            turns: BusTurnDetector::new(),
            snapshot: DeviceSnapshot::new(),
            sequencer: CommandSequencer::new(config.continuous),
            first_frame: true,
            frames_received: 0,
            terminated: false,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    pub fn sequencer(&self) -> &CommandSequencer {
        &self.sequencer
    }

    /// Valid frames seen so far.
    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn request(&mut self, request: Request) {
        self.sequencer.request(request);
    }

    /// Act on an interactive keystroke.
    pub fn apply_key(&mut self, key: Key) {
        log::debug!("Key {:?}", key);
        if key == Key::Quit {
            self.terminate();
        }
        for request in key.requests() {
            self.sequencer.request(request);
        }
    }

    pub fn terminate(&mut self) {
        self.terminated = true;
    }

    /// Whether the run is over, either requested or because nothing is left to do.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Status line from the last broadcast, for printing at shutdown.
    pub fn final_status(&self) -> Option<StatusLine> {
        self.snapshot.status_line()
    }

    /// Feed the next received byte. `idle` is how long the line was quiet before it.
    pub fn receive_byte(&mut self, byte: u8, idle: Duration) -> Step {
        let mut step = Step::default();
        if is_boundary(idle) {
            self.end_burst(idle, &mut step.events);
        }

        if self.rx.is_full() {
            log::warn!("Receive buffer overflow, dropping {} bytes", self.rx.len());
            self.rx.clear();
            self.turns.reset();
            step.events.push(Event::Overflow);
            return step;
        }
        self.rx.push(byte);

        if self.turns.observe(byte) {
            match self.sequencer.on_turn_granted(&mut self.snapshot) {
                Turn::Idle => log::trace!("Turn {} unused", self.sequencer.turns()),
                Turn::Send(command) => {
                    let frame = command.encode();
                    log::debug!("Turn {}: sending {}", self.sequencer.turns(), Hex(&frame));
                    step.transmit = Some(frame);
                }
                Turn::Terminate => {
                    log::debug!("Nothing left to do");
                    self.terminated = true;
                }
            }
        }
        step
    }

    /// Decode whatever was received since the last idle gap, e.g. at end of input.
    pub fn flush(&mut self, idle: Duration) -> Vec<Event> {
        let mut events = Vec::new();
        self.end_burst(idle, &mut events);
        events
    }

    fn end_burst(&mut self, idle: Duration, events: &mut Vec<Event>) {
        let burst = mem::take(&mut self.rx);
        self.turns.reset();
        self.process(burst.as_slice(), idle, events);
    }

    fn process(&mut self, buf: &[u8], idle: Duration, events: &mut Vec<Event>) {
        for decoded in decode_all(buf) {
            let frame = match decoded {
                Decoded::Valid(frame) => frame,
                Decoded::Invalid(frame, reason) => {
                    if self.first_frame {
                        // startup usually lands in the middle of a frame
                        self.first_frame = false;
                    } else {
                        log::debug!("Ignoring {:?} frame {}", reason, Hex(frame.raw()));
                        events.push(Event::Ignored {
                            raw: copy_raw(frame.raw()),
                            reason,
                        });
                    }
                    return;
                }
            };
            self.first_frame = false;
            self.frames_received += 1;

            if frame.address().is_none() && !frame.is_broadcast() {
                events.extend(foreign(&frame, idle));
                return;
            }
            if frame.is_routine() && !self.config.verbose {
                continue;
            }
            events.extend(classify(
                &frame,
                &mut self.snapshot,
                self.config.interactive,
                idle,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::id;
    use crate::frame::{encode, encode_raw, Command, Malformed, BROADCAST};
    use crate::turn::CUE;
    use crate::types::{addr, FanMode, Kind, Tenths};

    const GAP: Duration = Duration::from_millis(30);
    const BYTE_TIME: Duration = Duration::from_millis(1);

    /// Feed `bytes` as one burst after an idle gap.
    fn burst(engine: &mut Engine, bytes: &[u8]) -> Step {
        let mut total = Step::default();
        for (n, byte) in bytes.iter().enumerate() {
            let idle = if n == 0 { GAP } else { BYTE_TIME };
            let step = engine.receive_byte(*byte, idle);
            total.events.extend(step.events);
            if step.transmit.is_some() {
                assert!(total.transmit.is_none(), "two frames in one burst");
                total.transmit = step.transmit;
            }
        }
        total
    }

    fn bypass_report() -> FrameBytes {
        encode(addr(0x11), Kind::Write, &[id::BYPASS1_TEMP, 0xc3, 0x00]).unwrap()
    }

    #[test]
    fn test_cue_grants_one_command_per_turn() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.request(Request::GetHoursOn);
        assert_eq!(burst(&mut engine, &CUE).transmit, None);
        assert_eq!(
            burst(&mut engine, &CUE).transmit.unwrap().as_slice(),
            Command::GetVar(id::SENSORS_TEMP).encode().as_slice()
        );
        assert_eq!(
            burst(&mut engine, &CUE).transmit.unwrap().as_slice(),
            &[0x13, 0x00, 0x01, 0x15, 0x2a]
        );
        assert!(!engine.is_terminated());
        assert_eq!(burst(&mut engine, &CUE).transmit, None);
        assert!(engine.is_terminated());
    }

    #[test]
    fn test_cue_without_gap_is_not_a_turn() {
        let mut engine = Engine::new(EngineConfig::default());
        let mut bytes = bypass_report().to_vec();
        bytes.extend_from_slice(&CUE);
        burst(&mut engine, &bytes);
        assert_eq!(engine.sequencer().turns(), 0);
    }

    #[test]
    fn test_frames_decoded_at_boundary() {
        let mut engine = Engine::new(EngineConfig::default());
        let step = burst(&mut engine, &bypass_report());
        assert!(step.events.is_empty());
        assert_eq!(engine.snapshot().bypass(), None);

        let step = burst(&mut engine, &CUE);
        assert_eq!(step.events, [Event::Bypass1(Tenths(195))]);
        assert_eq!(engine.snapshot().bypass(), Some(Tenths(195)));
        assert_eq!(engine.frames_received(), 1);
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut engine = Engine::new(EngineConfig::default());
        let mut bytes = encode(addr(0x10), Kind::Read, &[]).unwrap().to_vec();
        bytes.extend_from_slice(&bypass_report());
        bytes.extend_from_slice(&encode(addr(0x12), Kind::Write, &[id::FILTER_INTERVAL, 4]).unwrap());
        burst(&mut engine, &bytes);
        let events = engine.flush(GAP);
        // the ping is routine and hidden
        assert_eq!(
            events,
            [Event::Bypass1(Tenths(195)), Event::FilterInterval(4)]
        );
        assert_eq!(engine.frames_received(), 3);
    }

    #[test]
    fn test_verbose_shows_routine_frames() {
        let config = EngineConfig {
            verbose: true,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);
        let no_change = encode(addr(0x11), Kind::Write, &[id::FAN_LEVEL, 0xaa, 0xbb]).unwrap();
        burst(&mut engine, &no_change);
        assert_eq!(engine.flush(GAP).len(), 1);

        let mut quiet = Engine::new(EngineConfig::default());
        burst(&mut quiet, &no_change);
        assert!(quiet.flush(GAP).is_empty());
    }

    #[test]
    fn test_first_invalid_frame_is_not_reported() {
        let mut engine = Engine::new(EngineConfig::default());
        burst(&mut engine, &[0x37, 0x01, 0x02, 0x03]);
        assert!(engine.flush(GAP).is_empty());

        burst(&mut engine, &[0x11, 0x00, 0x00, 0x99, 0x10, 0x00, 0x00, 0x11]);
        match engine.flush(GAP).as_slice() {
            [Event::Ignored { raw, reason }] => {
                assert_eq!(raw.as_slice(), &[0x11, 0x00, 0x00, 0x99]);
                assert_eq!(*reason, Malformed::Checksum);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.frames_received(), 0);
    }

    #[test]
    fn test_foreign_frame_ends_burst() {
        let mut engine = Engine::new(EngineConfig::default());
        let mut bytes = encode_raw(0x34, 0, &[]).unwrap().to_vec();
        bytes.extend_from_slice(&bypass_report());
        burst(&mut engine, &bytes);
        assert!(engine.flush(GAP).is_empty());
        assert_eq!(engine.snapshot().bypass(), None);

        burst(&mut engine, &encode_raw(0x70, 0x01, &[0x02]).unwrap());
        match engine.flush(GAP).as_slice() {
            [Event::Unknown { raw, .. }] => assert_eq!(raw[0], 0x70),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_broadcast_and_final_status() {
        let mut engine = Engine::new(EngineConfig::default());
        assert!(engine.final_status().is_none());
        let mut body = [0u8; 23];
        body[..8].copy_from_slice(&[5, 4, 6, 24, 18, 30, 3, 1]);
        burst(&mut engine, &encode_raw(BROADCAST, BROADCAST, &body).unwrap());
        match engine.flush(GAP).as_slice() {
            [Event::Status(line)] => assert_eq!(line.broadcast.fan_level(), 3),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(engine.snapshot().fan_level(), Some(3));
        assert_eq!(engine.snapshot().fan_mode(), Some(FanMode::Auto));
        assert_eq!(
            engine.final_status().unwrap().to_string(),
            "Fri 05.06.2024 18:30 auto/3"
        );
    }

    #[test]
    fn test_interactive_hides_status_values() {
        let config = EngineConfig {
            interactive: true,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config);
        burst(&mut engine, &bypass_report());
        assert!(engine.flush(GAP).is_empty());
        assert_eq!(engine.snapshot().bypass(), Some(Tenths(195)));
    }

    #[test]
    fn test_overflow() {
        let mut engine = Engine::new(EngineConfig::default());
        let mut overflowed = 0;
        for n in 0..=crate::buffer::RX_CAPACITY {
            let idle = if n == 0 { GAP } else { BYTE_TIME };
            let step = engine.receive_byte(0x00, idle);
            overflowed += step.events.iter().filter(|e| **e == Event::Overflow).count();
        }
        assert_eq!(overflowed, 1);
        // a cue right after the overflow starts a fresh burst
        for byte in CUE.iter() {
            engine.receive_byte(*byte, BYTE_TIME);
        }
        assert_eq!(engine.sequencer().turns(), 1);
    }

    #[test]
    fn test_keys() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.apply_key(Key::FanAuto);
        assert!(engine.sequencer().has_pending());
        assert!(!engine.is_terminated());
        engine.apply_key(Key::Quit);
        assert!(engine.is_terminated());
    }
}
