//! Blocking driver running an [`Engine`] on a byte stream such as a serial port.

use snafu::{ResultExt, Snafu};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::decode::Event;
use crate::engine::{Engine, EngineConfig};
use crate::frame::Hex;
use crate::keys::KeySource;

/// Line speed of the bus.
pub const BAUD_RATE: u32 = 19200;
/// Wait between the end of the cue and our own transmission.
pub const SETTLE_DELAY: Duration = Duration::from_millis(5);

/// Error type for the driver
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("Failed to read from the bus"))]
    Read { source: std::io::Error },
}

/// Receives the events of a run, e.g. to print them.
pub trait Renderer {
    fn render(&mut self, event: &Event);
}

impl<F: FnMut(&Event)> Renderer for F {
    fn render(&mut self, event: &Event) {
        self(event)
    }
}

/// Connects an [`Engine`] to a byte stream.
///
/// The stream should be set up with a short read timeout so the loop can
/// notice a shutdown request. Timeouts count as "no byte".
#[derive(Debug)]
pub struct Driver<IO> {
    io: IO,
    engine: Engine,
    settle_delay: Duration,
}

impl<IO> Driver<IO>
where
    IO: Read + Write,
{
    pub fn new(io: IO, config: EngineConfig) -> Self {
        Self {
            io,
            engine: Engine::new(config),
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Override [`SETTLE_DELAY`].
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Run until the engine terminates, `shutdown` is set or the stream ends.
    /// Keys are polled once per received byte.
    /// # Errors
    /// Returns [`Error::Read`] if reading fails for another reason than a timeout.
    pub fn run(
        &mut self,
        renderer: &mut impl Renderer,
        keys: &mut impl KeySource,
        shutdown: &AtomicBool,
    ) -> Result<(), Error> {
        let mut last_byte = Instant::now();
        let mut buf = [0u8; 1];
        while !self.engine.is_terminated() && !shutdown.load(Ordering::Relaxed) {
            let len = match self.io.read(&mut buf) {
                Ok(len) => len,
                Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                    continue
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context(ReadSnafu),
            };
            if len == 0 {
                log::debug!("End of input");
                for event in self.engine.flush(last_byte.elapsed()) {
                    renderer.render(&event);
                }
                break;
            }

            if let Some(key) = keys.poll_key() {
                self.engine.apply_key(key);
                if self.engine.is_terminated() {
                    // the byte may complete a cue, which must not be answered any more
                    break;
                }
            }

            let now = Instant::now();
            let step = self.engine.receive_byte(buf[0], now - last_byte);
            last_byte = now;
            for event in step.events.iter() {
                renderer.render(event);
            }
            if let Some(frame) = step.transmit {
                self.transmit(&frame);
                // our own frame occupies the line, measure the gap from its end
                last_byte = Instant::now();
            }
        }
        Ok(())
    }

    fn transmit(&mut self, frame: &[u8]) {
        thread::sleep(self.settle_delay);
        match self.io.write_all(frame).and_then(|_| self.io.flush()) {
            Ok(()) => log::trace!("Sent {}", Hex(frame)),
            Err(e) => log::error!("Failed to send {}: {}", Hex(frame), e),
        }
    }
}
