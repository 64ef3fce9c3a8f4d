//! Detection of the bus turn granted to this application.
//!
//! The bus has no request-to-send primitive. The wall panel polls the unit
//! at 0x13 with a bare ping as part of its fixed cycle, and right after that
//! ping the line stays quiet long enough for one frame of our own.

use core::time::Duration;

/// The keepalive ping to 0x13: address, kind Read, length 0, checksum 0x14.
pub const CUE: [u8; 4] = [0x13, 0x00, 0x00, 0x14];

/// Silence after which the received bytes count as complete frames.
pub const IDLE_GAP: Duration = Duration::from_millis(25);

/// Whether a pause of `idle` before a byte separates it from the previous burst.
pub fn is_boundary(idle: Duration) -> bool {
    idle >= IDLE_GAP
}

/// Watches the bytes of each burst and fires once when a burst starts with [`CUE`].
#[derive(Debug, Default, Clone)]
pub struct BusTurnDetector {
    window: [u8; 4],
    seen: usize,
}

impl BusTurnDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new burst.
    pub fn reset(&mut self) {
        self.seen = 0;
    }

    /// Feed the next byte of the burst. Returns `true` exactly when the fourth
    /// byte completes the cue.
    pub fn observe(&mut self, byte: u8) -> bool {
        if self.seen < CUE.len() {
            self.window[self.seen] = byte;
        }
        self.seen = self.seen.saturating_add(1);
        self.seen == CUE.len() && self.window == CUE
    }
}
