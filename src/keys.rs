//! Interactive keystrokes and where they come from.

use arrayvec::ArrayVec;
use std::sync::mpsc::Receiver;

use crate::sequencer::{BypassRead, BypassRequest, FanRequest, Request};

const ESC: u8 = 0x1b;

/// What a keystroke asks for.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Key {
    /// Lone escape.
    Quit,
    /// Cursor up.
    FanUp,
    /// Cursor down.
    FanDown,
    /// `a`
    FanAuto,
    /// `b`
    ToggleBypass,
}

impl Key {
    /// The requests a key queues. [`Key::Quit`] queues none.
    pub fn requests(self) -> ArrayVec<Request, 2> {
        let mut requests = ArrayVec::new();
        match self {
            Key::Quit => {}
            Key::FanUp => requests.push(Request::SetFan(FanRequest::Up)),
            Key::FanDown => requests.push(Request::SetFan(FanRequest::Down)),
            Key::FanAuto => requests.push(Request::SetFan(FanRequest::Auto)),
            Key::ToggleBypass => {
                requests.push(Request::SetBypass(BypassRequest::Toggle));
                requests.push(Request::GetBypass(BypassRead::Primary));
            }
        }
        requests
    }
}

/// Turns the bytes of one keystroke into a [`Key`].
///
/// Bytes that arrive together are pushed, then [`KeyDecoder::poll`] looks at
/// the first three of them. Anything after is dropped.
#[derive(Debug, Default, Clone)]
pub struct KeyDecoder {
    pending: ArrayVec<u8, 3>,
}

impl KeyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) {
        let _ = self.pending.try_push(byte);
    }

    /// Decode and forget the pushed bytes.
    pub fn poll(&mut self) -> Option<Key> {
        let key = match self.pending.as_slice() {
            [] => None,
            [ESC] => Some(Key::Quit),
            [ESC, b'[', b'A'] => Some(Key::FanUp),
            [ESC, b'[', b'B'] => Some(Key::FanDown),
            [ESC, b'[', ..] => None,
            // a cooked terminal delivers escape followed by the newline
            [ESC, ..] => Some(Key::Quit),
            [b'a', ..] => Some(Key::FanAuto),
            [b'b', ..] => Some(Key::ToggleBypass),
            _ => None,
        };
        self.pending.clear();
        key
    }
}

/// Source of keystrokes, polled once per received byte.
pub trait KeySource {
    fn poll_key(&mut self) -> Option<Key>;
}

/// No keyboard, e.g. when not interactive.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoKeys;

impl KeySource for NoKeys {
    fn poll_key(&mut self) -> Option<Key> {
        None
    }
}

/// Keystrokes read elsewhere, e.g. by a stdin thread, one chunk per read.
#[derive(Debug)]
pub struct ChannelKeys {
    rx: Receiver<Vec<u8>>,
    decoder: KeyDecoder,
}

impl ChannelKeys {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            decoder: KeyDecoder::new(),
        }
    }
}

impl KeySource for ChannelKeys {
    fn poll_key(&mut self) -> Option<Key> {
        let chunk = self.rx.try_recv().ok()?;
        for byte in chunk {
            self.decoder.push(byte);
        }
        self.decoder.poll()
    }
}
