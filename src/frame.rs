//! Frame codec: the borrowed [`Frame`] view, slicing of received buffers,
//! encoding of outgoing commands and the predicates used to classify bus
//! traffic.
//!
//! On the wire a frame is
//!
//! ```text
//! address  kind  L  variable  value...  checksum
//! ```
//!
//! where `L` counts the variable byte and the value bytes, and the checksum
//! is one plus the sum of all preceding bytes, modulo 256. Frames carry no
//! delimiter; consecutive frames are only separated by their length byte.

use arrayvec::ArrayVec;
use core::convert::TryFrom;
use core::fmt;
use snafu::{ensure, Snafu};

use crate::catalog::id;
use crate::nom_parser::{parse_frame, FrameToken};
use crate::types::{Address, FanControl, Kind, VariableId, OWN_ADDRESS};

/// Address, kind and length byte.
pub const HEADER_LEN: usize = 3;
/// A frame without variable and value: header plus checksum.
pub const MIN_FRAME_LEN: usize = HEADER_LEN + 1;
pub const MAX_FRAME_LEN: usize = MIN_FRAME_LEN + u8::MAX as usize;
/// Address byte of the periodic status broadcast, which repeats it as kind.
pub const BROADCAST: u8 = 0xff;
/// Second payload byte of an acknowledgement.
pub const ACK_MARKER: u8 = 0x55;

/// Pings to these addresses come from other panels on the bus and are not worth reporting.
pub const FOREIGN_PANELS: [u8; 12] = [
    0x31, 0x32, 0x34, 0x38, 0x41, 0x42, 0x44, 0x48, 0x51, 0x52, 0x54, 0x58,
];

/// Storage for one encoded frame.
pub type FrameBytes = ArrayVec<u8, MAX_FRAME_LEN>;

/// Error type for frame encoding
#[derive(Debug, Snafu, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A frame needs at least the header and the checksum.
    #[snafu(display("Frame of {} bytes is shorter than {} bytes", len, MIN_FRAME_LEN))]
    FrameTooShort { len: usize },
    /// The length byte can't describe a body this long.
    #[snafu(display("Frame body of {} bytes is too long", len))]
    BodyTooLong { len: usize },
}

/// Why a received frame was rejected.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Malformed {
    /// The checksum byte doesn't match the frame contents.
    Checksum,
    /// The buffer ended before the length byte said it would.
    Truncated,
}

/// One plus the sum of `data`, modulo 256.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(1u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Fill in the length byte and the trailing checksum of a frame in place.
/// # Errors
/// Returns [`Error::FrameTooShort`] if `frame` can't hold header and checksum,
/// and [`Error::BodyTooLong`] if the body doesn't fit the length byte.
pub fn seal(frame: &mut [u8]) -> Result<(), Error> {
    let len = frame.len();
    ensure!(len >= MIN_FRAME_LEN, FrameTooShortSnafu { len });
    ensure!(
        len <= MAX_FRAME_LEN,
        BodyTooLongSnafu {
            len: len - MIN_FRAME_LEN
        }
    );
    write_trailer(frame);
    Ok(())
}

// Caller guarantees MIN_FRAME_LEN <= frame.len() <= MAX_FRAME_LEN.
fn write_trailer(frame: &mut [u8]) {
    let last = frame.len() - 1;
    frame[2] = (frame.len() - MIN_FRAME_LEN) as u8;
    frame[last] = checksum(&frame[..last]);
}

/// Encode a frame for a device address. `body` is the variable id followed by the value.
/// # Errors
/// Returns [`Error::BodyTooLong`] if `body` exceeds 255 bytes.
pub fn encode(address: Address, kind: Kind, body: &[u8]) -> Result<FrameBytes, Error> {
    encode_raw(address.as_byte(), kind.as_byte(), body)
}

/// Like [`encode`], but with unchecked address and kind bytes, e.g. for broadcasts.
/// # Errors
/// Returns [`Error::BodyTooLong`] if `body` exceeds 255 bytes.
pub fn encode_raw(address: u8, kind: u8, body: &[u8]) -> Result<FrameBytes, Error> {
    ensure!(
        body.len() <= u8::MAX as usize,
        BodyTooLongSnafu { len: body.len() }
    );
    let mut frame = FrameBytes::new();
    frame.extend([address, kind, 0].iter().copied());
    frame.extend(body.iter().copied());
    frame.push(0);
    seal(&mut frame)?;
    Ok(frame)
}

/// A single read or write this application puts on the bus.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    GetVar(VariableId),
    SetVar8(VariableId, u8),
    SetVar16(VariableId, u16),
    SetVar32(VariableId, u32),
}

impl Command {
    /// Write the fan control word.
    pub const fn fan(control: FanControl) -> Self {
        Command::SetVar16(id::FAN_LEVEL, control.to_word())
    }

    pub const fn variable(&self) -> VariableId {
        match *self {
            Command::GetVar(var)
            | Command::SetVar8(var, _)
            | Command::SetVar16(var, _)
            | Command::SetVar32(var, _) => var,
        }
    }

    /// The frame for this command, sent as the unit at [`OWN_ADDRESS`].
    /// Values are little-endian.
    pub fn encode(&self) -> FrameBytes {
        let (kind, var) = match self {
            Command::GetVar(var) => (Kind::Read, *var),
            _ => (Kind::Write, self.variable()),
        };
        let mut frame = FrameBytes::new();
        frame.extend([OWN_ADDRESS.as_byte(), kind.as_byte(), 0, var].iter().copied());
        match *self {
            Command::GetVar(_) => {}
            Command::SetVar8(_, value) => frame.push(value),
            Command::SetVar16(_, value) => frame.extend(value.to_le_bytes().iter().copied()),
            Command::SetVar32(_, value) => frame.extend(value.to_le_bytes().iter().copied()),
        }
        frame.push(0);
        write_trailer(&mut frame);
        frame
    }
}

/// A frame sliced out of a receive buffer. Always at least [`MIN_FRAME_LEN`] bytes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Frame<'a> {
    raw: &'a [u8],
}

impl<'a> Frame<'a> {
    fn new(raw: &'a [u8]) -> Self {
        debug_assert!(raw.len() >= MIN_FRAME_LEN);
        Self { raw }
    }

    /// All bytes of the frame, checksum included.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn address_byte(&self) -> u8 {
        self.raw[0]
    }

    /// The device address, `None` for broadcasts and other bus participants.
    pub fn address(&self) -> Option<Address> {
        Address::new(self.raw[0]).ok()
    }

    pub fn kind(&self) -> Option<Kind> {
        Kind::try_from(self.raw[1]).ok()
    }

    pub fn declared_len(&self) -> u8 {
        self.raw[2]
    }

    /// Variable id and value bytes.
    pub fn payload(&self) -> &'a [u8] {
        &self.raw[HEADER_LEN..self.raw.len() - 1]
    }

    pub fn variable(&self) -> Option<VariableId> {
        self.payload().first().copied()
    }

    /// The value bytes following the variable id.
    pub fn value(&self) -> &'a [u8] {
        self.payload().get(1..).unwrap_or(&[])
    }

    pub fn checksum(&self) -> u8 {
        self.raw[self.raw.len() - 1]
    }

    /// Byte `index` of the value.
    pub fn u8_at(&self, index: usize) -> Option<u8> {
        self.value().get(index).copied()
    }

    /// 16-bit word `index` of the value, little-endian.
    pub fn u16_at(&self, index: usize) -> Option<u16> {
        let bytes = self.value().get(2 * index..2 * index + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// 32-bit word `index` of the value, little-endian.
    pub fn u32_at(&self, index: usize) -> Option<u32> {
        let bytes = self.value().get(4 * index..4 * index + 4)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn is(&self, kind: Kind, len: u8) -> bool {
        self.raw[1] == kind.as_byte() && self.declared_len() == len
    }

    /// Keepalive without payload addressed to `address`.
    pub fn is_ping(&self, address: u8) -> bool {
        self.raw[0] == address && self.is(Kind::Read, 0)
    }

    pub fn is_foreign_ping(&self) -> bool {
        FOREIGN_PANELS.iter().any(|panel| self.is_ping(*panel))
    }

    /// Read request for `var`.
    pub fn is_request(&self, var: VariableId) -> bool {
        self.is(Kind::Read, 1) && self.variable() == Some(var)
    }

    /// Value report (or write) of `var` with declared length `len`.
    pub fn is_status(&self, var: VariableId, len: u8) -> bool {
        self.is(Kind::Write, len) && self.variable() == Some(var)
    }

    /// Acknowledgement of a write, from any device.
    pub fn is_ack(&self) -> bool {
        self.is(Kind::Acknowledge, 2) && self.u8_at(0) == Some(ACK_MARKER)
    }

    pub fn is_ack_from(&self, address: u8) -> bool {
        self.raw[0] == address && self.is_ack()
    }

    pub fn is_broadcast(&self) -> bool {
        self.raw[0] == BROADCAST && self.raw[1] == BROADCAST
    }

    /// The master telling the unit to keep its fan setting.
    pub fn is_fan_no_change(&self) -> bool {
        self.is_status(id::FAN_LEVEL, 3)
            && self.u8_at(0) == Some(0xaa)
            && self.u8_at(1) == Some(0xbb)
    }

    /// Polling chatter that repeats every cycle and is only shown when verbose.
    pub fn is_routine(&self) -> bool {
        (0x10..=0x13).any(|address| self.is_ping(address))
            || self.is_request(id::FAN_LEVEL)
            || self.is_request(id::SENSORS_TEMP)
            || self.is_request(id::SENSORS_CO2)
            || self.is_request(id::SENSORS_HUMIDITY)
            || self.is_ack_from(0x10)
            || self.is_fan_no_change()
    }
}

/// Result of slicing one frame off a buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Decoded<'a> {
    Valid(Frame<'a>),
    /// The bytes are kept for diagnostics. Nothing after them is decoded.
    Invalid(Frame<'a>, Malformed),
}

/// Iterator over the frames packed into a buffer, see [`decode_all`].
#[derive(Debug, Clone)]
pub struct Frames<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Frames<'a> {
    type Item = Decoded<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let (consumed, token) = parse_frame(self.rest);
        match token {
            FrameToken::NeedData => None,
            FrameToken::Frame(raw) => {
                self.rest = &self.rest[consumed..];
                Some(Decoded::Valid(Frame::new(raw)))
            }
            FrameToken::Malformed(raw, why) => {
                self.rest = &[];
                Some(Decoded::Invalid(Frame::new(raw), why))
            }
        }
    }
}

/// Decode all frames packed back to back in `buf`.
///
/// Stops at the first invalid frame, and when fewer than [`MIN_FRAME_LEN`]
/// bytes remain.
pub fn decode_all(buf: &[u8]) -> Frames<'_> {
    Frames { rest: buf }
}

/// Decode the first frame in `buf`, `None` if more data is needed.
pub fn decode(buf: &[u8]) -> Option<Decoded<'_>> {
    decode_all(buf).next()
}

/// Hex dump in the `13 01 03 [ 1e 18 01 ]` style, value bytes in brackets.
#[derive(Debug, Copy, Clone)]
pub struct Hex<'a>(pub &'a [u8]);

impl fmt::Display for Hex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.0.len().saturating_sub(1);
        for (i, byte) in self.0.iter().enumerate() {
            if i == MIN_FRAME_LEN {
                f.write_str("[ ")?;
            }
            write!(f, "{:02x} ", byte)?;
            if self.0.len() > MIN_FRAME_LEN && i == last {
                f.write_str("]")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::addr;

    fn valid(buf: &[u8]) -> Frame<'_> {
        match decode(buf) {
            Some(Decoded::Valid(frame)) => frame,
            other => panic!("expected a valid frame, got {:?}", other),
        }
    }

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 1);
        assert_eq!(checksum(&[0x13, 0x00, 0x00]), 0x14);
        assert_eq!(checksum(&[0xff, 0x01]), 0x01);
    }

    #[test]
    fn test_seal() {
        let mut frame = [0x13, 0x01, 0x00, 0x1e, 0x18, 0x01, 0x00];
        seal(&mut frame).unwrap();
        assert_eq!(frame[2], 3);
        assert_eq!(frame[6], checksum(&frame[..6]));

        let mut short = [0x13, 0x00, 0x00];
        assert_eq!(seal(&mut short), Err(Error::FrameTooShort { len: 3 }));
    }

    #[test]
    fn test_encode_ping() {
        let ping = encode(addr(0x13), Kind::Read, &[]).unwrap();
        assert_eq!(ping.as_slice(), &[0x13, 0x00, 0x00, 0x14]);
        assert!(valid(&ping).is_ping(0x13));
        assert!(encode(addr(0x10), Kind::Write, &[0; 256]).is_err());
    }

    #[test]
    fn test_command_encoding() {
        assert_eq!(
            Command::GetVar(id::SENSORS_TEMP).encode().as_slice(),
            &[0x13, 0x00, 0x01, 0x3a, 0x4f]
        );
        assert_eq!(
            Command::SetVar8(id::PARTY_ENABLED, 1).encode().as_slice(),
            &[0x13, 0x01, 0x02, 0x0f, 0x01, 0x27]
        );
        let bypass = Command::SetVar16(id::BYPASS1_TEMP, 280).encode();
        assert_eq!(&bypass[..6], &[0x13, 0x01, 0x03, 0x1e, 0x18, 0x01]);
        let volts = Command::SetVar32(0x17, 0x0032_0032).encode();
        assert_eq!(volts.len(), 9);
        assert_eq!(valid(&volts).u32_at(0), Some(0x0032_0032));
        assert_eq!(valid(&volts).u16_at(1), Some(0x32));
    }

    #[test]
    fn test_round_trip() {
        let cases: [(u8, Kind, &[u8]); 4] = [
            (0x10, Kind::Write, &[0x35, 0x02, 0xbb]),
            (0x11, Kind::Read, &[0x3a]),
            (0x12, Kind::Acknowledge, &[0x1e, ACK_MARKER]),
            (0x13, Kind::Read, &[]),
        ];
        for (address, kind, body) in cases.iter() {
            let bytes = encode(addr(*address), *kind, body).unwrap();
            let frame = valid(&bytes);
            assert_eq!(frame.address(), Some(addr(*address)));
            assert_eq!(frame.kind(), Some(*kind));
            assert_eq!(frame.declared_len() as usize, body.len());
            assert_eq!(frame.payload(), *body);
            assert_eq!(frame.len(), bytes.len());
        }
    }

    #[test]
    fn test_short_buffers_are_incomplete() {
        let bytes = encode(addr(0x13), Kind::Read, &[]).unwrap();
        for len in 0..MIN_FRAME_LEN {
            assert_eq!(decode(&bytes[..len]), None);
        }
    }

    #[test]
    fn test_single_byte_corruption() {
        let bytes = Command::SetVar16(id::TIME_OF_DAY, 0x1e0c).encode();
        for index in 0..bytes.len() {
            let mut corrupt = bytes.clone();
            corrupt[index] ^= 0x01;
            assert!(
                matches!(decode(&corrupt), Some(Decoded::Invalid(..))),
                "flipping byte {} went unnoticed",
                index
            );
        }
    }

    #[test]
    fn test_decode_all_back_to_back() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode(addr(0x10), Kind::Read, &[]).unwrap());
        buf.extend_from_slice(&encode(addr(0x10), Kind::Acknowledge, &[0x35, 0x55]).unwrap());
        buf.extend_from_slice(&[0x13, 0x00]);
        let frames: Vec<_> = decode_all(&buf).collect();
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Decoded::Valid(f) if f.is_ping(0x10)));
        assert!(matches!(frames[1], Decoded::Valid(f) if f.is_ack_from(0x10)));
    }

    #[test]
    fn test_decode_all_stops_at_invalid() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&encode(addr(0x10), Kind::Read, &[]).unwrap());
        buf.extend_from_slice(&[0x11, 0x00, 0x00, 0x99]);
        buf.extend_from_slice(&encode(addr(0x12), Kind::Read, &[]).unwrap());
        let frames: Vec<_> = decode_all(&buf).collect();
        assert_eq!(frames.len(), 2);
        match frames[1] {
            Decoded::Invalid(frame, Malformed::Checksum) => {
                assert_eq!(frame.raw(), &[0x11, 0x00, 0x00, 0x99])
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_predicates() {
        let no_change = encode(addr(0x11), Kind::Write, &[0x35, 0xaa, 0xbb]).unwrap();
        assert!(valid(&no_change).is_fan_no_change());
        assert!(valid(&no_change).is_routine());

        let level = encode(addr(0x11), Kind::Write, &[0x35, 0x02, 0xbb]).unwrap();
        assert!(!valid(&level).is_fan_no_change());
        assert!(valid(&level).is_status(id::FAN_LEVEL, 3));

        let foreign = encode_raw(0x34, 0, &[]).unwrap();
        assert!(valid(&foreign).is_foreign_ping());
        assert_eq!(valid(&foreign).address(), None);

        let broadcast = encode_raw(BROADCAST, BROADCAST, &[0; 23]).unwrap();
        assert_eq!(broadcast.len(), 27);
        assert!(valid(&broadcast).is_broadcast());
        assert_eq!(valid(&broadcast).kind(), None);
    }

    #[test]
    fn test_value_accessors_are_bounds_checked() {
        let bytes = encode(addr(0x10), Kind::Write, &[0x15, 0x10, 0x27, 0x00, 0x00]).unwrap();
        let frame = valid(&bytes);
        assert_eq!(frame.u32_at(0), Some(10_000));
        assert_eq!(frame.u16_at(0), Some(10_000));
        assert_eq!(frame.u16_at(2), None);
        assert_eq!(frame.u8_at(3), Some(0));
        assert_eq!(frame.u8_at(4), None);
        assert_eq!(frame.u32_at(1), None);
    }

    #[test]
    fn test_hex() {
        assert_eq!(Hex(&[0x13, 0x00, 0x00, 0x14]).to_string(), "13 00 00 14 ");
        assert_eq!(
            Hex(&[0x13, 0x00, 0x01, 0x3a, 0x4f]).to_string(),
            "13 00 01 3a [ 4f ]"
        );
    }
}
