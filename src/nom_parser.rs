use nom::combinator::{consumed, verify};
use nom::multi::length_data;
use nom::number::streaming::u8;
use nom::sequence::tuple;
use nom::Err::Incomplete;
use nom::IResult;

use crate::frame::{checksum, Malformed, MIN_FRAME_LEN};

type Buf = [u8];

#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub(crate) enum FrameToken<'a> {
    Frame(&'a Buf),
    Malformed(&'a Buf, Malformed),
    NeedData,
}

/// Slice the first frame off `buf`. Returns the number of bytes consumed and the token.
pub(crate) fn parse_frame(buf: &Buf) -> (usize, FrameToken<'_>) {
    if buf.len() < MIN_FRAME_LEN {
        return (0, FrameToken::NeedData);
    }
    match frame(buf) {
        Ok((_rest, raw)) => (raw.len(), FrameToken::Frame(raw)),
        Err(Incomplete(_)) => (buf.len(), FrameToken::Malformed(buf, Malformed::Truncated)),
        Err(_) => {
            let len = (MIN_FRAME_LEN + buf[2] as usize).min(buf.len());
            (len, FrameToken::Malformed(&buf[..len], Malformed::Checksum))
        }
    }
}

fn frame(buf: &Buf) -> IResult<&Buf, &Buf> {
    let (rest, (covered, _header)) = consumed(tuple((u8, u8, length_data(u8))))(buf)?;
    let (rest, _) = verify(u8, |received: &u8| checksum(covered) == *received)(rest)?;
    Ok((rest, &buf[..buf.len() - rest.len()]))
}

/// Parsers for the values of command line options.
pub(crate) mod args {
    use nom::branch::alt;
    use nom::bytes::complete::tag;
    use nom::character::complete::{char, one_of, u16, u32, u8};
    use nom::combinator::{all_consuming, opt};
    use nom::sequence::{preceded, tuple};
    use nom::IResult;

    /// Leading `HH:MM` with unchecked numbers. Minutes are `None` without the colon.
    pub(crate) fn clock(s: &str) -> IResult<&str, (u32, Option<u32>)> {
        tuple((u32, opt(preceded(char(':'), u32))))(s)
    }

    /// `m:L`, the level is unchecked.
    pub(crate) fn manual_level(s: &str) -> IResult<&str, u8> {
        all_consuming(preceded(tag("m:"), u8))(s)
    }

    /// `L:V` or `L:V.v` (also `L:V,v`), returning level, volts and tenths.
    pub(crate) fn voltage(s: &str) -> IResult<&str, (u8, u16, Option<u16>)> {
        let (rest, (level, _, volts, tenths)) = all_consuming(tuple((
            u8,
            char(':'),
            u16,
            opt(preceded(one_of(".,"), u16)),
        )))(s)?;
        Ok((rest, (level, volts, tenths)))
    }

    pub(crate) fn number(s: &str) -> IResult<&str, u16> {
        all_consuming(u16)(s)
    }

    /// `0` or `1` as a literal switch.
    pub(crate) fn switch(s: &str) -> IResult<&str, bool> {
        all_consuming(alt((
            nom::combinator::value(false, char('0')),
            nom::combinator::value(true, char('1')),
        )))(s)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        // ping to 0x13 followed by a request for variable 0x3a
        let buf = [0x13, 0x00, 0x00, 0x14, 0x13, 0x00, 0x01, 0x3a, 0x4f];
        assert_eq!(parse_frame(&buf), (4, FrameToken::Frame(&buf[..4])));
        assert_eq!(parse_frame(&buf[4..]), (5, FrameToken::Frame(&buf[4..])));
    }

    #[test]
    fn test_need_data() {
        assert_eq!(parse_frame(b""), (0, FrameToken::NeedData));
        assert_eq!(parse_frame(&[0x13, 0x00, 0x01]), (0, FrameToken::NeedData));
    }

    #[test]
    fn test_truncated() {
        let buf = [0x13, 0x01, 0x03, 0x1e, 0x18];
        assert_eq!(
            parse_frame(&buf),
            (5, FrameToken::Malformed(&buf, Malformed::Truncated))
        );
    }

    #[test]
    fn test_bad_checksum() {
        let buf = [0x13, 0x00, 0x01, 0x3a, 0x50, 0x13, 0x00, 0x00, 0x14];
        assert_eq!(
            parse_frame(&buf),
            (5, FrameToken::Malformed(&buf[..5], Malformed::Checksum))
        );
    }
}
