use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde_json::{json, Value};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::paths::StatusPath;
use crate::{Error, Result};

pub const FRAME_MARKER: u8 = b'N';
const SEQUENCE_DIGITS: usize = 6;
const HEADER_LEN: usize = 1 + SEQUENCE_DIGITS;
const MAX_BODY_LEN: usize = 64 * 1024;

/// Frame sequence number; wraps at 255 and is written as six digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceNumber(u8);

impl SequenceNumber {
    pub fn new(n: u32) -> Self {
        Self((n % 255) as u8)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    pub fn next(&self) -> Self {
        Self::new(self.0 as u32 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: SequenceNumber,
    pub body: String,
}

impl Frame {
    pub fn new(sequence: SequenceNumber, body: impl Into<String>) -> Self {
        Self {
            sequence,
            body: body.into(),
        }
    }

    pub fn encode(&self) -> String {
        format!("N{}{}", self.sequence, self.body)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// `{"<group>":{"<section>":{"<command>":"<value>"}}}`
pub fn command_body(path: &StatusPath, value: &str) -> Value {
    json!({ &path.group: { &path.section: { &path.command: value } } })
}

/// A command frame and the state that confirms it took effect.
#[derive(Debug, Clone)]
pub struct PendingCommand {
    pub frame: Frame,
    pub path: StatusPath,
    pub value: String,
}

impl PendingCommand {
    pub fn new(sequence: SequenceNumber, path: StatusPath, value: impl Into<String>) -> Self {
        let value = value.into();
        let frame = Frame::new(sequence, command_body(&path, &value).to_string());
        Self { frame, path, value }
    }
}

/// Offset one past the end of the balanced JSON value at the start of `buf`,
/// or `None` if more bytes are needed.
fn json_extent(buf: &[u8]) -> Result<Option<usize>> {
    match buf.first() {
        None => return Ok(None),
        Some(b'{' | b'[') => {}
        Some(other) => {
            return Err(Error::Protocol(format!(
                "frame body starts with {:?}",
                *other as char
            )));
        }
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(i + 1));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Splits the unit's delimiter-free byte stream into frames.
#[derive(Debug, Default)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match src.iter().position(|&b| b == FRAME_MARKER) {
                Some(0) => {}
                Some(skip) => {
                    trace!(skip, "discarding bytes before frame marker");
                    src.advance(skip);
                }
                None => {
                    src.clear();
                    return Ok(None);
                }
            }

            if src.len() < HEADER_LEN {
                return Ok(None);
            }
            if !src[1..HEADER_LEN].iter().all(u8::is_ascii_digit) {
                src.advance(1);
                continue;
            }
            let seq: u32 = std::str::from_utf8(&src[1..HEADER_LEN])
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default();

            let body_len = src.len() - HEADER_LEN;
            let end = match json_extent(&src[HEADER_LEN..]) {
                Ok(Some(end)) => end,
                Ok(None) if body_len > MAX_BODY_LEN => {
                    src.clear();
                    return Err(Error::Protocol("frame body too long".into()));
                }
                Ok(None) => return Ok(None),
                Err(e) => {
                    trace!(error = %e, "resynchronising");
                    src.advance(1);
                    continue;
                }
            };

            let header_and_body = src.split_to(HEADER_LEN + end);
            let body = String::from_utf8(header_and_body[HEADER_LEN..].to_vec())
                .map_err(|e| Error::Protocol(format!("frame body is not UTF-8: {e}")))?;
            return Ok(Some(Frame::new(SequenceNumber::new(seq), body)));
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        let encoded = item.encode();
        dst.reserve(encoded.len());
        dst.put_slice(encoded.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<Frame> {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(input);
        let mut frames = vec![];
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn sequence_wraps_at_255() {
        assert_eq!(SequenceNumber::new(0).next().value(), 1);
        assert_eq!(SequenceNumber::new(253).next().value(), 254);
        assert_eq!(SequenceNumber::new(254).next().value(), 0);
        assert_eq!(SequenceNumber::new(300).value(), 45);
        for n in 0..255u32 {
            let next = SequenceNumber::new(n).next();
            assert_eq!(next.value() as u32, (n + 1) % 255);
            assert_eq!(next.to_string(), format!("{:06}", (n + 1) % 255));
        }
    }

    #[test]
    fn command_frame_shape() {
        let cmd = PendingCommand::new(
            SequenceNumber::new(12),
            "HGOM.GSO.SP".parse().unwrap(),
            "22",
        );
        assert_eq!(cmd.frame.encode(), r#"N000012{"HGOM":{"GSO":{"SP":"22"}}}"#);
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let frames = decode_all(br#"N000001[{"SYST":{}},{"HGOM":{}}]N000002{"a":"}"}"#);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].sequence.value(), 1);
        assert_eq!(frames[0].body, r#"[{"SYST":{}},{"HGOM":{}}]"#);
        assert_eq!(frames[1].body, r#"{"a":"}"}"#);
    }

    #[test]
    fn waits_for_partial_frame() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::from(&b"N000003[{\"SYST\":"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(br#"{}},{"CGOM":{}}]"#);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.sequence.value(), 3);
        assert!(buf.is_empty());
    }

    #[test]
    fn skips_noise_and_bad_headers() {
        let frames = decode_all(br#"xxNabc N000004{"k":"v"}"#);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, r#"{"k":"v"}"#);
    }

    #[test]
    fn escaped_quotes_in_strings() {
        let frames = decode_all(br#"N000005{"k":"a\"}b"}"#);
        assert_eq!(frames[0].body, r#"{"k":"a\"}b"}"#);
    }

    #[test]
    fn encoder_writes_wire_form() {
        let mut codec = FrameCodec;
        let mut dst = BytesMut::new();
        codec
            .encode(Frame::new(SequenceNumber::new(7), "{}"), &mut dst)
            .unwrap();
        assert_eq!(&dst[..], b"N000007{}");
    }
}
