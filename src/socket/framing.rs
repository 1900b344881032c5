//! Frame codec for relay traffic over a Unix socket.
//!
//! Each message travels as one frame:
//!
//! ```text
//! +----------------+---------+----------------------------+
//! | len: u32 (LE)  | tag: u8 | body: len - 1 bytes        |
//! +----------------+---------+----------------------------+
//! ```
//!
//! `len` counts the tag byte plus the body. The only tag in use is
//! [`frame_type::JSON`]; its body is a UTF-8 JSON document, normally an
//! envelope. The hub does not look inside bodies, so anything that parses
//! as JSON is relayed.

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

/// Upper bound on `len` (16 MB).
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Bytes in the length prefix.
const HEADER_LEN: usize = 4;

/// Frame tag values.
pub mod frame_type {
    /// Body is a JSON document.
    pub const JSON: u8 = 0x01;
}

/// Serialize `value` as a complete JSON frame.
pub fn encode_json(value: &Value) -> Vec<u8> {
    // `Value` serialization cannot fail.
    let body = serde_json::to_vec(value).unwrap_or_default();
    let len = u32::try_from(body.len() + 1).unwrap_or(u32::MAX);

    let mut frame = Vec::with_capacity(HEADER_LEN + 1 + body.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.push(frame_type::JSON);
    frame.extend_from_slice(&body);
    frame
}

/// Reassembles frames from an arbitrary chunking of the byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
}

impl FrameDecoder {
    /// Empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every message completed by them.
    ///
    /// A trailing partial frame stays buffered until the next call.
    ///
    /// # Errors
    ///
    /// Fails on a zero or oversized length, an unknown tag, or a body that
    /// is not JSON. The stream cannot be resynchronized after an error.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Value>> {
        self.pending.extend_from_slice(bytes);

        let mut out = Vec::new();
        let mut cursor = 0;
        while let Some((tag, body)) = next_frame(&self.pending[cursor..])? {
            out.push(parse_body(tag, body)?);
            cursor += HEADER_LEN + 1 + body.len();
        }
        self.pending.drain(..cursor);

        Ok(out)
    }

    /// Whether bytes of an unfinished frame are buffered.
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Split the first complete frame off `buf`, if there is one.
fn next_frame(buf: &[u8]) -> Result<Option<(u8, &[u8])>> {
    let Some(header) = buf.get(..HEADER_LEN) else {
        return Ok(None);
    };
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if len == 0 {
        bail!("Invalid frame: zero length");
    }
    if len > MAX_FRAME_SIZE {
        bail!("Frame too large: {len} bytes (max {MAX_FRAME_SIZE})");
    }

    let end = HEADER_LEN + len as usize;
    let Some(frame) = buf.get(HEADER_LEN..end) else {
        return Ok(None);
    };
    Ok(Some((frame[0], &frame[1..])))
}

fn parse_body(tag: u8, body: &[u8]) -> Result<Value> {
    match tag {
        frame_type::JSON => {
            serde_json::from_slice(body).map_err(|e| anyhow!("Invalid JSON frame: {e}"))
        }
        other => bail!("Unknown frame type: 0x{other:02x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_frame_decodes() {
        let msg = json!({"kind": "mirror", "source": "main", "action": "presence:ping"});
        let mut decoder = FrameDecoder::new();
        let messages = decoder.feed(&encode_json(&msg)).unwrap();
        assert_eq!(messages, vec![msg]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_header_layout() {
        let encoded = encode_json(&json!(1));
        // tag byte + body "1"
        assert_eq!(&encoded[..4], &2u32.to_le_bytes());
        assert_eq!(encoded[4], frame_type::JSON);
        assert_eq!(&encoded[5..], b"1");
    }

    #[test]
    fn test_back_to_back_frames_in_one_chunk() {
        let mut stream = Vec::new();
        for value in [json!({"n": 1}), json!("plain"), json!({"n": 2})] {
            stream.extend_from_slice(&encode_json(&value));
        }

        let mut decoder = FrameDecoder::new();
        let messages = decoder.feed(&stream).unwrap();
        assert_eq!(messages, vec![json!({"n": 1}), json!("plain"), json!({"n": 2})]);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let first = encode_json(&json!({"key": "value"}));
        let second = encode_json(&json!([true]));
        let mut stream = first.clone();
        stream.extend_from_slice(&second);

        // Cut inside the second frame's header.
        let cut = first.len() + 2;
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(&stream[..cut]).unwrap(), vec![json!({"key": "value"})]);
        assert!(decoder.has_partial());

        assert_eq!(decoder.feed(&stream[cut..]).unwrap(), vec![json!([true])]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_byte_at_a_time() {
        let encoded = encode_json(&json!({"x": [1, 2, 3]}));
        let mut decoder = FrameDecoder::new();
        let (last, head) = encoded.split_last().unwrap();
        for byte in head {
            assert!(decoder.feed(&[*byte]).unwrap().is_empty());
        }
        assert_eq!(decoder.feed(&[*last]).unwrap(), vec![json!({"x": [1, 2, 3]})]);
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected_before_body_arrives() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&(MAX_FRAME_SIZE + 1).to_le_bytes()).is_err());
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let mut frame = 5u32.to_le_bytes().to_vec();
        frame.push(0xFF);
        frame.extend_from_slice(b"test");

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&frame).is_err());
    }

    #[test]
    fn test_invalid_json_rejected() {
        let mut frame = 4u32.to_le_bytes().to_vec();
        frame.push(frame_type::JSON);
        frame.extend_from_slice(b"{no");

        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&frame).is_err());
    }
}
