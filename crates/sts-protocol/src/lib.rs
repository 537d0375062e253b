//! The netstring framing used by the Postfix socketmap dialect:
//! `<len>:<payload>,` where `<len>` is an ASCII decimal byte count.
//!
//! `Decoder` buffers partial reads across calls the way a line-oriented
//! server scans its own read buffer for a terminator and `drain`s only the
//! bytes it consumed — adapted here from CRLF-line scanning to
//! length-prefixed frame scanning. A `Decoder` is per-connection state and
//! must never be shared between connections.

use thiserror::Error;

pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("netstring length prefix is not a decimal integer")]
    InvalidLength,
    #[error("netstring length {len} exceeds the maximum frame size of {max}")]
    FrameTooLarge { len: usize, max: usize },
    #[error("netstring is missing its trailing comma terminator")]
    MissingTerminator,
}

pub struct Decoder {
    max_frame_len: usize,
    buffer: Vec<u8>,
}

impl Decoder {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len,
            buffer: Vec::new(),
        }
    }

    /// Buffer more bytes read off the wire.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pull one complete frame's payload out of the buffered bytes, if one
    /// is available. Call repeatedly after each `push` until it returns
    /// `Ok(None)` to drain every frame a chunk may have completed.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        let Some(colon) = self.buffer.iter().position(|&b| b == b':') else {
            // Bound how many length-prefix digits we'll buffer before
            // giving up, so a peer that never sends ':' cannot grow the
            // buffer without limit.
            if self.buffer.len() > digit_budget(self.max_frame_len) {
                return Err(ProtocolError::InvalidLength);
            }
            return Ok(None);
        };

        let len_bytes = &self.buffer[..colon];
        if len_bytes.is_empty() || !len_bytes.iter().all(u8::is_ascii_digit) {
            return Err(ProtocolError::InvalidLength);
        }
        let len: usize = std::str::from_utf8(len_bytes)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(ProtocolError::InvalidLength)?;
        if len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }

        let needed = colon + 1 + len + 1;
        if self.buffer.len() < needed {
            return Ok(None);
        }
        if self.buffer[colon + 1 + len] != b',' {
            return Err(ProtocolError::MissingTerminator);
        }

        let payload = self.buffer[colon + 1..colon + 1 + len].to_vec();
        self.buffer.drain(0..needed);
        Ok(Some(payload))
    }
}

fn digit_budget(max_frame_len: usize) -> usize {
    max_frame_len.to_string().len() + 1
}

/// Encode `payload` as a netstring. Unbuffered: a single complete frame in,
/// a single complete frame out.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(payload);
    out.push(b',');
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_all(max: usize, data: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let mut decoder = Decoder::new(max);
        decoder.push(data);
        let mut frames = vec![];
        while let Some(frame) = decoder.next_frame()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    #[test]
    fn round_trip() {
        for payload in [&b""[..], b"hello", b" example.com", b"OK secure match=mail.example.com"]
        {
            let encoded = encode(payload);
            let frames = decode_all(DEFAULT_MAX_FRAME_LEN, &encoded).unwrap();
            assert_eq!(frames, vec![payload.to_vec()]);
        }
    }

    #[test]
    fn pipelined_frames_in_one_chunk() {
        let mut data = encode(b"one");
        data.extend(encode(b"two"));
        let frames = decode_all(DEFAULT_MAX_FRAME_LEN, &data).unwrap();
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn partial_frame_buffers_across_pushes() {
        let encoded = encode(b"example.com");
        let mut decoder = Decoder::new(DEFAULT_MAX_FRAME_LEN);
        decoder.push(&encoded[..5]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(&encoded[5..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(b"example.com".to_vec()));
    }

    #[test]
    fn non_digit_length_is_protocol_error() {
        let err = decode_all(DEFAULT_MAX_FRAME_LEN, b"3x:abc,").unwrap_err();
        assert_eq!(err, ProtocolError::InvalidLength);
    }

    #[test]
    fn missing_colon_past_budget_is_protocol_error() {
        let digits = "9".repeat(64);
        let err = decode_all(DEFAULT_MAX_FRAME_LEN, digits.as_bytes()).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidLength);
    }

    #[test]
    fn missing_terminator_is_protocol_error() {
        let err = decode_all(DEFAULT_MAX_FRAME_LEN, b"3:abcX").unwrap_err();
        assert_eq!(err, ProtocolError::MissingTerminator);
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let err = decode_all(4, b"5:abcde,").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::FrameTooLarge { len: 5, max: 4 }
        );
    }
}
