//! Line framing for the agent's stdout.
//!
//! Like `tokio_util::codec::LinesCodec` with a length cap, except invalid UTF-8
//! is replaced instead of failing the stream, trailing whitespace is trimmed,
//! and blank lines are skipped.

use crate::error::GatewayError;
use bytes::BytesMut;
use std::cmp;
use tokio_util::codec::Decoder;

/// 100 MiB, the largest single stream-json message we accept.
pub const DEFAULT_MAX_LINE_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AgentLineCodec {
    max_length: usize,
    /// Bytes already scanned for a newline in the current buffer.
    next_index: usize,
}

impl AgentLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
            next_index: 0,
        }
    }
}

impl Default for AgentLineCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_BYTES)
    }
}

fn to_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Decoder for AgentLineCodec {
    type Item = String;
    type Error = GatewayError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<String>, GatewayError> {
        loop {
            let read_to = cmp::min(self.max_length.saturating_add(1), buf.len());
            let newline = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match newline {
                Some(offset) => {
                    let newline_index = self.next_index + offset;
                    self.next_index = 0;
                    let frame = buf.split_to(newline_index + 1);
                    if let Some(line) = to_line(&frame[..newline_index]) {
                        return Ok(Some(line));
                    }
                }
                None if buf.len() > self.max_length => {
                    return Err(GatewayError::OutputRead(format!(
                        "output line exceeds {} bytes",
                        self.max_length
                    )));
                }
                None => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<String>, GatewayError> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        // Final line without a trailing newline.
        let rest = buf.split_to(buf.len());
        self.next_index = 0;
        Ok(to_line(&rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(codec: &mut AgentLineCodec, input: &[u8]) -> Vec<String> {
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(line) = codec.decode(&mut buf).unwrap() {
            out.push(line);
        }
        while let Some(line) = codec.decode_eof(&mut buf).unwrap() {
            out.push(line);
        }
        out
    }

    #[test]
    fn test_splits_trims_and_skips_blank_lines() {
        let mut codec = AgentLineCodec::default();
        let lines = decode_all(&mut codec, b"one\r\n\n  \ntwo  \nthree");
        assert_eq!(lines, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_fatal() {
        let mut codec = AgentLineCodec::default();
        let lines = decode_all(&mut codec, b"ok \xff\xfe end\nnext\n");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("ok "));
        assert!(lines[0].ends_with(" end"));
        assert_eq!(lines[1], "next");
    }

    #[test]
    fn test_partial_line_waits_for_more_input() {
        let mut codec = AgentLineCodec::default();
        let mut buf = BytesMut::from(&b"{\"type\":"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"\"system\"}\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("{\"type\":\"system\"}")
        );
    }

    #[test]
    fn test_overlong_line_is_a_read_failure() {
        let mut codec = AgentLineCodec::new(8);
        let mut buf = BytesMut::from(&b"0123456789abcdef"[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, GatewayError::OutputRead(_)));
    }

    #[test]
    fn test_line_at_exact_limit_is_accepted() {
        let mut codec = AgentLineCodec::new(4);
        let mut buf = BytesMut::from(&b"abcd\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("abcd"));
    }
}
