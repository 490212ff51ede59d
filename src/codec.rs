//! Frame decoding for the status stream body.
//!
//! The streaming response body is newline-delimited JSON. Each line is one
//! [`Frame`]: either a status update or the final stream status. Chunks from
//! the transport may split or join lines arbitrarily, so [`FrameDecoder`]
//! buffers bytes until a full line is available.

use serde::{Deserialize, Serialize};

use crate::types::{StatusUpdate, StreamStatus, WatchError};

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    /// A status update.
    Update(StatusUpdate),
    /// The final status of the stream.
    Status(StreamStatus),
}

impl Frame {
    /// Encodes the frame as a single newline-terminated line.
    pub fn to_line(&self) -> Result<String, WatchError> {
        let mut line = serde_json::to_string(self).map_err(|e| WatchError::Decode(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }
}

/// Default upper bound on the length of a single frame, in bytes.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Incremental decoder for newline-delimited frames.
///
/// Each buffered byte is searched for a line break once. A line, or a
/// partial line still waiting for its newline, longer than the frame limit
/// fails with [`WatchError::Decode`].
#[derive(Debug)]
pub struct FrameDecoder {
    /// Bytes received but not yet forming a complete line.
    buf: Vec<u8>,
    /// Prefix of `buf` already known to hold no newline.
    scanned: usize,
    /// Maximum frame length in bytes.
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Creates an empty decoder with the default frame limit.
    pub const fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    /// Creates an empty decoder accepting frames up to `max_frame_len` bytes.
    pub const fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self { buf: Vec::new(), scanned: 0, max_frame_len }
    }

    /// Returns the frame limit in bytes.
    pub const fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Appends a chunk of body bytes.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns the next complete frame, if one is buffered.
    ///
    /// Blank lines are skipped. Decoded updates are validated before being
    /// returned.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, WatchError> {
        loop {
            let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_frame_len {
                    return Err(self.oversized());
                }
                return Ok(None);
            };

            let end = self.scanned + offset;
            self.scanned = 0;
            if end > self.max_frame_len {
                return Err(self.oversized());
            }
            let line: Vec<u8> = self.buf.drain(..=end).collect();
            if let Some(frame) = decode_line(&line[..end])? {
                return Ok(Some(frame));
            }
        }
    }

    /// Finishes decoding at end of body.
    ///
    /// A complete final frame without a trailing newline is still decoded;
    /// a fragment that does not parse is a truncated frame.
    pub fn finish(&mut self) -> Result<Option<Frame>, WatchError> {
        if let Some(frame) = self.next_frame()? {
            return Ok(Some(frame));
        }
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        decode_line(&rest).map_err(|e| WatchError::Decode(format!("truncated frame: {e}")))
    }

    /// Returns the number of buffered bytes.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    fn oversized(&mut self) -> WatchError {
        self.buf.clear();
        self.scanned = 0;
        WatchError::Decode(format!("frame exceeds {} bytes", self.max_frame_len))
    }
}

/// Decodes a single line, returning `None` for blank lines.
fn decode_line(line: &[u8]) -> Result<Option<Frame>, WatchError> {
    let text = std::str::from_utf8(line).map_err(|e| WatchError::Decode(e.to_string()))?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let frame: Frame = serde_json::from_str(text).map_err(|e| WatchError::Decode(e.to_string()))?;
    if let Frame::Update(update) = &frame {
        update.validate()?;
    }
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::types::{ComponentStatus, ErrorKind};

    fn db_ok() -> StatusUpdate {
        StatusUpdate::new(vec![ComponentStatus::new("db", true)], Some("ok".to_string()))
    }

    #[test]
    fn test_frame_wire_format() {
        let line = Frame::Update(db_ok()).to_line().unwrap();
        assert_eq!(
            line,
            "{\"update\":{\"components\":[{\"id\":\"db\",\"alive\":true}],\"message\":\"ok\"}}\n"
        );

        let line = Frame::Status(StreamStatus::default()).to_line().unwrap();
        assert_eq!(line, "{\"status\":{\"code\":0,\"details\":\"\"}}\n");
    }

    #[test]
    fn test_decoder_split_chunks() {
        let line = Frame::Update(db_ok()).to_line().unwrap();
        let (a, b) = line.as_bytes().split_at(7);

        let mut decoder = FrameDecoder::new();
        decoder.push(a);
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(b);
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Update(db_ok())));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_joined_chunks_keep_order() {
        let mut body = String::new();
        for i in 0..3 {
            let update = StatusUpdate::new(vec![], Some(format!("m{i}")));
            body.push_str(&Frame::Update(update).to_line().unwrap());
        }
        body.push_str("\n\r\n");
        body.push_str(&Frame::Status(StreamStatus::default()).to_line().unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(body.as_bytes());

        let mut messages = Vec::new();
        while let Some(frame) = decoder.next_frame().unwrap() {
            match frame {
                Frame::Update(u) => messages.push(u.message.unwrap()),
                Frame::Status(s) => assert!(s.is_ok()),
            }
        }
        assert_eq!(messages, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn test_finish_without_trailing_newline() {
        let mut decoder = FrameDecoder::new();
        decoder.push(br#"{"status":{"code":0}}"#);
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.finish().unwrap(), Some(Frame::Status(StreamStatus::default())));
        assert_eq!(decoder.finish().unwrap(), None);
    }

    #[test]
    fn test_finish_truncated() {
        let mut decoder = FrameDecoder::new();
        decoder.push(br#"{"update":{"compo"#);
        let err = decoder.finish().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("truncated"));
    }

    #[rstest]
    #[case::not_json("hello\n")]
    #[case::unknown_frame("{\"ping\":{}}\n")]
    #[case::wrong_type("{\"update\":{\"components\":[{\"id\":\"db\",\"alive\":\"yes\"}]}}\n")]
    #[case::empty_id("{\"update\":{\"components\":[{\"id\":\"\",\"alive\":true}]}}\n")]
    fn test_decoder_rejects(#[case] input: &str) {
        let mut decoder = FrameDecoder::new();
        decoder.push(input.as_bytes());
        let err = decoder.next_frame().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_decoder_rejects_unterminated_oversized_line() {
        let mut decoder = FrameDecoder::with_max_frame_len(1024);
        let chunk = [b'x'; 256];
        for _ in 0..4 {
            decoder.push(&chunk);
            assert_eq!(decoder.next_frame().unwrap(), None);
        }

        decoder.push(&chunk);
        let err = decoder.next_frame().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.to_string().contains("frame exceeds 1024 bytes"));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_rejects_oversized_complete_line() {
        let line = Frame::Update(db_ok()).to_line().unwrap();
        let mut decoder = FrameDecoder::with_max_frame_len(line.len() - 2);
        decoder.push(line.as_bytes());
        assert!(matches!(decoder.next_frame(), Err(WatchError::Decode(_))));
    }

    #[test]
    fn test_decoder_frame_at_limit() {
        let line = Frame::Update(db_ok()).to_line().unwrap();
        let mut decoder = FrameDecoder::with_max_frame_len(line.len() - 1);
        let (body, newline) = line.as_bytes().split_at(line.len() - 1);
        for byte in body {
            decoder.push(std::slice::from_ref(byte));
            assert_eq!(decoder.next_frame().unwrap(), None);
        }
        decoder.push(newline);
        assert_eq!(decoder.next_frame().unwrap(), Some(Frame::Update(db_ok())));
        assert_eq!(decoder.max_frame_len(), line.len() - 1);
    }

    #[test]
    fn test_decoder_invalid_utf8() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0xff, 0xfe, b'\n']);
        assert!(matches!(decoder.next_frame(), Err(WatchError::Decode(_))));
    }
}
