//! Sentinel-delimited payload reassembly.
//!
//! A payload is delimited by literal begin/end marker tokens instead of a
//! length prefix. The payload itself may contain embedded line breaks, and
//! the transport may deliver it split anywhere, including mid-marker, so
//! the receiver must accumulate raw bytes until both markers have been
//! seen with begin preceding end.

use crate::{Result, StashError};
use bytes::{BufMut, BytesMut};

/// Accumulates raw inbound bytes until a begin/end marker pair encloses a
/// complete payload.
///
/// Used by the server while a session awaits an upload
/// (`CONTENT_BEGIN`/`CONTENT_END`) and by the client to reassemble
/// `/read` and `/download` response blocks.
#[derive(Debug)]
pub struct SentinelAccumulator {
    begin: &'static str,
    end: &'static str,
    buf: BytesMut,
    max_bytes: usize,
}

impl SentinelAccumulator {
    /// `max_bytes` bounds the accumulated buffer; exceeding it fails the
    /// transfer instead of growing without limit.
    pub fn new(begin: &'static str, end: &'static str, max_bytes: usize) -> Self {
        Self {
            begin,
            end,
            buf: BytesMut::new(),
            max_bytes,
        }
    }

    /// Append a raw chunk and check for a complete payload.
    ///
    /// Returns `Ok(Some(payload))` once both markers are present with begin
    /// preceding end; the payload is the text strictly between them with
    /// surrounding whitespace trimmed. Returns `Ok(None)` while more data
    /// is needed (an end marker seen before any begin marker keeps
    /// waiting). Anything buffered after the end marker is discarded.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<String>> {
        if self.buf.len() + chunk.len() > self.max_bytes {
            return Err(StashError::Capacity(format!(
                "payload exceeds maximum of {} bytes",
                self.max_bytes
            )));
        }
        self.buf.put_slice(chunk);

        let text = String::from_utf8_lossy(&self.buf);
        let Some(begin_at) = text.find(self.begin) else {
            return Ok(None);
        };
        let payload_from = begin_at + self.begin.len();
        let Some(end_at) = text[payload_from..].find(self.end) else {
            return Ok(None);
        };

        let payload = text[payload_from..payload_from + end_at].trim().to_string();
        self.buf.clear();
        Ok(Some(payload))
    }

    /// Bytes currently buffered while waiting for the marker pair.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BEGIN: &str = "CONTENT_BEGIN";
    const END: &str = "CONTENT_END";
    const MAX: usize = 1024;

    #[test]
    fn test_single_chunk_payload() {
        let mut acc = SentinelAccumulator::new(BEGIN, END, MAX);
        let got = acc.push(b"CONTENT_BEGIN\nhello world\nCONTENT_END\n").unwrap();
        assert_eq!(got.as_deref(), Some("hello world"));
        assert_eq!(acc.buffered(), 0);
    }

    #[test]
    fn test_payload_split_across_chunks() {
        let mut acc = SentinelAccumulator::new(BEGIN, END, MAX);
        assert!(acc.push(b"CONTENT_BEGIN\nhel").unwrap().is_none());
        assert!(acc.push(b"lo wor").unwrap().is_none());
        let got = acc.push(b"ld\nCONTENT_END").unwrap();
        assert_eq!(got.as_deref(), Some("hello world"));
    }

    #[test]
    fn test_marker_split_mid_token() {
        let mut acc = SentinelAccumulator::new(BEGIN, END, MAX);
        assert!(acc.push(b"CONTENT_BE").unwrap().is_none());
        assert!(acc.push(b"GIN\ndata\nCONTENT_E").unwrap().is_none());
        let got = acc.push(b"ND").unwrap();
        assert_eq!(got.as_deref(), Some("data"));
    }

    #[test]
    fn test_payload_with_embedded_newlines() {
        let mut acc = SentinelAccumulator::new(BEGIN, END, MAX);
        let got = acc
            .push(b"CONTENT_BEGIN\nline one\nline two\n\nline four\nCONTENT_END")
            .unwrap();
        assert_eq!(got.as_deref(), Some("line one\nline two\n\nline four"));
    }

    #[test]
    fn test_end_before_begin_keeps_waiting() {
        // CONTENT_END arriving first is not a frame; the begin marker must
        // precede it.
        let mut acc = SentinelAccumulator::new(BEGIN, END, MAX);
        assert!(acc.push(b"CONTENT_END\n").unwrap().is_none());
        assert!(acc.push(b"CONTENT_BEGIN\npayload\n").unwrap().is_none());
        let got = acc.push(b"CONTENT_END").unwrap();
        assert_eq!(got.as_deref(), Some("payload"));
    }

    #[test]
    fn test_empty_payload_trims_to_empty() {
        let mut acc = SentinelAccumulator::new(BEGIN, END, MAX);
        let got = acc.push(b"CONTENT_BEGIN\n\nCONTENT_END").unwrap();
        assert_eq!(got.as_deref(), Some(""));
    }

    #[test]
    fn test_size_cap_enforced() {
        let mut acc = SentinelAccumulator::new(BEGIN, END, 32);
        assert!(acc.push(b"CONTENT_BEGIN\n0123456789").unwrap().is_none());
        let err = acc.push(b"0123456789001234567890").unwrap_err();
        assert!(matches!(err, StashError::Capacity(_)));
    }

    #[test]
    fn test_trailing_bytes_after_end_discarded() {
        let mut acc = SentinelAccumulator::new(BEGIN, END, MAX);
        let got = acc.push(b"CONTENT_BEGIN\nabc\nCONTENT_END\ntrailing").unwrap();
        assert_eq!(got.as_deref(), Some("abc"));
        assert_eq!(acc.buffered(), 0);
    }
}
