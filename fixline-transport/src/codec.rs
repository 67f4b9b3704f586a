/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tokio codec for FIX message framing.
//!
//! This module provides a codec that splits a byte stream into FIX frames
//! using BeginString and BodyLength. Bytes that cannot start a frame are
//! skipped up to the next `8=FIX` so a burst of garbage costs the garbage,
//! not the connection. Field-level validation is left to the session.

use bytes::{BufMut, Bytes, BytesMut};
use fixline_tagvalue::checksum::{TRAILER_LEN, verify_trailer};
use memchr::{memchr, memmem};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

/// Errors that can occur during codec operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Checksum mismatch.
    #[error("checksum mismatch: calculated {calculated}, declared {declared}")]
    ChecksumMismatch {
        /// Calculated checksum.
        calculated: u8,
        /// Declared checksum in message.
        declared: u8,
    },

    /// Message exceeds maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max_size}")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max_size: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// SOH delimiter.
const SOH: u8 = 0x01;

/// Every frame starts with this prefix (FIX.4.x and FIXT.1.1).
const BEGIN_MARKER: &[u8] = b"8=FIX";

/// Longest BeginString header we wait for before calling it garbage.
const MAX_HEADER_PREFIX: usize = 32;

/// Outcome of inspecting the head of the buffer.
enum Frame {
    /// Not enough bytes yet.
    Need,
    /// The head cannot be a frame; skip it.
    Garbage,
    /// A complete frame of this many bytes.
    Complete(usize),
}

/// Tokio codec for FIX message framing.
#[derive(Debug, Clone)]
pub struct FixCodec {
    /// Maximum message size in bytes.
    max_message_size: usize,
    /// Whether to validate checksums.
    validate_checksum: bool,
    /// Bytes dropped while resynchronising.
    discarded: u64,
}

impl FixCodec {
    /// Creates a new codec with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1MB
            validate_checksum: false,
            discarded: 0,
        }
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets whether to reject frames with a bad checksum at the framing level.
    ///
    /// Off by default: the session reports bad checksums as garbled messages.
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Returns how many bytes were skipped while resynchronising.
    #[must_use]
    pub const fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    fn discard(&mut self, src: &mut BytesMut, n: usize) {
        if n == 0 {
            return;
        }
        let _ = src.split_to(n);
        self.discarded += n as u64;
        warn!(bytes = n, "discarded unframed bytes");
    }

    /// Positions `src` at a frame start. Returns false if more data is needed.
    fn resync(&mut self, src: &mut BytesMut) -> bool {
        if src.len() < BEGIN_MARKER.len() {
            return false;
        }
        if src.starts_with(BEGIN_MARKER) {
            return true;
        }
        match memmem::find(src, BEGIN_MARKER) {
            Some(pos) => {
                self.discard(src, pos);
                true
            }
            None => {
                // Keep a tail that could be the start of a split marker.
                let keep = BEGIN_MARKER.len() - 1;
                let n = src.len() - keep;
                self.discard(src, n);
                false
            }
        }
    }

    fn inspect(&self, src: &mut BytesMut) -> Result<Frame, CodecError> {
        let Some(first_soh) = memchr(SOH, src) else {
            return Ok(if src.len() > MAX_HEADER_PREFIX {
                Frame::Garbage
            } else {
                Frame::Need
            });
        };

        let body_len_start = first_soh + 1;
        if src.len() < body_len_start + 2 {
            return Ok(Frame::Need);
        }
        if &src[body_len_start..body_len_start + 2] != b"9=" {
            return Ok(Frame::Garbage);
        }

        let Some(pos) = memchr(SOH, &src[body_len_start..]) else {
            return Ok(if src.len() - body_len_start > 12 {
                Frame::Garbage
            } else {
                Frame::Need
            });
        };
        let body_len_soh = body_len_start + pos;

        let Some(body_length) = std::str::from_utf8(&src[body_len_start + 2..body_len_soh])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
        else {
            return Ok(Frame::Garbage);
        };

        // BodyLength counts from after 9=XXX| to before 10=
        let total_length = (body_len_soh + 1 + TRAILER_LEN).saturating_add(body_length);
        if total_length > self.max_message_size {
            return Err(CodecError::MessageTooLarge {
                size: total_length,
                max_size: self.max_message_size,
            });
        }

        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(Frame::Need);
        }

        let trailer = total_length - TRAILER_LEN;
        if &src[trailer..trailer + 3] == b"10=" && src[total_length - 1] == SOH {
            return Ok(Frame::Complete(total_length));
        }

        // BodyLength is wrong; frame up to the real trailer so the session can
        // report the message and the stream stays aligned.
        Ok(
            match memmem::find(&src[body_len_soh..], b"\x0110=")
                .map(|p| body_len_soh + p + 1 + TRAILER_LEN)
            {
                Some(end) if end <= src.len() && src[end - 1] == SOH => Frame::Complete(end),
                _ => Frame::Garbage,
            },
        )
    }
}

impl Default for FixCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FixCodec {
    type Item = Bytes;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if !self.resync(src) {
                return Ok(None);
            }
            match self.inspect(src)? {
                Frame::Need => return Ok(None),
                Frame::Garbage => {
                    // Drop this false start and look for the next one.
                    self.discard(src, 1);
                }
                Frame::Complete(len) => {
                    let frame = src.split_to(len).freeze();
                    if self.validate_checksum
                        && let Some((calculated, declared)) = verify_trailer(&frame)
                        && calculated != declared
                    {
                        return Err(CodecError::ChecksumMismatch {
                            calculated,
                            declared,
                        });
                    }
                    trace!(len, "framed message");
                    return Ok(Some(frame));
                }
            }
        }
    }
}

impl Encoder<&[u8]> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(item);
        Ok(())
    }
}

impl Encoder<Bytes> for FixCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_tagvalue::calculate_checksum;

    fn make_fix_message(body: &str) -> Vec<u8> {
        let header = format!("8=FIX.4.4\x019={}\x01", body.len());
        let without_checksum = format!("{}{}", header, body);
        let checksum = calculate_checksum(without_checksum.as_bytes());
        format!("{}10={:03}\x01", without_checksum, checksum).into_bytes()
    }

    #[test]
    fn test_codec_decode_complete_message() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x01");
        let mut buf = BytesMut::from(&msg[..]);

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result.as_deref(), Some(&msg[..]));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_decode_incomplete() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x01");
        let mut buf = BytesMut::from(&msg[..msg.len() - 5]);

        let result = codec.decode(&mut buf).unwrap();
        assert!(result.is_none());
        assert_eq!(codec.discarded_bytes(), 0);
    }

    #[test]
    fn test_codec_skips_leading_garbage() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x0134=1\x01");
        let mut buf = BytesMut::from(&b"noise\x01\x01more"[..]);
        buf.extend_from_slice(&msg);

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result.as_deref(), Some(&msg[..]));
        assert_eq!(codec.discarded_bytes(), 11);
    }

    #[test]
    fn test_codec_skips_false_start() {
        let mut codec = FixCodec::new();
        let msg = make_fix_message("35=0\x01");
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x01XX\x01"[..]);
        buf.extend_from_slice(&msg);

        let result = codec.decode(&mut buf).unwrap();
        assert_eq!(result.as_deref(), Some(&msg[..]));
    }

    #[test]
    fn test_codec_wrong_body_length_frames_to_trailer() {
        let mut codec = FixCodec::new();
        let bad = b"8=FIX.4.4\x019=3\x0135=0\x0134=2\x0110=000\x01";
        let good = make_fix_message("35=0\x01");
        let mut buf = BytesMut::from(&bad[..]);
        buf.extend_from_slice(&good);

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&first[..], &bad[..]);
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&second[..], &good[..]);
    }

    #[test]
    fn test_codec_two_messages_in_one_read() {
        let mut codec = FixCodec::new();
        let a = make_fix_message("35=0\x0134=1\x01");
        let b = make_fix_message("35=0\x0134=2\x01");
        let mut buf = BytesMut::from(&a[..]);
        buf.extend_from_slice(&b);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&a[..]));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(&b[..]));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_codec_decode_checksum_mismatch() {
        let mut codec = FixCodec::new().with_checksum_validation(true);
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_codec_decode_no_checksum_validation() {
        let mut codec = FixCodec::new();
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=5\x0135=0\x0110=000\x01"[..]);

        let result = codec.decode(&mut buf).unwrap();
        assert!(result.is_some());
    }

    #[test]
    fn test_codec_message_too_large() {
        let mut codec = FixCodec::new().with_max_message_size(64);
        let mut buf = BytesMut::from(&b"8=FIX.4.4\x019=500\x0135=0\x01"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_codec_body_length_beyond_usize() {
        let mut codec = FixCodec::new();
        let mut buf =
            BytesMut::from(&b"8=FIX.4.4\x019=18446744073709551615\x0135=0\x0110=000\x01"[..]);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { size: usize::MAX, .. })
        ));
    }

    #[test]
    fn test_codec_encode() {
        let mut codec = FixCodec::new();
        let msg = b"8=FIX.4.4\x019=5\x0135=0\x0110=123\x01";
        let mut dst = BytesMut::new();

        codec.encode(&msg[..], &mut dst).unwrap();
        assert_eq!(&dst[..], msg);
    }
}
