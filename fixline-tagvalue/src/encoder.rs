/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tag=value frame encoder.
//!
//! Fields are appended to a body buffer; [`Encoder::finish`] wraps the body
//! with BeginString, BodyLength and CheckSum. The body buffer can be handed
//! in from a pool and taken back with [`Encoder::finish_recycle`].

use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, Bytes, BytesMut};
use fixline_core::field::Field;
use fixline_core::types::Timestamp;

/// Field delimiter.
pub const SOH: u8 = 0x01;

/// Builds one outbound frame.
#[derive(Debug)]
pub struct Encoder<'a> {
    body: BytesMut,
    begin_string: &'a str,
}

impl<'a> Encoder<'a> {
    /// Starts a frame for `begin_string` with a fresh body buffer.
    #[must_use]
    pub fn new(begin_string: &'a str) -> Self {
        Self::with_buffer(begin_string, BytesMut::with_capacity(256))
    }

    /// Starts a frame that writes its body into `body`, which is cleared first.
    #[must_use]
    pub fn with_buffer(begin_string: &'a str, mut body: BytesMut) -> Self {
        body.clear();
        Self { body, begin_string }
    }

    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Writes `Y` or `N`.
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_raw(tag, if value { b"Y" } else { b"N" });
    }

    /// Writes a UTCTimestamp with millisecond precision.
    #[inline]
    pub fn put_timestamp(&mut self, tag: u32, value: Timestamp) {
        self.put_str(tag, value.format_millis().as_str());
    }

    #[inline]
    pub fn put_field(&mut self, field: &Field) {
        self.put_raw(field.tag, &field.value);
    }

    /// Writes `tag=value<SOH>` with the value bytes untouched.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Completes the frame.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        self.finish_recycle().0
    }

    /// Completes the frame and hands back the body buffer.
    #[must_use]
    pub fn finish_recycle(self) -> (BytesMut, BytesMut) {
        let mut len_buf = itoa::Buffer::new();
        let body_len = len_buf.format(self.body.len());

        let mut frame =
            BytesMut::with_capacity(self.begin_string.len() + body_len.len() + self.body.len() + 16);
        frame.put_slice(b"8=");
        frame.put_slice(self.begin_string.as_bytes());
        frame.put_u8(SOH);
        frame.put_slice(b"9=");
        frame.put_slice(body_len.as_bytes());
        frame.put_u8(SOH);
        frame.put_slice(&self.body);

        let checksum = format_checksum(calculate_checksum(&frame));
        frame.put_slice(b"10=");
        frame.put_slice(&checksum);
        frame.put_u8(SOH);

        (frame, self.body)
    }

    /// Completes the frame as immutable bytes.
    #[must_use]
    pub fn into_frame(self) -> Bytes {
        self.finish().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_frame_is_exact() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "0");

        assert_eq!(
            &encoder.finish()[..],
            b"8=FIX.4.4\x019=5\x0135=0\x0110=163\x01"
        );
    }

    #[test]
    fn test_fields_written_in_order() {
        let mut encoder = Encoder::new("FIX.4.4");
        encoder.put_str(35, "D");
        encoder.put_str(49, "SENDER");
        encoder.put_uint(34, 1);
        encoder.put_bool(43, true);
        encoder.put_bool(97, false);

        let frame = encoder.into_frame();
        let text = String::from_utf8_lossy(&frame);
        assert!(text.contains("35=D\x0149=SENDER\x0134=1\x0143=Y\x0197=N\x01"));
    }

    #[test]
    fn test_recycled_buffer_is_cleared_and_returned() {
        let begin = String::from("FIX.4.2");
        let mut scratch = BytesMut::with_capacity(512);
        scratch.put_slice(b"stale");

        let mut encoder = Encoder::with_buffer(&begin, scratch);
        encoder.put_timestamp(52, Timestamp::from_millis(0));
        encoder.put_field(&Field::uint(34, 9));
        let (frame, scratch) = encoder.finish_recycle();

        let text = String::from_utf8_lossy(&frame);
        assert!(text.starts_with("8=FIX.4.2\x01"));
        assert!(text.contains("52=19700101-00:00:00.000\x0134=9\x01"));
        assert!(!text.contains("stale"));
        assert!(scratch.capacity() >= 512);
    }
}
