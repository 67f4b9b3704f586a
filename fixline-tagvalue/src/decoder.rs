/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tag=value frame decoder.
//!
//! Decodes one delimited frame into a [`RawMessage`] that borrows the input. Length-prefixed data fields are delimited by their declared
//! byte count so embedded SOH bytes survive; when the declared count does not
//! land on a delimiter the decoder falls back to the next SOH and leaves the
//! mismatch for the structural checks to report.

use crate::checksum::{calculate_checksum, parse_checksum};
use crate::data::data_tag_for;
use crate::encoder::SOH;
use fixline_core::error::DecodeError;
use fixline_core::field::FieldRef;
use fixline_core::message::{MsgType, RawMessage};
use fixline_core::tags;
use memchr::{memchr, memmem};
use smallvec::SmallVec;

const EQUALS: u8 = b'=';

/// Decodes a single frame.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    offset: usize,
    validate_checksum: bool,
    validate_length: bool,
    /// Data field awaiting its declared length: (data tag, byte count).
    pending_data: Option<(u32, usize)>,
}

impl<'a> Decoder<'a> {
    /// Decoder with CheckSum and BodyLength validation on.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
            validate_length: true,
            pending_data: None,
        }
    }

    /// Sets whether to validate checksums during decoding.
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Sets whether to validate BodyLength during decoding.
    #[inline]
    #[must_use]
    pub const fn with_length_validation(mut self, validate: bool) -> Self {
        self.validate_length = validate;
        self
    }

    /// Decodes a complete FIX message from the buffer.
    ///
    /// # Errors
    /// Returns `DecodeError` if the framing fields (8, 9, 35, 10) are missing
    /// or out of order, or if BodyLength/CheckSum disagree with the content.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start_offset = self.offset;

        let begin_string_field = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string_field.tag != tags::BEGIN_STRING || begin_string_field.value.is_empty() {
            return Err(DecodeError::InvalidBeginString);
        }
        let begin_string_start = self.position_of(begin_string_field.value) - start_offset;
        let begin_string =
            begin_string_start..begin_string_start + begin_string_field.value.len();

        let body_length_field = self.next_field().ok_or(DecodeError::MissingBodyLength)?;
        if body_length_field.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        let declared_length: usize = body_length_field
            .as_str()?
            .parse()
            .map_err(|_| DecodeError::InvalidBodyLength)?;

        let body_start = self.offset;

        let msg_type_field = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type_field.tag != tags::MSG_TYPE || msg_type_field.value.is_empty() {
            return Err(DecodeError::MissingMsgType);
        }
        let msg_type: MsgType = match msg_type_field.as_str()?.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        };

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(begin_string_field);
        fields.push(body_length_field);
        fields.push(msg_type_field);

        let mut checksum_field: Option<FieldRef<'a>> = None;
        let mut body_end = body_start;
        loop {
            let field_start = self.offset;
            let Some(field) = self.next_field() else {
                break;
            };
            if field.tag == tags::CHECK_SUM {
                body_end = field_start;
                checksum_field = Some(field);
                fields.push(field);
                break;
            }
            fields.push(field);
        }

        let checksum_ref = checksum_field.ok_or(DecodeError::MissingChecksum)?;

        if self.validate_length {
            let actual = body_end - body_start;
            if actual != declared_length {
                return Err(DecodeError::BodyLengthMismatch {
                    declared: declared_length,
                    actual,
                });
            }
        }

        if self.validate_checksum {
            let declared =
                parse_checksum(checksum_ref.value).ok_or(DecodeError::MissingChecksum)?;
            let calculated = calculate_checksum(&self.input[start_offset..body_end]);
            if calculated != declared {
                return Err(DecodeError::ChecksumMismatch {
                    calculated,
                    declared,
                });
            }
        }

        let buffer = &self.input[start_offset..self.offset];
        Ok(RawMessage::new(buffer, begin_string, msg_type, fields))
    }

    /// Parses the next field from the buffer.
    ///
    /// Returns `None` when the buffer is exhausted or the next field is
    /// malformed.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        if self.offset >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.offset..];
        let eq_pos = memchr(EQUALS, remaining)?;
        let tag = parse_tag(&remaining[..eq_pos])?;
        let value_start = eq_pos + 1;

        let pending = self.pending_data.take();
        let value_len = match pending {
            Some((data_tag, len))
                if data_tag == tag
                    && value_start
                        .checked_add(len)
                        .and_then(|end| remaining.get(end))
                        == Some(&SOH) =>
            {
                len
            }
            _ => memchr(SOH, &remaining[value_start..])?,
        };
        let value = &remaining[value_start..value_start + value_len];
        self.offset += value_start + value_len + 1;

        if let Some(data_tag) = data_tag_for(tag)
            && let Some(len) = std::str::from_utf8(value)
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
        {
            self.pending_data = Some((data_tag, len));
        }

        Some(FieldRef::new(tag, value))
    }

    #[inline]
    fn position_of(&self, value: &[u8]) -> usize {
        value.as_ptr() as usize - self.input.as_ptr() as usize
    }
}

/// Extracts MsgType (35) from a frame without a full decode.
///
/// Used to gate messages on session state before they enter the pipeline.
#[must_use]
pub fn peek_msg_type(frame: &[u8]) -> Option<MsgType> {
    let value = peek_field(frame, b"\x0135=")?;
    let s = std::str::from_utf8(value).ok()?;
    match s.parse::<MsgType>() {
        Ok(t) => Some(t),
        Err(never) => match never {},
    }
}

/// Finds the value following `needle` (which must include the leading SOH).
fn peek_field<'a>(frame: &'a [u8], needle: &[u8]) -> Option<&'a [u8]> {
    let start = memmem::find(frame, needle)? + needle.len();
    let end = start + memchr(SOH, &frame[start..])?;
    Some(&frame[start..end])
}

/// Parses a tag number from ASCII bytes.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }

    let mut result: u32 = 0;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        result = result.checked_mul(10)?.checked_add(u32::from(b - b'0'))?;
    }

    Some(result)
}
