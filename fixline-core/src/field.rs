/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tag/value pairs.
//!
//! [`FieldRef`] borrows a value out of a received frame. [`Field`] owns its
//! value and is what outbound messages are composed from.

use crate::error::DecodeError;
use bytes::Bytes;
use std::fmt;

/// A field borrowed from a frame buffer. `value` excludes the `=` and SOH.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    pub tag: u32,
    pub value: &'a [u8],
}

impl<'a> FieldRef<'a> {
    #[inline]
    #[must_use]
    pub const fn new(tag: u32, value: &'a [u8]) -> Self {
        Self { tag, value }
    }

    /// # Errors
    /// Returns `DecodeError::InvalidUtf8` if the value is not UTF-8.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.value).map_err(DecodeError::from)
    }

    /// Reads the value as a non-negative integer.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not digits.
    pub fn as_u64(&self) -> Result<u64, DecodeError> {
        let text = self.as_str()?;
        text.parse().map_err(|_| DecodeError::InvalidFieldValue {
            tag: self.tag,
            reason: format!("'{text}' is not an unsigned integer"),
        })
    }
}

/// Owned tag/value pair.
///
/// Values are kept as raw bytes so data fields (which may contain SOH)
/// survive composition untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub tag: u32,
    pub value: Bytes,
}

impl Field {
    #[must_use]
    pub fn new(tag: u32, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    #[must_use]
    pub fn string(tag: u32, value: &str) -> Self {
        Self::new(tag, Bytes::copy_from_slice(value.as_bytes()))
    }

    #[must_use]
    pub fn uint(tag: u32, value: u64) -> Self {
        Self::new(tag, Bytes::from(value.to_string()))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.tag, String::from_utf8_lossy(&self.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_ref_reads_text_and_integers() {
        assert_eq!(FieldRef::new(11, b"ORDER123").as_str().unwrap(), "ORDER123");
        assert_eq!(FieldRef::new(34, b"12345").as_u64().unwrap(), 12345);
        assert!(FieldRef::new(34, b"12a").as_u64().is_err());
        assert!(FieldRef::new(34, b"-1").as_u64().is_err());
    }

    #[test]
    fn test_field_ref_invalid_utf8() {
        assert!(FieldRef::new(1, &[0xFF, 0xFE]).as_str().is_err());
    }

    #[test]
    fn test_owned_field_display() {
        assert_eq!(Field::uint(34, 42).to_string(), "34=42");
        assert_eq!(Field::string(58, "bye").to_string(), "58=bye");
        assert_eq!(Field::new(95, &b"a\x01b"[..]).value.len(), 3);
    }
}
