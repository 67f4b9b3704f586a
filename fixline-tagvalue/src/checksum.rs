/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FIX checksum calculation.
//!
//! The FIX checksum is the sum of all bytes preceding the `10=` field modulo
//! 256, rendered as three zero-padded digits.

/// Length of the trailer `10=NNN<SOH>`.
pub const TRAILER_LEN: usize = 7;

/// Calculates the FIX checksum for the given data.
///
/// # Example
/// ```
/// use fixline_tagvalue::calculate_checksum;
///
/// let data = b"8=FIX.4.4\x019=5\x0135=0\x01";
/// assert_eq!(calculate_checksum(data), 163);
/// ```
#[inline]
#[must_use]
pub fn calculate_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Formats a checksum value as a 3-digit zero-padded string.
#[inline]
#[must_use]
pub fn format_checksum(checksum: u8) -> [u8; 3] {
    [
        b'0' + (checksum / 100),
        b'0' + ((checksum / 10) % 10),
        b'0' + (checksum % 10),
    ]
}

/// Parses a 3-digit checksum string to a u8 value.
///
/// Returns `None` unless `bytes` is exactly three ASCII digits in 0..=255.
#[inline]
#[must_use]
pub fn parse_checksum(bytes: &[u8]) -> Option<u8> {
    if bytes.len() != 3 || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let value = bytes
        .iter()
        .fold(0u16, |acc, &b| acc * 10 + u16::from(b - b'0'));
    u8::try_from(value).ok()
}

/// Verifies the trailer of a complete frame.
///
/// Returns `(calculated, declared)` when the frame ends with a well-formed
/// `10=NNN<SOH>` trailer, `None` otherwise.
#[must_use]
pub fn verify_trailer(frame: &[u8]) -> Option<(u8, u8)> {
    if frame.len() < TRAILER_LEN {
        return None;
    }
    let trailer_start = frame.len() - TRAILER_LEN;
    let trailer = &frame[trailer_start..];
    if &trailer[..3] != b"10=" || trailer[6] != 0x01 {
        return None;
    }
    let declared = parse_checksum(&trailer[3..6])?;
    Some((calculate_checksum(&frame[..trailer_start]), declared))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_checksum() {
        assert_eq!(calculate_checksum(b""), 0);
        let expected = (u32::from(b'A') + u32::from(b'B') + u32::from(b'C')) % 256;
        assert_eq!(u32::from(calculate_checksum(b"ABC")), expected);
        let data = vec![255u8; 1000];
        assert_eq!(calculate_checksum(&data), ((255u32 * 1000) % 256) as u8);
    }

    #[test]
    fn test_format_and_parse() {
        assert_eq!(format_checksum(7), *b"007");
        assert_eq!(format_checksum(255), *b"255");
        assert_eq!(parse_checksum(b"042"), Some(42));
        assert_eq!(parse_checksum(b"256"), None);
        assert_eq!(parse_checksum(b"12X"), None);
        assert_eq!(parse_checksum(b"0000"), None);
    }

    #[test]
    fn test_verify_trailer() {
        let body = b"8=FIX.4.4\x019=5\x0135=0\x01";
        let mut frame = body.to_vec();
        frame.extend_from_slice(b"10=");
        frame.extend_from_slice(&format_checksum(calculate_checksum(body)));
        frame.push(0x01);

        let (calculated, declared) = verify_trailer(&frame).unwrap();
        assert_eq!(calculated, declared);
        assert!(verify_trailer(b"8=FIX.4.4\x01").is_none());
    }
}
