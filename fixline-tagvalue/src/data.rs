/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Length-prefixed data fields.
//!
//! FIX `data` fields may contain SOH, so they can only be delimited using the
//! byte count carried by the companion `Length` field that precedes them.

/// (length tag, data tag) pairs defined by the standard FIX dictionaries.
pub const DATA_FIELDS: &[(u32, u32)] = &[
    (90, 91),   // SecureDataLen / SecureData
    (93, 89),   // SignatureLength / Signature
    (95, 96),   // RawDataLength / RawData
    (212, 213), // XmlDataLen / XmlData
    (348, 349), // EncodedIssuerLen / EncodedIssuer
    (350, 351), // EncodedSecurityDescLen / EncodedSecurityDesc
    (352, 353), // EncodedListExecInstLen / EncodedListExecInst
    (354, 355), // EncodedTextLen / EncodedText
    (356, 357), // EncodedSubjectLen / EncodedSubject
    (358, 359), // EncodedHeadlineLen / EncodedHeadline
    (360, 361), // EncodedAllocTextLen / EncodedAllocText
    (362, 363), // EncodedUnderlyingIssuerLen / EncodedUnderlyingIssuer
    (364, 365), // EncodedUnderlyingSecurityDescLen / EncodedUnderlyingSecurityDesc
    (445, 446), // EncodedListStatusTextLen / EncodedListStatusText
    (618, 619), // EncodedLegIssuerLen / EncodedLegIssuer
    (621, 622), // EncodedLegSecurityDescLen / EncodedLegSecurityDesc
];

/// Returns the data tag delimited by `length_tag`, if it is a length field.
#[inline]
#[must_use]
pub fn data_tag_for(length_tag: u32) -> Option<u32> {
    DATA_FIELDS
        .iter()
        .find(|(len, _)| *len == length_tag)
        .map(|(_, data)| *data)
}

/// Returns the length tag that delimits `data_tag`, if it is a data field.
#[inline]
#[must_use]
pub fn length_tag_for(data_tag: u32) -> Option<u32> {
    DATA_FIELDS
        .iter()
        .find(|(_, data)| *data == data_tag)
        .map(|(len, _)| *len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pairs() {
        assert_eq!(data_tag_for(212), Some(213));
        assert_eq!(length_tag_for(89), Some(93));
        assert_eq!(data_tag_for(35), None);
        assert_eq!(length_tag_for(58), None);
    }
}
