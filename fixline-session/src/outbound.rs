/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Outbound message framing.
//!
//! The session owns the standard header: MsgType, CompIDs, MsgSeqNum,
//! PossDupFlag and SendingTime are written here and cannot be supplied by
//! the application.

use bytes::BytesMut;
use fixline_core::error::EncodeError;
use fixline_core::field::Field;
use fixline_core::tags;
use fixline_core::types::Timestamp;
use fixline_tagvalue::Encoder;

/// Tags the session writes itself.
const RESERVED_TAGS: &[u32] = &[
    tags::BEGIN_STRING,
    tags::BODY_LENGTH,
    tags::CHECK_SUM,
    tags::MSG_SEQ_NUM,
    tags::MSG_TYPE,
    tags::POSS_DUP_FLAG,
    tags::SENDER_COMP_ID,
    tags::SENDING_TIME,
    tags::TARGET_COMP_ID,
    tags::ORIG_SENDING_TIME,
];

/// Standard header values shared by every outbound message of a session.
#[derive(Debug, Clone, Copy)]
pub struct Header<'a> {
    /// BeginString (8).
    pub begin_string: &'a str,
    /// SenderCompID (49).
    pub sender: &'a str,
    /// TargetCompID (56).
    pub target: &'a str,
    /// SenderSubID (50).
    pub sender_sub_id: Option<&'a str>,
    /// TargetSubID (57).
    pub target_sub_id: Option<&'a str>,
}

/// Per-message header values.
#[derive(Debug, Clone, Copy)]
pub struct Stamp {
    /// MsgSeqNum (34).
    pub seq: u64,
    /// SendingTime (52).
    pub sending_time: Timestamp,
    /// Sets PossDupFlag(43)=Y and OrigSendingTime(122)=SendingTime.
    pub poss_dup: bool,
}

/// Encodes a complete frame: header, `body`, trailer.
///
/// Returns the frame and the scratch buffer for reuse.
pub fn encode_frame(
    header: &Header<'_>,
    msg_type: &str,
    stamp: Stamp,
    scratch: BytesMut,
    body: impl FnOnce(&mut Encoder<'_>),
) -> (BytesMut, BytesMut) {
    let mut enc = Encoder::with_buffer(header.begin_string, scratch);
    enc.put_str(tags::MSG_TYPE, msg_type);
    enc.put_str(tags::SENDER_COMP_ID, header.sender);
    enc.put_str(tags::TARGET_COMP_ID, header.target);
    enc.put_uint(tags::MSG_SEQ_NUM, stamp.seq);
    if let Some(sub) = header.sender_sub_id {
        enc.put_str(tags::SENDER_SUB_ID, sub);
    }
    if let Some(sub) = header.target_sub_id {
        enc.put_str(tags::TARGET_SUB_ID, sub);
    }
    if stamp.poss_dup {
        enc.put_bool(tags::POSS_DUP_FLAG, true);
    }
    enc.put_timestamp(tags::SENDING_TIME, stamp.sending_time);
    if stamp.poss_dup {
        enc.put_timestamp(tags::ORIG_SENDING_TIME, stamp.sending_time);
    }
    body(&mut enc);
    enc.finish_recycle()
}

/// Application message handed to the session for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    msg_type: String,
    fields: Vec<Field>,
}

impl OutboundMessage {
    /// Starts a message of `msg_type`.
    #[must_use]
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a string field.
    #[must_use]
    pub fn with_str(mut self, tag: u32, value: &str) -> Self {
        self.fields.push(Field::string(tag, value));
        self
    }

    /// Appends an unsigned integer field.
    #[must_use]
    pub fn with_uint(mut self, tag: u32, value: u64) -> Self {
        self.fields.push(Field::uint(tag, value));
        self
    }

    /// Appends a field.
    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Returns the MsgType.
    #[must_use]
    pub fn msg_type(&self) -> &str {
        &self.msg_type
    }

    /// Returns the body fields.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Checks that no session-managed tag is present.
    ///
    /// # Errors
    /// Returns `EncodeError::ReservedField` for the first offending tag.
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.msg_type.is_empty() {
            return Err(EncodeError::MissingRequiredField {
                tag: tags::MSG_TYPE,
            });
        }
        match self.fields.iter().find(|f| RESERVED_TAGS.contains(&f.tag)) {
            Some(f) => Err(EncodeError::ReservedField { tag: f.tag }),
            None => Ok(()),
        }
    }

    /// Writes the body fields.
    pub fn write_body(&self, enc: &mut Encoder<'_>) {
        for field in &self.fields {
            enc.put_field(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_tagvalue::Decoder;

    fn header() -> Header<'static> {
        Header {
            begin_string: "FIX.4.4",
            sender: "BUY",
            target: "SELL",
            sender_sub_id: None,
            target_sub_id: Some("DESK"),
        }
    }

    #[test]
    fn test_encode_frame_header_order() {
        let msg = OutboundMessage::new("D").with_str(11, "ORD-1").with_uint(38, 100);
        msg.validate().unwrap();

        let stamp = Stamp {
            seq: 7,
            sending_time: Timestamp::from_millis(0),
            poss_dup: false,
        };
        let (frame, _) = encode_frame(&header(), msg.msg_type(), stamp, BytesMut::new(), |enc| {
            msg.write_body(enc)
        });

        let text = String::from_utf8_lossy(&frame);
        assert!(text.contains(
            "35=D\x0149=BUY\x0156=SELL\x0134=7\x0157=DESK\x0152=19700101-00:00:00.000\x0111=ORD-1\x0138=100\x01"
        ));
        assert!(!text.contains("43="));
        let raw = Decoder::new(&frame).decode().unwrap();
        assert_eq!(raw.seq_num().unwrap(), 7);
    }

    #[test]
    fn test_poss_dup_stamp() {
        let stamp = Stamp {
            seq: 3,
            sending_time: Timestamp::from_millis(0),
            poss_dup: true,
        };
        let (frame, _) = encode_frame(&header(), "4", stamp, BytesMut::new(), |_| {});
        let raw = Decoder::new(&frame).decode().unwrap();
        assert_eq!(raw.get_field_str(43), Some("Y"));
        assert_eq!(raw.get_field_str(122), raw.get_field_str(52));
    }

    #[test]
    fn test_reserved_fields_rejected() {
        let msg = OutboundMessage::new("D").with_uint(34, 5);
        assert_eq!(msg.validate(), Err(EncodeError::ReservedField { tag: 34 }));
        assert!(OutboundMessage::new("").validate().is_err());
    }
}
