/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message views.
//!
//! A frame is decoded into a borrowed [`RawMessage`]. Anything that must
//! outlive the read buffer (held-back messages, application callbacks) is
//! converted into an [`OwnedMessage`], which keeps the frame as `Bytes` and
//! remembers where each value sits.

use crate::error::DecodeError;
use crate::field::FieldRef;
use crate::tags;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::ops::Range;

/// MsgType (35).
///
/// Only the session-level types get their own variant; everything else is
/// carried as `App`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    Heartbeat,
    TestRequest,
    ResendRequest,
    Reject,
    SequenceReset,
    Logout,
    Logon,
    /// `n`. Sequenced like an application message.
    XmlMessage,
    App(String),
}

impl std::str::FromStr for MsgType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "0" => Self::Heartbeat,
            "1" => Self::TestRequest,
            "2" => Self::ResendRequest,
            "3" => Self::Reject,
            "4" => Self::SequenceReset,
            "5" => Self::Logout,
            "A" => Self::Logon,
            "n" => Self::XmlMessage,
            other => Self::App(other.to_string()),
        })
    }
}

impl MsgType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::Reject => "3",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::Logon => "A",
            Self::XmlMessage => "n",
            Self::App(s) => s.as_str(),
        }
    }

    /// True for the seven session-level types.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::Reject
                | Self::SequenceReset
                | Self::Logout
                | Self::Logon
        )
    }

    #[must_use]
    pub fn is_app(&self) -> bool {
        !self.is_admin()
    }

    /// True if a stored message of this type is covered by a GapFill on
    /// resend. Reject is the one session message resent as-is.
    #[must_use]
    pub fn is_gap_filled_on_resend(&self) -> bool {
        self.is_admin() && *self != Self::Reject
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded frame borrowing the read buffer.
#[derive(Debug, Clone)]
pub struct RawMessage<'a> {
    buffer: &'a [u8],
    begin_string: Range<usize>,
    msg_type: MsgType,
    /// Every field in wire order, header and trailer included.
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> RawMessage<'a> {
    #[must_use]
    pub fn new(
        buffer: &'a [u8],
        begin_string: Range<usize>,
        msg_type: MsgType,
        fields: SmallVec<[FieldRef<'a>; 32]>,
    ) -> Self {
        Self {
            buffer,
            begin_string,
            msg_type,
            fields,
        }
    }

    /// The bytes of this frame, `8=` through the CheckSum delimiter.
    #[inline]
    #[must_use]
    pub const fn buffer(&self) -> &'a [u8] {
        self.buffer
    }

    #[must_use]
    pub fn begin_string(&self) -> &'a str {
        std::str::from_utf8(&self.buffer[self.begin_string.clone()]).unwrap_or("")
    }

    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = &FieldRef<'a>> {
        self.fields.iter()
    }

    /// First occurrence of `tag`.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&FieldRef<'a>> {
        self.fields.iter().find(|f| f.tag == tag)
    }

    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&'a str> {
        self.get_field(tag).and_then(|f| f.as_str().ok())
    }

    /// MsgSeqNum (34).
    ///
    /// # Errors
    /// Returns `DecodeError` if the field is missing or not numeric.
    pub fn seq_num(&self) -> Result<u64, DecodeError> {
        self.get_field(tags::MSG_SEQ_NUM)
            .ok_or(DecodeError::MissingRequiredField {
                tag: tags::MSG_SEQ_NUM,
            })?
            .as_u64()
    }

    /// Rebases this view onto `frame`, which must hold exactly the bytes it
    /// was decoded from. No payload is copied.
    #[must_use]
    pub fn into_owned(self, frame: Bytes) -> OwnedMessage {
        let base = self.buffer.as_ptr() as usize;
        let field_offsets = self
            .fields
            .iter()
            .map(|f| {
                let start = f.value.as_ptr() as usize - base;
                (f.tag, start..start + f.value.len())
            })
            .collect();
        OwnedMessage::new(frame, self.msg_type, field_offsets)
    }
}

/// A decoded frame that owns (a reference count on) its buffer.
#[derive(Debug, Clone)]
pub struct OwnedMessage {
    buffer: Bytes,
    msg_type: MsgType,
    /// (tag, value range within `buffer`) in wire order.
    field_offsets: Vec<(u32, Range<usize>)>,
}

impl OwnedMessage {
    #[must_use]
    pub fn new(buffer: Bytes, msg_type: MsgType, field_offsets: Vec<(u32, Range<usize>)>) -> Self {
        Self {
            buffer,
            msg_type,
            field_offsets,
        }
    }

    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// The whole frame.
    #[inline]
    #[must_use]
    pub fn bytes(&self) -> Bytes {
        self.buffer.clone()
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldRef<'_>> {
        self.field_offsets
            .iter()
            .map(|(tag, range)| FieldRef::new(*tag, &self.buffer[range.clone()]))
    }

    /// Raw value of the first occurrence of `tag`.
    #[must_use]
    pub fn get_field(&self, tag: u32) -> Option<&[u8]> {
        self.field_offsets
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, range)| &self.buffer[range.clone()])
    }

    #[must_use]
    pub fn get_field_str(&self, tag: u32) -> Option<&str> {
        self.get_field(tag)
            .and_then(|b| std::str::from_utf8(b).ok())
    }

    #[must_use]
    pub fn get_field_u64(&self, tag: u32) -> Option<u64> {
        self.get_field_str(tag).and_then(|s| s.parse().ok())
    }

    /// Y/N field; absent reads as `false`.
    #[must_use]
    pub fn get_flag(&self, tag: u32) -> bool {
        self.get_field(tag) == Some(b"Y")
    }

    #[must_use]
    pub fn seq_num(&self) -> Option<u64> {
        self.get_field_u64(tags::MSG_SEQ_NUM)
    }

    #[must_use]
    pub fn poss_dup(&self) -> bool {
        self.get_flag(tags::POSS_DUP_FLAG)
    }

    #[must_use]
    pub fn begin_string(&self) -> Option<&str> {
        self.get_field_str(tags::BEGIN_STRING)
    }

    #[must_use]
    pub fn sender_comp_id(&self) -> Option<&str> {
        self.get_field_str(tags::SENDER_COMP_ID)
    }

    #[must_use]
    pub fn target_comp_id(&self) -> Option<&str> {
        self.get_field_str(tags::TARGET_COMP_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_from_str() {
        assert_eq!("0".parse::<MsgType>().unwrap(), MsgType::Heartbeat);
        assert_eq!("A".parse::<MsgType>().unwrap(), MsgType::Logon);
        assert_eq!("n".parse::<MsgType>().unwrap(), MsgType::XmlMessage);
        assert_eq!(
            "D".parse::<MsgType>().unwrap(),
            MsgType::App("D".to_string())
        );
        assert_eq!(MsgType::App("AE".into()).to_string(), "AE");
    }

    #[test]
    fn test_msg_type_admin_classes() {
        assert!(MsgType::Logon.is_admin());
        assert!(MsgType::XmlMessage.is_app());
        assert!(MsgType::Logout.is_gap_filled_on_resend());
        assert!(!MsgType::Reject.is_gap_filled_on_resend());
        assert!(!MsgType::App("8".into()).is_gap_filled_on_resend());
    }

    #[test]
    fn test_owned_message_field_access() {
        // FIX.4.4 is at 2..9, D is at 13..14, 7 is at 18..19, Y is at 23..24
        let buffer = Bytes::from_static(b"8=FIX.4.4\x0135=D\x0134=7\x0143=Y\x01");
        let field_offsets = vec![(8, 2..9), (35, 13..14), (34, 18..19), (43, 23..24)];
        let msg = OwnedMessage::new(buffer, MsgType::App("D".into()), field_offsets);

        assert_eq!(msg.begin_string(), Some("FIX.4.4"));
        assert_eq!(msg.seq_num(), Some(7));
        assert!(msg.poss_dup());
        assert!(!msg.get_flag(123));
        assert_eq!(msg.get_field_str(999), None);
        assert_eq!(msg.fields().count(), 4);
    }
}
