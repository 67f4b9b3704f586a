/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session-level (administrative) messages the engine generates.

use fixline_core::message::MsgType;
use fixline_core::tags;
use fixline_tagvalue::Encoder;

/// A session message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminMessage {
    /// Logon (A).
    Logon {
        /// HeartBtInt (108) in seconds.
        heart_bt_int: u64,
        /// ResetSeqNumFlag (141).
        reset_seq_num: bool,
    },
    /// Heartbeat (0), answering a TestRequest when `test_req_id` is set.
    Heartbeat {
        /// TestReqID (112).
        test_req_id: Option<String>,
    },
    /// Test Request (1).
    TestRequest {
        /// TestReqID (112).
        test_req_id: String,
    },
    /// Resend Request (2).
    ResendRequest {
        /// BeginSeqNo (7).
        begin: u64,
        /// EndSeqNo (16), 0 for "through the latest".
        end: u64,
    },
    /// Session-level Reject (3).
    Reject {
        /// RefSeqNum (45).
        ref_seq_num: u64,
        /// RefTagID (371).
        ref_tag: Option<u32>,
        /// RefMsgType (372).
        ref_msg_type: Option<String>,
        /// SessionRejectReason (373).
        reason: Option<u32>,
        /// Text (58).
        text: String,
    },
    /// Sequence Reset (4), GapFill mode when `gap_fill` is set.
    SequenceReset {
        /// NewSeqNo (36).
        new_seq: u64,
        /// GapFillFlag (123).
        gap_fill: bool,
    },
    /// Logout (5).
    Logout {
        /// Text (58).
        text: Option<String>,
    },
}

impl AdminMessage {
    /// Returns the MsgType of this message.
    #[must_use]
    pub fn msg_type(&self) -> MsgType {
        match self {
            Self::Logon { .. } => MsgType::Logon,
            Self::Heartbeat { .. } => MsgType::Heartbeat,
            Self::TestRequest { .. } => MsgType::TestRequest,
            Self::ResendRequest { .. } => MsgType::ResendRequest,
            Self::Reject { .. } => MsgType::Reject,
            Self::SequenceReset { .. } => MsgType::SequenceReset,
            Self::Logout { .. } => MsgType::Logout,
        }
    }

    /// Writes the body fields.
    pub fn write_body(&self, enc: &mut Encoder<'_>) {
        match self {
            Self::Logon {
                heart_bt_int,
                reset_seq_num,
            } => {
                enc.put_uint(tags::ENCRYPT_METHOD, 0);
                enc.put_uint(tags::HEART_BT_INT, *heart_bt_int);
                if *reset_seq_num {
                    enc.put_bool(tags::RESET_SEQ_NUM_FLAG, true);
                }
            }
            Self::Heartbeat { test_req_id } => {
                if let Some(id) = test_req_id {
                    enc.put_str(tags::TEST_REQ_ID, id);
                }
            }
            Self::TestRequest { test_req_id } => {
                enc.put_str(tags::TEST_REQ_ID, test_req_id);
            }
            Self::ResendRequest { begin, end } => {
                enc.put_uint(tags::BEGIN_SEQ_NO, *begin);
                enc.put_uint(tags::END_SEQ_NO, *end);
            }
            Self::Reject {
                ref_seq_num,
                ref_tag,
                ref_msg_type,
                reason,
                text,
            } => {
                enc.put_uint(tags::REF_SEQ_NUM, *ref_seq_num);
                if let Some(tag) = ref_tag {
                    enc.put_uint(tags::REF_TAG_ID, u64::from(*tag));
                }
                if let Some(msg_type) = ref_msg_type {
                    enc.put_str(tags::REF_MSG_TYPE, msg_type);
                }
                if let Some(reason) = reason {
                    enc.put_uint(tags::SESSION_REJECT_REASON, u64::from(*reason));
                }
                enc.put_str(tags::TEXT, text);
            }
            Self::SequenceReset { new_seq, gap_fill } => {
                if *gap_fill {
                    enc.put_bool(tags::GAP_FILL_FLAG, true);
                }
                enc.put_uint(tags::NEW_SEQ_NO, *new_seq);
            }
            Self::Logout { text } => {
                if let Some(text) = text {
                    enc.put_str(tags::TEXT, text);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(msg: &AdminMessage) -> String {
        let mut enc = Encoder::new("FIX.4.4");
        msg.write_body(&mut enc);
        let frame = enc.finish();
        String::from_utf8_lossy(&frame).into_owned()
    }

    #[test]
    fn test_gap_fill_body() {
        let msg = AdminMessage::SequenceReset {
            new_seq: 7,
            gap_fill: true,
        };
        assert_eq!(msg.msg_type(), MsgType::SequenceReset);
        assert!(body(&msg).contains("123=Y\x0136=7\x01"));
    }

    #[test]
    fn test_reject_body() {
        let msg = AdminMessage::Reject {
            ref_seq_num: 4,
            ref_tag: Some(213),
            ref_msg_type: Some("n".into()),
            reason: Some(5),
            text: "bad length".into(),
        };
        assert!(body(&msg).contains("45=4\x01371=213\x01372=n\x01373=5\x0158=bad length\x01"));
    }

    #[test]
    fn test_logon_body() {
        let msg = AdminMessage::Logon {
            heart_bt_int: 30,
            reset_seq_num: true,
        };
        assert!(body(&msg).contains("98=0\x01108=30\x01141=Y\x01"));
    }
}
