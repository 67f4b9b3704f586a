/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Tag numbers used by the session layer.
//!
//! Only the standard header, trailer and session-message tags are listed here;
//! application tags belong to the dictionary layer.

/// BeginString.
pub const BEGIN_STRING: u32 = 8;
/// BodyLength.
pub const BODY_LENGTH: u32 = 9;
/// CheckSum.
pub const CHECK_SUM: u32 = 10;
/// BeginSeqNo (ResendRequest).
pub const BEGIN_SEQ_NO: u32 = 7;
/// EndSeqNo (ResendRequest).
pub const END_SEQ_NO: u32 = 16;
/// MsgSeqNum.
pub const MSG_SEQ_NUM: u32 = 34;
/// MsgType.
pub const MSG_TYPE: u32 = 35;
/// NewSeqNo (SequenceReset).
pub const NEW_SEQ_NO: u32 = 36;
/// PossDupFlag.
pub const POSS_DUP_FLAG: u32 = 43;
/// RefSeqNum (Reject).
pub const REF_SEQ_NUM: u32 = 45;
/// SenderCompID.
pub const SENDER_COMP_ID: u32 = 49;
/// SenderSubID.
pub const SENDER_SUB_ID: u32 = 50;
/// SendingTime.
pub const SENDING_TIME: u32 = 52;
/// TargetCompID.
pub const TARGET_COMP_ID: u32 = 56;
/// TargetSubID.
pub const TARGET_SUB_ID: u32 = 57;
/// Text.
pub const TEXT: u32 = 58;
/// PossResend.
pub const POSS_RESEND: u32 = 97;
/// EncryptMethod (Logon).
pub const ENCRYPT_METHOD: u32 = 98;
/// HeartBtInt (Logon).
pub const HEART_BT_INT: u32 = 108;
/// TestReqID.
pub const TEST_REQ_ID: u32 = 112;
/// OrigSendingTime.
pub const ORIG_SENDING_TIME: u32 = 122;
/// GapFillFlag (SequenceReset).
pub const GAP_FILL_FLAG: u32 = 123;
/// ResetSeqNumFlag (Logon).
pub const RESET_SEQ_NUM_FLAG: u32 = 141;
/// XmlDataLen.
pub const XML_DATA_LEN: u32 = 212;
/// XmlData.
pub const XML_DATA: u32 = 213;
/// RefTagID (Reject).
pub const REF_TAG_ID: u32 = 371;
/// RefMsgType (Reject).
pub const REF_MSG_TYPE: u32 = 372;
/// SessionRejectReason (Reject).
pub const SESSION_REJECT_REASON: u32 = 373;
/// DefaultApplVerID (FIXT Logon).
pub const DEFAULT_APPL_VER_ID: u32 = 1137;

/// SessionRejectReason values used by the engine.
pub mod reject_reason {
    /// Required tag missing.
    pub const REQUIRED_TAG_MISSING: u32 = 1;
    /// Value is incorrect (out of range) for this tag.
    pub const VALUE_INCORRECT: u32 = 5;
    /// Incorrect data format for value.
    pub const INCORRECT_DATA_FORMAT: u32 = 6;
    /// CompID problem.
    pub const COMP_ID_PROBLEM: u32 = 9;
    /// SendingTime accuracy problem.
    pub const SENDING_TIME_ACCURACY: u32 = 10;
    /// Invalid MsgType.
    pub const INVALID_MSG_TYPE: u32 = 11;
    /// Other.
    pub const OTHER: u32 = 99;
}
