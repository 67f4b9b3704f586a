/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Retransmission rewrite.
//!
//! A stored message is resent with PossDupFlag(43)=Y, a fresh SendingTime(52)
//! and OrigSendingTime(122) carrying the first SendingTime it went out with.
//! BodyLength and CheckSum are recomputed. Rewriting an already rewritten
//! frame with the same SendingTime yields identical bytes.

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use bytes::BytesMut;
use fixline_core::error::DecodeError;
use fixline_core::tags;
use fixline_core::types::Timestamp;

/// Rewrites a stored frame for retransmission.
///
/// # Errors
/// Returns `DecodeError` if `frame` is not a well-formed message.
pub fn rewrite_for_resend(frame: &[u8], sending_time: Timestamp) -> Result<BytesMut, DecodeError> {
    rewrite_into(frame, sending_time, BytesMut::with_capacity(frame.len() + 64)).map(|(m, _)| m)
}

/// Same as [`rewrite_for_resend`] but encodes the body into `scratch`,
/// handing it back alongside the frame.
///
/// # Errors
/// Returns `DecodeError` if `frame` is not a well-formed message.
pub fn rewrite_into(
    frame: &[u8],
    sending_time: Timestamp,
    scratch: BytesMut,
) -> Result<(BytesMut, BytesMut), DecodeError> {
    let raw = Decoder::new(frame)
        .with_checksum_validation(false)
        .with_length_validation(false)
        .decode()?;

    let orig_sending_time = raw
        .get_field(tags::ORIG_SENDING_TIME)
        .or_else(|| raw.get_field(tags::SENDING_TIME))
        .map(|f| f.value);
    let has_sending_time = raw.get_field(tags::SENDING_TIME).is_some();

    let mut encoder = Encoder::with_buffer(raw.begin_string(), scratch);
    for field in raw.fields() {
        match field.tag {
            tags::BEGIN_STRING
            | tags::BODY_LENGTH
            | tags::CHECK_SUM
            | tags::POSS_DUP_FLAG
            | tags::ORIG_SENDING_TIME => {}
            tags::SENDING_TIME => {
                encoder.put_bool(tags::POSS_DUP_FLAG, true);
                encoder.put_timestamp(tags::SENDING_TIME, sending_time);
                if let Some(orig) = orig_sending_time {
                    encoder.put_raw(tags::ORIG_SENDING_TIME, orig);
                }
            }
            tags::MSG_TYPE if !has_sending_time => {
                encoder.put_raw(field.tag, field.value);
                encoder.put_bool(tags::POSS_DUP_FLAG, true);
                encoder.put_timestamp(tags::SENDING_TIME, sending_time);
            }
            _ => encoder.put_raw(field.tag, field.value),
        }
    }

    Ok(encoder.finish_recycle())
}
