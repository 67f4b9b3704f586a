/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Sequencing and session message handling.
//!
//! [`PerTypeStage`] decides what an inbound message means for the ledger
//! (in order, gap, duplicate, regression) and consumes the session message
//! types. Application messages continue to delivery.

use crate::admin::AdminMessage;
use crate::application::{Diagnostic, RejectReason};
use crate::config::{DuplicatePolicy, GapPolicy, RegressionPolicy, Role};
use crate::exchange::{AppEvent, Exchange};
use crate::pipeline::{Flow, Inbound, Stage};
use crate::replay::ReplayPlanner;
use crate::resend::ResendRange;
use crate::sequence::SequenceCheck;
use crate::state::SessionState;
use async_trait::async_trait;
use fixline_core::error::{ErrorClass, SessionError};
use fixline_core::message::{MsgType, OwnedMessage};
use fixline_core::tags::{self, reject_reason};
use fixline_core::types::Timestamp;
use fixline_store::{Direction, ReplayCursor};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Sequence accounting and session message dispatch.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerTypeStage;

#[async_trait]
impl Stage for PerTypeStage {
    fn name(&self) -> &'static str {
        "per-type"
    }

    async fn process(&self, msg: &mut Inbound, cx: &mut Exchange<'_>) -> Result<Flow, SessionError> {
        let Some(message) = msg.message.clone() else {
            return Ok(Flow::Stop);
        };
        if !check_envelope(msg, &message, cx).await {
            return Ok(Flow::Stop);
        }
        match message.msg_type() {
            MsgType::Logon => on_logon(msg, &message, cx).await,
            MsgType::SequenceReset if !message.get_flag(tags::GAP_FILL_FLAG) => {
                on_hard_reset(msg, &message, cx).await
            }
            _ => sequenced(msg, message, cx).await,
        }
    }
}

/// Version, identity and latency checks. Returns false if the session was
/// terminated.
async fn check_envelope(msg: &Inbound, message: &OwnedMessage, cx: &mut Exchange<'_>) -> bool {
    let config = cx.config();
    if message.begin_string() != Some(config.begin_string.as_str()) {
        let reason = format!(
            "unsupported BeginString {}",
            message.begin_string().unwrap_or_default()
        );
        cx.report(Diagnostic::new(
            ErrorClass::SessionProtocol,
            reason.clone(),
            Some(msg.seq),
            msg.frame().clone(),
        ));
        cx.abort(&reason).await;
        return false;
    }

    if config.check_comp_ids
        && (message.sender_comp_id() != Some(config.target_comp_id.as_str())
            || message.target_comp_id() != Some(config.sender_comp_id.as_str()))
    {
        let reason = RejectReason::new(reject_reason::COMP_ID_PROBLEM, "CompID problem");
        terminate_with_reject(msg, message, cx, reason).await;
        return false;
    }

    if let Some(max_latency) = config.max_latency {
        let skew = message
            .get_field_str(tags::SENDING_TIME)
            .and_then(Timestamp::parse_fix)
            .map(|sent| Duration::from_millis(Timestamp::now().as_millis().abs_diff(sent.as_millis())));
        let reason = match skew {
            None => Some(
                RejectReason::new(reject_reason::REQUIRED_TAG_MISSING, "SendingTime missing")
                    .with_ref_tag(tags::SENDING_TIME),
            ),
            Some(skew) if skew > max_latency => Some(
                RejectReason::new(
                    reject_reason::SENDING_TIME_ACCURACY,
                    format!("SendingTime off by {} ms", skew.as_millis()),
                )
                .with_ref_tag(tags::SENDING_TIME),
            ),
            Some(_) => None,
        };
        if let Some(reason) = reason {
            terminate_with_reject(msg, message, cx, reason).await;
            return false;
        }
    }
    true
}

/// Rejects the message and logs out.
async fn terminate_with_reject(
    msg: &Inbound,
    message: &OwnedMessage,
    cx: &mut Exchange<'_>,
    reason: RejectReason,
) {
    cx.report(Diagnostic::new(
        ErrorClass::SessionProtocol,
        reason.text.clone(),
        Some(msg.seq),
        msg.frame().clone(),
    ));
    if cx.state().is_logged_on() {
        cx.reject(msg.seq, message.msg_type(), &reason).await;
    }
    cx.abort(&reason.text).await;
}

async fn on_logon(
    msg: &mut Inbound,
    message: &OwnedMessage,
    cx: &mut Exchange<'_>,
) -> Result<Flow, SessionError> {
    let role = cx.config().role;
    let state = cx.state();
    let expected_state = match role {
        Role::Acceptor => SessionState::Connecting,
        Role::Initiator => SessionState::LogonSent,
    };
    if state != expected_state {
        return invalid_logon(msg, cx, format!("unexpected Logon in state {state}")).await;
    }
    let Some(heart_bt_int) = message.get_field_u64(tags::HEART_BT_INT) else {
        return invalid_logon(msg, cx, "HeartBtInt missing or invalid".to_string()).await;
    };
    if role == Role::Initiator && heart_bt_int != cx.config().heartbeat_interval_secs() {
        warn!(
            session = %cx.session_id(),
            heart_bt_int,
            "counterparty answered with a different HeartBtInt"
        );
    }

    let peer_reset = message.get_flag(tags::RESET_SEQ_NUM_FLAG);
    let reset = match role {
        Role::Acceptor => peer_reset || cx.config().reset_on_logon,
        Role::Initiator => peer_reset && !cx.inner.reset_requested,
    };
    if reset {
        info!(session = %cx.session_id(), "resetting sequence numbers on logon");
        match role {
            Role::Acceptor => {
                cx.env.ledger.reset();
                if let Err(error) = cx.env.store.reset(&cx.env.id).await {
                    error!(session = %cx.session_id(), %error, "failed to reset store");
                }
            }
            Role::Initiator => cx.env.ledger.set_next_inbound(1),
        }
    }

    let seq = msg.seq;
    let check = cx.env.ledger.check(seq);
    if let SequenceCheck::TooLow { expected, received } = check {
        let error = SessionError::SequenceTooLow { expected, received };
        cx.report(Diagnostic::new(
            ErrorClass::Sequencing,
            error.to_string(),
            Some(seq),
            msg.frame().clone(),
        ));
        cx.abort(&error.to_string()).await;
        return Ok(Flow::Stop);
    }

    match role {
        Role::Acceptor => {
            cx.inner
                .heartbeat
                .set_interval(Duration::from_secs(heart_bt_int));
            cx.move_to(SessionState::LogonReceived);
            cx.send_admin(&AdminMessage::Logon {
                heart_bt_int,
                reset_seq_num: reset,
            })
            .await;
            if cx.inner.close_requested {
                return Ok(Flow::Stop);
            }
        }
        Role::Initiator => cx.move_to(SessionState::LogonPending),
    }

    match check {
        SequenceCheck::Gap { expected, received } => {
            request_resend(cx, expected, received).await;
            cx.inner.gaps.mark_delivered_ahead(received);
        }
        _ => {
            cx.env.ledger.accept_inbound(seq);
        }
    }

    cx.move_to(SessionState::Active);
    cx.inner.reset_requested = false;
    cx.inner.logged_on = true;
    cx.inner.heartbeat.reset(cx.now());
    cx.env.stats.record_logon();
    cx.events.push(AppEvent::Logon);
    info!(session = %cx.session_id(), heart_bt_int, "logon complete");
    Ok(Flow::Continue)
}

async fn invalid_logon(msg: &Inbound, cx: &mut Exchange<'_>, reason: String) -> Result<Flow, SessionError> {
    let error = SessionError::LogonRejected { reason };
    cx.report(Diagnostic::new(
        ErrorClass::SessionProtocol,
        error.to_string(),
        Some(msg.seq),
        msg.frame().clone(),
    ));
    cx.abort(&error.to_string()).await;
    Ok(Flow::Stop)
}

/// SequenceReset without GapFillFlag: MsgSeqNum is ignored and the ledger
/// jumps to NewSeqNo, abandoning outstanding recovery.
async fn on_hard_reset(
    msg: &mut Inbound,
    message: &OwnedMessage,
    cx: &mut Exchange<'_>,
) -> Result<Flow, SessionError> {
    let Some(new_seq) = message.get_field_u64(tags::NEW_SEQ_NO) else {
        reject_message(
            msg,
            message,
            cx,
            RejectReason::new(reject_reason::REQUIRED_TAG_MISSING, "NewSeqNo missing")
                .with_ref_tag(tags::NEW_SEQ_NO),
        )
        .await;
        return Ok(Flow::Stop);
    };
    let expected = cx.next_inbound();
    if new_seq < expected {
        let error = SessionError::SequenceResetBackwards { expected, new_seq };
        cx.report(Diagnostic::new(
            ErrorClass::Sequencing,
            error.to_string(),
            Some(msg.seq),
            msg.frame().clone(),
        ));
        let reason = RejectReason::new(reject_reason::VALUE_INCORRECT, error.to_string())
            .with_ref_tag(tags::NEW_SEQ_NO);
        cx.reject(msg.seq, message.msg_type(), &reason).await;
        return Ok(Flow::Stop);
    }

    cx.env.ledger.set_next_inbound(new_seq);
    for range in cx.inner.gaps.abandon() {
        warn!(session = %cx.session_id(), %range, "resend range abandoned by sequence reset");
    }
    info!(session = %cx.session_id(), new_seq, "inbound sequence reset");
    msg.skip_store = true;
    Ok(Flow::Continue)
}

/// Every message type whose MsgSeqNum is checked against the ledger.
async fn sequenced(
    msg: &mut Inbound,
    message: OwnedMessage,
    cx: &mut Exchange<'_>,
) -> Result<Flow, SessionError> {
    let seq = msg.seq;
    match cx.env.ledger.check(seq) {
        SequenceCheck::Ok => {}
        SequenceCheck::TooLow { expected, received } => {
            return too_low(msg, &message, cx, expected, received).await;
        }
        SequenceCheck::Gap { expected, received } => {
            return gap(msg, message, cx, expected, received).await;
        }
    }

    let msg_type = message.msg_type();
    if message.poss_dup()
        && *msg_type != MsgType::SequenceReset
        && message.get_field(tags::ORIG_SENDING_TIME).is_none()
    {
        msg.reject(
            RejectReason::new(reject_reason::REQUIRED_TAG_MISSING, "OrigSendingTime missing")
                .with_ref_tag(tags::ORIG_SENDING_TIME),
        );
    }
    if let Some(reason) = msg.rejection.clone() {
        cx.env.ledger.accept_inbound(seq);
        reject_message(msg, &message, cx, reason).await;
        return Ok(Flow::Stop);
    }

    if *msg_type == MsgType::SequenceReset {
        return on_gap_fill(msg, &message, cx).await;
    }
    cx.env.ledger.accept_inbound(seq);
    dispatch(seq, &message, cx).await;
    Ok(Flow::Continue)
}

/// Answers a structurally bad message with a session Reject.
async fn reject_message(
    msg: &Inbound,
    message: &OwnedMessage,
    cx: &mut Exchange<'_>,
    reason: RejectReason,
) {
    cx.report(Diagnostic::new(
        ErrorClass::Structural,
        reason.text.clone(),
        Some(msg.seq),
        msg.frame().clone(),
    ));
    cx.reject(msg.seq, message.msg_type(), &reason).await;
}

async fn on_gap_fill(
    msg: &mut Inbound,
    message: &OwnedMessage,
    cx: &mut Exchange<'_>,
) -> Result<Flow, SessionError> {
    let seq = msg.seq;
    match message.get_field_u64(tags::NEW_SEQ_NO) {
        Some(new_seq) if new_seq > seq => {
            cx.env.ledger.advance_inbound_to(new_seq);
            debug!(session = %cx.session_id(), seq, new_seq, "gap filled");
            Ok(Flow::Continue)
        }
        Some(new_seq) => {
            cx.env.ledger.accept_inbound(seq);
            let error = SessionError::SequenceResetBackwards {
                expected: seq + 1,
                new_seq,
            };
            let reason = RejectReason::new(reject_reason::VALUE_INCORRECT, error.to_string())
                .with_ref_tag(tags::NEW_SEQ_NO);
            reject_message(msg, message, cx, reason).await;
            Ok(Flow::Stop)
        }
        None => {
            cx.env.ledger.accept_inbound(seq);
            let reason = RejectReason::new(reject_reason::REQUIRED_TAG_MISSING, "NewSeqNo missing")
                .with_ref_tag(tags::NEW_SEQ_NO);
            reject_message(msg, message, cx, reason).await;
            Ok(Flow::Stop)
        }
    }
}

/// Session message handling for an in-order message.
async fn dispatch(seq: u64, message: &OwnedMessage, cx: &mut Exchange<'_>) {
    match message.msg_type() {
        MsgType::Heartbeat => {
            if let Some(id) = message.get_field_str(tags::TEST_REQ_ID) {
                debug!(session = %cx.session_id(), test_req_id = id, "test request answered");
            }
        }
        MsgType::TestRequest => match message.get_field_str(tags::TEST_REQ_ID) {
            Some(id) => {
                let reply = AdminMessage::Heartbeat {
                    test_req_id: Some(id.to_string()),
                };
                cx.send_admin(&reply).await;
            }
            None => {
                let reason = RejectReason::new(reject_reason::REQUIRED_TAG_MISSING, "TestReqID missing")
                    .with_ref_tag(tags::TEST_REQ_ID);
                cx.reject(seq, message.msg_type(), &reason).await;
            }
        },
        MsgType::ResendRequest => schedule_resend(seq, message, cx).await,
        MsgType::Reject => {
            warn!(
                session = %cx.session_id(),
                ref_seq_num = ?message.get_field_u64(tags::REF_SEQ_NUM),
                text = message.get_field_str(tags::TEXT).unwrap_or_default(),
                "counterparty rejected a message"
            );
        }
        MsgType::Logout => on_logout(message, cx).await,
        _ => {}
    }
}

/// Received below the expected number.
async fn too_low(
    msg: &mut Inbound,
    message: &OwnedMessage,
    cx: &mut Exchange<'_>,
    expected: u64,
    received: u64,
) -> Result<Flow, SessionError> {
    if message.poss_dup() {
        cx.env.stats.record_duplicate();
        debug!(session = %cx.session_id(), expected, received, "duplicate received");
        if cx.config().duplicate_policy == DuplicatePolicy::Redeliver && message.msg_type().is_app() {
            msg.skip_store = true;
            return Ok(Flow::Continue);
        }
        return Ok(Flow::Stop);
    }

    let error = SessionError::SequenceTooLow { expected, received };
    error!(session = %cx.session_id(), expected, received, "sequence regression");
    cx.report(Diagnostic::new(
        ErrorClass::Sequencing,
        error.to_string(),
        Some(received),
        msg.frame().clone(),
    ));
    match cx.config().regression_policy {
        RegressionPolicy::Disconnect => cx.abort(&error.to_string()).await,
        RegressionPolicy::Reject => {
            let reason = RejectReason::new(reject_reason::VALUE_INCORRECT, error.to_string())
                .with_ref_tag(tags::MSG_SEQ_NUM);
            cx.reject(received, message.msg_type(), &reason).await;
        }
    }
    Ok(Flow::Stop)
}

/// Received above the expected number.
async fn gap(
    msg: &mut Inbound,
    message: OwnedMessage,
    cx: &mut Exchange<'_>,
    expected: u64,
    received: u64,
) -> Result<Flow, SessionError> {
    warn!(session = %cx.session_id(), expected, received, "sequence gap detected");
    request_resend(cx, expected, received).await;

    if cx.inner.gaps.holds(received) {
        return Ok(Flow::Stop);
    }
    let msg_type = message.msg_type().clone();
    let deliver_now = msg.rejection.is_none()
        && match &msg_type {
            // Served at once so two recovering peers cannot wait on each other.
            MsgType::ResendRequest | MsgType::Logout => true,
            t if t.is_app() => cx.config().gap_policy == GapPolicy::DeliverImmediately,
            _ => false,
        };

    if deliver_now {
        cx.inner.gaps.mark_delivered_ahead(received);
        dispatch(received, &message, cx).await;
        Ok(Flow::Continue)
    } else {
        debug!(session = %cx.session_id(), seq = received, "held until the gap closes");
        cx.inner.gaps.buffer(received, message);
        Ok(Flow::Stop)
    }
}

/// Requests the part of `[expected, received - 1]` not yet requested.
async fn request_resend(cx: &mut Exchange<'_>, expected: u64, received: u64) {
    let now = cx.now();
    if let Some(range) = cx.inner.gaps.on_gap(expected, received, now) {
        info!(session = %cx.session_id(), %range, "requesting resend");
        cx.send_admin(&AdminMessage::ResendRequest {
            begin: range.begin,
            end: range.end,
        })
        .await;
        cx.env.stats.record_resend_request();
    }
}

/// Queues a replay for a ResendRequest; the session drives it in batches.
async fn schedule_resend(seq: u64, message: &OwnedMessage, cx: &mut Exchange<'_>) {
    let (Some(begin), Some(end)) = (
        message.get_field_u64(tags::BEGIN_SEQ_NO),
        message.get_field_u64(tags::END_SEQ_NO),
    ) else {
        let reason = RejectReason::new(
            reject_reason::REQUIRED_TAG_MISSING,
            "BeginSeqNo and EndSeqNo required",
        );
        cx.reject(seq, message.msg_type(), &reason).await;
        return;
    };
    let range = ResendRange::from_request(begin, end, &cx.config().begin_string);
    let last_sent = cx.env.ledger.next_outbound().value().saturating_sub(1);
    if begin == 0 || begin > last_sent || (!range.is_open_ended() && range.end < begin) {
        debug!(session = %cx.session_id(), %range, last_sent, "nothing to resend");
        return;
    }
    let range = range.resolve(last_sent);
    info!(session = %cx.session_id(), %range, "resend requested by counterparty");
    let cursor = ReplayCursor::new(cx.env.id.clone(), Direction::Outbound, range.begin, range.end);
    cx.inner.replays.push_back(ReplayPlanner::new(cursor, seq));
}

async fn on_logout(message: &OwnedMessage, cx: &mut Exchange<'_>) {
    cx.env.stats.record_logout();
    let text = message.get_field_str(tags::TEXT).unwrap_or_default();
    match cx.state() {
        SessionState::LogoutSent => {
            info!(session = %cx.session_id(), "logout confirmed");
        }
        SessionState::Active => {
            info!(session = %cx.session_id(), text, "logout requested by counterparty");
            cx.send_admin(&AdminMessage::Logout { text: None }).await;
            cx.move_to(SessionState::LogoutSent);
        }
        state => {
            warn!(session = %cx.session_id(), %state, text, "logout before logon completed");
        }
    }
    cx.inner.logged_out = true;
    cx.move_to(SessionState::Disconnecting);
    cx.inner.close_requested = true;
}
