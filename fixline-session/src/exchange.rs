/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Per-session state and the view pipeline stages get of it.
//!
//! [`SessionEnv`] holds what never changes after creation plus the atomic
//! ledger; [`SessionInner`] is everything guarded by the session mutex. An
//! [`Exchange`] borrows both for the processing of one inbound message or
//! timer tick and carries the outbound helpers every stage shares.

use crate::admin::AdminMessage;
use crate::application::{Diagnostic, RejectReason};
use crate::config::SessionConfig;
use crate::heartbeat::HeartbeatMonitor;
use crate::outbound::{Header, Stamp, encode_frame};
use crate::pool::BufferPool;
use crate::replay::ReplayPlanner;
use crate::resend::GapTracker;
use crate::sequence::SequenceLedger;
use crate::state::{SessionState, StateMachine};
use crate::stats::EngineStats;
use bytes::Bytes;
use fixline_core::error::{ErrorClass, StoreError};
use fixline_core::message::{MsgType, OwnedMessage};
use fixline_core::types::{SessionId, Timestamp};
use fixline_store::{Direction, MessageStore};
use fixline_tagvalue::Encoder;
use fixline_transport::Transport;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Immutable collaborators of a session, plus its ledger.
pub struct SessionEnv {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) stats: Arc<EngineStats>,
    pub(crate) pool: Arc<BufferPool>,
    pub(crate) ledger: SequenceLedger,
}

impl SessionEnv {
    pub(crate) fn header(&self) -> Header<'_> {
        Header {
            begin_string: &self.config.begin_string,
            sender: self.config.sender_comp_id.as_str(),
            target: self.config.target_comp_id.as_str(),
            sender_sub_id: self.config.sender_sub_id.as_deref(),
            target_sub_id: self.config.target_sub_id.as_deref(),
        }
    }

    /// Encodes a frame using a pooled scratch buffer.
    pub(crate) fn encode(
        &self,
        msg_type: &str,
        stamp: Stamp,
        body: impl FnOnce(&mut Encoder<'_>),
    ) -> Bytes {
        let (frame, scratch) =
            encode_frame(&self.header(), msg_type, stamp, self.pool.acquire(), body);
        self.pool.release(scratch);
        frame.freeze()
    }

    pub(crate) async fn persist_sequences(&self) {
        if let Err(error) = self
            .store
            .save_sequences(&self.id, self.ledger.snapshot())
            .await
        {
            error!(session = %self.id, %error, "failed to persist sequence numbers");
        }
    }
}

/// Callback the session owes the application once its lock is released.
#[derive(Debug)]
pub(crate) enum AppEvent {
    Logon,
    Logout,
    Admin(OwnedMessage),
    App { seq: u64, message: OwnedMessage },
    Reject(Diagnostic),
}

/// Mutable session state, guarded by the session mutex.
pub(crate) struct SessionInner {
    pub(crate) machine: StateMachine,
    pub(crate) heartbeat: HeartbeatMonitor,
    pub(crate) gaps: GapTracker,
    pub(crate) transport: Option<Arc<dyn Transport>>,
    pub(crate) replays: VecDeque<ReplayPlanner>,
    /// We sent a Logon carrying ResetSeqNumFlag.
    pub(crate) reset_requested: bool,
    /// Logon completed on the current connection.
    pub(crate) logged_on: bool,
    /// A Logout was exchanged on the current connection.
    pub(crate) logged_out: bool,
    /// Tear the connection down once the current step completes.
    pub(crate) close_requested: bool,
}

impl SessionInner {
    pub(crate) fn new(config: &SessionConfig, now: Instant) -> Self {
        Self {
            machine: StateMachine::new(now),
            heartbeat: HeartbeatMonitor::new(
                config.heartbeat_interval,
                config.heartbeat_tolerance,
                config.test_request_grace,
                now,
            ),
            gaps: GapTracker::new(),
            transport: None,
            replays: VecDeque::new(),
            reset_requested: false,
            logged_on: false,
            logged_out: false,
            close_requested: false,
        }
    }
}

/// Session access granted to pipeline stages for one step.
pub struct Exchange<'a> {
    pub(crate) env: &'a SessionEnv,
    pub(crate) inner: &'a mut SessionInner,
    pub(crate) events: &'a mut Vec<AppEvent>,
    pub(crate) now: Instant,
}

impl<'a> Exchange<'a> {
    pub(crate) fn new(
        env: &'a SessionEnv,
        inner: &'a mut SessionInner,
        events: &'a mut Vec<AppEvent>,
        now: Instant,
    ) -> Self {
        Self {
            env,
            inner,
            events,
            now,
        }
    }

    /// Returns the session identity.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.env.id
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.env.config
    }

    /// Returns the current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.machine.state()
    }

    /// Returns the next expected inbound sequence number.
    #[must_use]
    pub fn next_inbound(&self) -> u64 {
        self.env.ledger.next_inbound().value()
    }

    /// Returns the time this step is processed at.
    #[must_use]
    pub const fn now(&self) -> Instant {
        self.now
    }

    /// Moves to `next`, logging rather than failing on an illegal move.
    pub(crate) fn move_to(&mut self, next: SessionState) {
        if let Err(error) = self.inner.machine.transition(next, self.now) {
            debug!(session = %self.env.id, %error, "state change skipped");
        }
    }

    /// Reports a discarded or rejected inbound message.
    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.env.stats.record_error(diagnostic.class);
        warn!(
            session = %self.env.id,
            class = %diagnostic.class,
            seq = ?diagnostic.seq,
            reason = %diagnostic.reason,
            "inbound message not accepted"
        );
        self.events.push(AppEvent::Reject(diagnostic));
    }

    /// Sends a session message under the next outbound sequence number.
    pub(crate) async fn send_admin(&mut self, message: &AdminMessage) -> u64 {
        let seq = self.env.ledger.allocate_outbound().value();
        let msg_type = message.msg_type();
        let stamp = Stamp {
            seq,
            sending_time: Timestamp::now(),
            poss_dup: false,
        };
        let frame = self
            .env
            .encode(msg_type.as_str(), stamp, |enc| message.write_body(enc));
        debug!(session = %self.env.id, seq, msg_type = %msg_type, "sending session message");
        if self.persist_outbound(seq, frame.clone()).await.is_err() {
            // Nothing unlogged may reach the wire.
            self.move_to(SessionState::Disconnecting);
            self.inner.close_requested = true;
            return seq;
        }
        self.transmit(frame).await;
        seq
    }

    /// Logs an outbound frame and the ledger.
    ///
    /// On failure `seq` is handed back to the ledger and the frame must not
    /// be sent. Allocation only happens under the session lock, so no later
    /// number can have been taken in between.
    pub(crate) async fn persist_outbound(&self, seq: u64, frame: Bytes) -> Result<(), StoreError> {
        if let Err(error) = self
            .env
            .store
            .append(&self.env.id, Direction::Outbound, seq, frame)
            .await
        {
            error!(session = %self.env.id, seq, %error, "failed to log outbound message");
            self.env.stats.record_error(ErrorClass::Store);
            self.env.ledger.set_next_outbound(seq);
            return Err(error);
        }
        self.env.persist_sequences().await;
        Ok(())
    }

    /// Writes a frame to the transport, if connected.
    ///
    /// A failed write schedules the connection for teardown.
    pub(crate) async fn transmit(&mut self, frame: Bytes) -> bool {
        let Some(transport) = self.inner.transport.clone() else {
            return false;
        };
        match transport.send(frame).await {
            Ok(()) => {
                self.env.stats.record_sent();
                self.inner.heartbeat.on_message_sent(self.now);
                true
            }
            Err(error) => {
                warn!(session = %self.env.id, %error, "transport write failed");
                self.inner.close_requested = true;
                false
            }
        }
    }

    /// Sends a SequenceReset-GapFill under `begin` during a replay.
    pub(crate) async fn send_gap_fill(&mut self, begin: u64, new_seq: u64) {
        let stamp = Stamp {
            seq: begin,
            sending_time: Timestamp::now(),
            poss_dup: true,
        };
        let fill = AdminMessage::SequenceReset {
            new_seq,
            gap_fill: true,
        };
        let frame = self
            .env
            .encode(MsgType::SequenceReset.as_str(), stamp, |enc| fill.write_body(enc));
        debug!(session = %self.env.id, begin, new_seq, "sending gap fill");
        if self.transmit(frame).await {
            self.env.stats.record_gap_fill();
        }
    }

    /// Retransmits a rewritten stored frame.
    pub(crate) async fn resend(&mut self, seq: u64, frame: Bytes) {
        debug!(session = %self.env.id, seq, "resending");
        if self.transmit(frame).await {
            self.env.stats.record_resent();
        }
    }

    /// Sends a session-level Reject referencing `ref_seq_num`.
    pub(crate) async fn reject(&mut self, ref_seq_num: u64, ref_msg_type: &MsgType, reason: &RejectReason) {
        let reject = AdminMessage::Reject {
            ref_seq_num,
            ref_tag: reason.ref_tag,
            ref_msg_type: Some(ref_msg_type.to_string()),
            reason: Some(reason.code),
            text: reason.text.clone(),
        };
        self.send_admin(&reject).await;
    }

    /// Starts an orderly logout from `Active`; anything earlier is aborted.
    pub(crate) async fn logout(&mut self, text: &str) {
        match self.state() {
            SessionState::Active => {
                self.send_admin(&AdminMessage::Logout {
                    text: Some(text.to_string()),
                })
                .await;
                if self.inner.close_requested {
                    return;
                }
                self.inner.logged_out = true;
                self.move_to(SessionState::LogoutSent);
            }
            SessionState::LogoutSent | SessionState::Disconnected => {}
            _ => self.abort(text).await,
        }
    }

    /// Sends Logout and tears the connection down without waiting for an echo.
    pub(crate) async fn abort(&mut self, text: &str) {
        if self.state() == SessionState::Disconnected {
            return;
        }
        error!(session = %self.env.id, reason = text, "terminating session");
        if self.inner.transport.is_some() {
            self.send_admin(&AdminMessage::Logout {
                text: Some(text.to_string()),
            })
            .await;
        }
        self.move_to(SessionState::Disconnecting);
        self.inner.close_requested = true;
    }

    /// Closes the transport after everything queued has been written.
    ///
    /// The session stays in `Disconnecting` until the connection's read
    /// side reports the close.
    pub(crate) async fn close_transport(&mut self) {
        self.inner.close_requested = false;
        self.move_to(SessionState::Disconnecting);
        if let Some(transport) = self.inner.transport.take() {
            transport.close().await;
            info!(session = %self.env.id, "transport closed");
        }
        for range in self.inner.gaps.abandon() {
            debug!(session = %self.env.id, %range, "resend range abandoned");
        }
        self.inner.replays.clear();
    }

    /// Completes a disconnect, keeping sequence numbers unless a reset is
    /// configured.
    pub(crate) async fn finish_disconnect(&mut self) {
        if self.state() == SessionState::Disconnected {
            return;
        }
        self.close_transport().await;
        self.move_to(SessionState::Disconnected);

        let config = &self.env.config;
        if (config.reset_on_logout && self.inner.logged_out) || config.reset_on_disconnect {
            info!(session = %self.env.id, "resetting sequence numbers on disconnect");
            self.env.ledger.reset();
            if let Err(error) = self.env.store.reset(&self.env.id).await {
                error!(session = %self.env.id, %error, "failed to reset store");
            }
        }
        self.env.persist_sequences().await;

        if self.inner.logged_on {
            self.events.push(AppEvent::Logout);
        }
        self.inner.logged_on = false;
        self.inner.logged_out = false;
        self.inner.reset_requested = false;
        info!(
            session = %self.env.id,
            next_outbound = self.env.ledger.next_outbound().value(),
            next_inbound = self.env.ledger.next_inbound().value(),
            "session disconnected"
        );
    }
}
