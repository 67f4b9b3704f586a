/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The FIX session.
//!
//! A [`Session`] owns one counterparty relationship across connections. All
//! mutation happens under a single `tokio::sync::Mutex`; the read loop, the
//! timer task and application sends each take it for one step. Application
//! callbacks run after the lock is released.

use crate::admin::AdminMessage;
use crate::application::{Application, Diagnostic, RejectReason};
use crate::config::{ResendFailurePolicy, Role, SessionConfig};
use crate::exchange::{AppEvent, Exchange, SessionEnv, SessionInner};
use crate::heartbeat::{HeartbeatAction, HeartbeatMonitor};
use crate::outbound::{OutboundMessage, Stamp};
use crate::pipeline::{Inbound, Pipeline};
use crate::pool::BufferPool;
use crate::replay::{ReplayItem, ReplayPlanner};
use crate::resend::GapTracker;
use crate::sequence::SequenceLedger;
use crate::state::SessionState;
use crate::stats::EngineStats;
use bytes::Bytes;
use fixline_core::error::{ErrorClass, FixError, SessionError, StoreError};
use fixline_core::message::MsgType;
use fixline_core::tags::reject_reason;
use fixline_core::types::{SessionId, Timestamp};
use fixline_store::MessageStore;
use fixline_tagvalue::peek_msg_type;
use fixline_transport::Transport;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// One FIX session.
pub struct Session {
    env: SessionEnv,
    app: Arc<dyn Application>,
    pipeline: Pipeline,
    inner: Mutex<SessionInner>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.env.id)
            .field("next_outbound", &self.next_outbound())
            .field("next_inbound", &self.next_inbound())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a disconnected session with the standard pipeline.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if `config` is invalid.
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn MessageStore>,
        app: Arc<dyn Application>,
        stats: Arc<EngineStats>,
        pool: Arc<BufferPool>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let inner = SessionInner::new(&config, Instant::now());
        Ok(Self {
            env: SessionEnv {
                id: config.session_id(),
                config,
                store,
                stats,
                pool,
                ledger: SequenceLedger::new(),
            },
            app,
            pipeline: Pipeline::standard(),
            inner: Mutex::new(inner),
        })
    }

    /// Replaces the inbound pipeline.
    #[must_use]
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Loads the persisted sequence numbers and notifies the application.
    ///
    /// # Errors
    /// Returns `StoreError` if the store cannot be read.
    pub async fn restore(&self) -> Result<(), StoreError> {
        let state = self.env.store.sequences(&self.env.id).await?;
        self.env.ledger.set_next_outbound(state.next_outbound);
        self.env.ledger.set_next_inbound(state.next_inbound);
        info!(
            session = %self.env.id,
            next_outbound = state.next_outbound,
            next_inbound = state.next_inbound,
            "session restored"
        );
        self.app.on_create(&self.env.id).await;
        Ok(())
    }

    /// Returns the session identity.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.env.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.env.config
    }

    /// Returns the next outbound sequence number.
    #[must_use]
    pub fn next_outbound(&self) -> u64 {
        self.env.ledger.next_outbound().value()
    }

    /// Returns the next expected inbound sequence number.
    #[must_use]
    pub fn next_inbound(&self) -> u64 {
        self.env.ledger.next_inbound().value()
    }

    /// Returns the shared statistics.
    #[must_use]
    pub fn stats(&self) -> &Arc<EngineStats> {
        &self.env.stats
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.machine.state()
    }

    /// Binds a new connection: `Disconnected -> Connecting`.
    ///
    /// An initiator sends its Logon and moves on to `LogonSent`.
    ///
    /// # Errors
    /// Returns `SessionError::DuplicateSession` if a connection is already bound.
    pub async fn start(&self, transport: Arc<dyn Transport>, now: Instant) -> Result<(), SessionError> {
        let mut events = Vec::new();
        {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if inner.machine.state() != SessionState::Disconnected {
                return Err(SessionError::DuplicateSession(self.env.id.to_string()));
            }
            inner.machine.transition(SessionState::Connecting, now)?;
            info!(
                session = %self.env.id,
                remote = ?transport.remote_endpoint(),
                role = ?self.env.config.role,
                "connection bound"
            );
            let config = &self.env.config;
            inner.transport = Some(transport);
            inner.gaps = GapTracker::new();
            inner.close_requested = false;
            inner.heartbeat = HeartbeatMonitor::new(
                config.heartbeat_interval,
                config.heartbeat_tolerance,
                config.test_request_grace,
                now,
            );

            let mut cx = Exchange::new(&self.env, inner, &mut events, now);
            if config.role == Role::Initiator {
                if config.reset_on_logon {
                    self.env.ledger.reset();
                    if let Err(error) = self.env.store.reset(&self.env.id).await {
                        error!(session = %self.env.id, %error, "failed to reset store");
                    }
                    cx.inner.reset_requested = true;
                }
                let logon = AdminMessage::Logon {
                    heart_bt_int: config.heartbeat_interval_secs(),
                    reset_seq_num: config.reset_on_logon,
                };
                cx.send_admin(&logon).await;
                cx.move_to(SessionState::LogonSent);
            }
            Self::finish_step(&mut cx).await;
        }
        self.dispatch(events).await;
        Ok(())
    }

    /// Processes one inbound frame.
    ///
    /// # Errors
    /// Returns `SessionError::Closed` once the session no longer reads from
    /// this connection; the caller should stop its read loop.
    pub async fn on_frame(&self, frame: Bytes, now: Instant) -> Result<(), SessionError> {
        let mut events = Vec::new();
        let open = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            if !Self::is_reading(inner.machine.state()) {
                return Err(SessionError::Closed);
            }
            self.env.stats.record_received();
            inner.heartbeat.on_message_received(now);

            let mut cx = Exchange::new(&self.env, inner, &mut events, now);
            self.admit(frame, &mut cx).await;
            self.release_held(&mut cx).await;
            Self::finish_step(&mut cx).await
        };
        self.dispatch(events).await;
        if open {
            self.drive_replays(now).await;
            Ok(())
        } else {
            Err(SessionError::Closed)
        }
    }

    /// Runs due timers: logon and logout timeouts, heartbeats, TestRequest
    /// escalation and resend timeouts.
    ///
    /// # Errors
    /// Returns `SessionError::Closed` once the session is disconnected.
    pub async fn on_timer(&self, now: Instant) -> Result<(), SessionError> {
        let mut events = Vec::new();
        let open = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let state = inner.machine.state();
            if state == SessionState::Disconnected {
                return Err(SessionError::Closed);
            }
            let elapsed = now.saturating_duration_since(inner.machine.entered_at());
            let config = &self.env.config;
            let mut cx = Exchange::new(&self.env, inner, &mut events, now);
            match state {
                SessionState::Connecting
                | SessionState::LogonSent
                | SessionState::LogonReceived
                | SessionState::LogonPending
                    if elapsed >= config.logon_timeout =>
                {
                    cx.abort("logon timeout").await;
                }
                SessionState::LogoutSent if elapsed >= config.logout_timeout => {
                    warn!(session = %self.env.id, "logout not confirmed in time");
                    cx.move_to(SessionState::Disconnecting);
                    cx.inner.close_requested = true;
                }
                SessionState::Disconnecting => cx.finish_disconnect().await,
                SessionState::Active => Self::active_timers(&mut cx).await,
                _ => {}
            }
            Self::finish_step(&mut cx).await
        };
        self.dispatch(events).await;
        if open { Ok(()) } else { Err(SessionError::Closed) }
    }

    async fn active_timers(cx: &mut Exchange<'_>) {
        let now = cx.now();
        if let Some(range) = cx.inner.gaps.expired(now, cx.config().resend_timeout) {
            let error = SessionError::ResendTimeout {
                begin: range.begin,
                end: range.end,
            };
            error!(session = %cx.session_id(), %range, "resend request not satisfied");
            cx.env.stats.record_error(ErrorClass::Sequencing);
            cx.logout(&error.to_string()).await;
            return;
        }
        match cx.inner.heartbeat.poll(now) {
            HeartbeatAction::None => {}
            HeartbeatAction::SendHeartbeat => {
                cx.send_admin(&AdminMessage::Heartbeat { test_req_id: None })
                    .await;
            }
            HeartbeatAction::SendTestRequest(test_req_id) => {
                info!(session = %cx.session_id(), %test_req_id, "counterparty silent, sending test request");
                cx.send_admin(&AdminMessage::TestRequest { test_req_id }).await;
            }
            HeartbeatAction::Timeout { silence } => {
                let error = SessionError::HeartbeatTimeout {
                    elapsed_ms: u64::try_from(silence.as_millis()).unwrap_or(u64::MAX),
                };
                error!(session = %cx.session_id(), %error, "test request unanswered");
                cx.logout(&error.to_string()).await;
            }
        }
    }

    /// Sends an application message.
    ///
    /// The message is assigned the next outbound sequence number and logged
    /// before it is written. Outside `Active` it is only logged, to be
    /// delivered when the counterparty asks for a resend.
    ///
    /// # Errors
    /// Returns `EncodeError` if the message sets a session-managed tag, or
    /// `StoreError` if it cannot be logged. A message that was not logged is
    /// not sent and its sequence number is reused.
    pub async fn send(&self, message: OutboundMessage) -> Result<u64, FixError> {
        let mut message = message;
        self.app.to_app(&mut message, &self.env.id).await;
        message.validate()?;

        let mut events = Vec::new();
        let result = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let state = inner.machine.state();
            let mut cx = Exchange::new(&self.env, inner, &mut events, Instant::now());

            let seq = self.env.ledger.allocate_outbound().value();
            let stamp = Stamp {
                seq,
                sending_time: Timestamp::now(),
                poss_dup: false,
            };
            let frame = self
                .env
                .encode(message.msg_type(), stamp, |enc| message.write_body(enc));
            let persisted = cx.persist_outbound(seq, frame.clone()).await;
            if persisted.is_ok() {
                if state.can_send_app() {
                    cx.transmit(frame).await;
                } else {
                    debug!(session = %self.env.id, seq, %state, "not active, message stored for resend");
                }
            }
            Self::finish_step(&mut cx).await;
            persisted.map(|()| seq)
        };
        self.dispatch(events).await;
        Ok(result?)
    }

    /// Starts an orderly logout. Before logon completes the connection is
    /// dropped instead.
    pub async fn request_logout(&self, text: &str, now: Instant) {
        let mut events = Vec::new();
        {
            let mut guard = self.inner.lock().await;
            let mut cx = Exchange::new(&self.env, &mut guard, &mut events, now);
            info!(session = %self.env.id, text, "logout requested");
            cx.logout(text).await;
            Self::finish_step(&mut cx).await;
        }
        self.dispatch(events).await;
    }

    /// Reports that the connection's read side ended.
    ///
    /// The session becomes `Disconnected` with its sequence numbers intact
    /// unless a reset is configured.
    pub async fn on_transport_closed(&self, now: Instant) {
        let mut events = Vec::new();
        {
            let mut guard = self.inner.lock().await;
            let mut cx = Exchange::new(&self.env, &mut guard, &mut events, now);
            if cx.state() != SessionState::Disconnected {
                info!(session = %self.env.id, state = %cx.state(), "connection ended");
                cx.finish_disconnect().await;
            }
        }
        self.dispatch(events).await;
    }

    const fn is_reading(state: SessionState) -> bool {
        !matches!(state, SessionState::Disconnected | SessionState::Disconnecting)
    }

    /// Applies the state gate, then the pipeline.
    async fn admit(&self, frame: Bytes, cx: &mut Exchange<'_>) {
        if let Some(msg_type) = peek_msg_type(&frame)
            && let Err(error) = cx.inner.machine.gate(&msg_type)
        {
            cx.report(Diagnostic::new(
                ErrorClass::SessionProtocol,
                error.to_string(),
                None,
                frame,
            ));
            if matches!(cx.state(), SessionState::Connecting | SessionState::LogonSent) {
                cx.abort("first message must be Logon").await;
            }
            return;
        }
        let mut msg = Inbound::new(frame);
        self.run_pipeline(&mut msg, cx).await;
    }

    async fn run_pipeline(&self, msg: &mut Inbound, cx: &mut Exchange<'_>) {
        if let Err(error) = self.pipeline.run(msg, cx).await {
            cx.report(Diagnostic::new(
                error.class(),
                error.to_string(),
                msg.seq(),
                msg.frame().clone(),
            ));
            cx.abort(&error.to_string()).await;
        }
    }

    /// Releases messages held behind a gap that has now closed.
    async fn release_held(&self, cx: &mut Exchange<'_>) {
        let start = cx.next_inbound();
        while !cx.inner.close_requested {
            let next = cx.next_inbound();
            if cx.inner.gaps.take_delivered_ahead(next) {
                cx.env.ledger.accept_inbound(next);
                continue;
            }
            let Some(message) = cx.inner.gaps.take_buffered(next) else {
                break;
            };
            debug!(session = %cx.session_id(), seq = next, "releasing held message");
            let mut msg = Inbound::parsed(message, next);
            self.run_pipeline(&mut msg, cx).await;
            if cx.next_inbound() == next {
                break;
            }
        }
        let next = cx.next_inbound();
        cx.inner.gaps.on_advance(next);
        if next != start {
            cx.env.persist_sequences().await;
        }
    }

    /// Closes the transport if a step asked for it. Returns true while the
    /// connection is still being read.
    async fn finish_step(cx: &mut Exchange<'_>) -> bool {
        if cx.inner.close_requested {
            cx.close_transport().await;
        }
        Self::is_reading(cx.state())
    }

    /// Serves queued ResendRequests one batch per lock acquisition.
    async fn drive_replays(&self, now: Instant) {
        let batch_size = self.env.config.resend_batch_size;
        loop {
            let mut events = Vec::new();
            {
                let mut guard = self.inner.lock().await;
                let inner = &mut *guard;
                if inner.transport.is_none() || !inner.machine.state().is_logged_on() {
                    inner.replays.clear();
                    return;
                }
                let Some(planner) = inner.replays.front_mut() else {
                    return;
                };
                let batch = planner
                    .next_batch(
                        self.env.store.as_ref(),
                        batch_size,
                        &self.env.pool,
                        Timestamp::now(),
                    )
                    .await;

                let mut cx = Exchange::new(&self.env, inner, &mut events, now);
                match batch {
                    Ok(Some(items)) => {
                        for item in items {
                            match item {
                                ReplayItem::Resend { seq, frame } => cx.resend(seq, frame).await,
                                ReplayItem::GapFill { begin, new_seq } => {
                                    cx.send_gap_fill(begin, new_seq).await;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        cx.inner.replays.pop_front();
                        debug!(session = %self.env.id, "resend request served");
                    }
                    Err(error) => {
                        if let Some(planner) = cx.inner.replays.pop_front() {
                            Self::resend_failed(&mut cx, &planner, &error).await;
                        }
                    }
                }
                Self::finish_step(&mut cx).await;
            }
            self.dispatch(events).await;
            tokio::task::yield_now().await;
        }
    }

    async fn resend_failed(cx: &mut Exchange<'_>, planner: &ReplayPlanner, cause: &StoreError) {
        let (begin, end) = planner.remaining();
        let error = SessionError::ResendUnavailable { begin, end };
        error!(session = %cx.session_id(), %cause, %error, "cannot serve resend request");
        cx.env.stats.record_error(ErrorClass::Store);
        match cx.config().resend_failure_policy {
            ResendFailurePolicy::Disconnect => cx.logout(&error.to_string()).await,
            ResendFailurePolicy::Reject => {
                let reason = RejectReason::new(reject_reason::OTHER, error.to_string());
                cx.reject(planner.request_seq(), &MsgType::ResendRequest, &reason)
                    .await;
            }
        }
    }

    /// Runs application callbacks in order, outside the session lock.
    async fn dispatch(&self, events: Vec<AppEvent>) {
        let mut queue = VecDeque::from(events);
        while let Some(event) = queue.pop_front() {
            let id = &self.env.id;
            match event {
                AppEvent::Logon => self.app.on_logon(id).await,
                AppEvent::Logout => self.app.on_logout(id).await,
                AppEvent::Admin(message) => self.app.from_admin(&message, id).await,
                AppEvent::Reject(diagnostic) => self.app.on_reject(&diagnostic, id).await,
                AppEvent::App { seq, message } => {
                    let Err(reason) = self.app.from_app(&message, id).await else {
                        continue;
                    };
                    warn!(session = %id, seq, text = %reason.text, "application rejected message");
                    let mut events = Vec::new();
                    {
                        let mut guard = self.inner.lock().await;
                        let mut cx = Exchange::new(&self.env, &mut guard, &mut events, Instant::now());
                        if cx.state().is_logged_on() {
                            cx.reject(seq, message.msg_type(), &reason).await;
                        }
                        Self::finish_step(&mut cx).await;
                    }
                    queue.extend(events);
                }
            }
        }
    }
}
