/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Application callback interface.
//!
//! Callbacks run after the session lock is released, in the order the
//! messages were processed, so an implementation may call back into the
//! session (for example to send a reply).

use crate::outbound::OutboundMessage;
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::ErrorClass;
use fixline_core::message::OwnedMessage;
use fixline_core::types::SessionId;

/// Content of a session-level Reject (35=3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectReason {
    /// SessionRejectReason (373).
    pub code: u32,
    /// Text (58).
    pub text: String,
    /// RefTagID (371).
    pub ref_tag: Option<u32>,
}

impl RejectReason {
    #[must_use]
    pub fn new(code: u32, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            ref_tag: None,
        }
    }

    #[must_use]
    pub const fn with_ref_tag(mut self, tag: u32) -> Self {
        self.ref_tag = Some(tag);
        self
    }
}

/// A message the session discarded or rejected, with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Error classification.
    pub class: ErrorClass,
    /// What went wrong.
    pub reason: String,
    /// MsgSeqNum, when it could be read.
    pub seq: Option<u64>,
    /// The original frame.
    pub raw: Bytes,
}

impl Diagnostic {
    /// Creates a diagnostic for `raw`.
    #[must_use]
    pub fn new(class: ErrorClass, reason: impl Into<String>, seq: Option<u64>, raw: Bytes) -> Self {
        Self {
            class,
            reason: reason.into(),
            seq,
            raw,
        }
    }
}

/// Hooks through which the session hands events to the host program.
#[async_trait]
pub trait Application: Send + Sync {
    /// Once per session, after its sequence numbers are restored.
    async fn on_create(&self, _session_id: &SessionId) {}

    async fn on_logon(&self, session_id: &SessionId);

    /// A logged-on session ended, by Logout or disconnect.
    async fn on_logout(&self, session_id: &SessionId);

    /// Last chance to edit an outbound application message before it is
    /// sequenced.
    async fn to_app(&self, _message: &mut OutboundMessage, _session_id: &SessionId) {}

    /// A session-level message passed the pipeline.
    #[allow(clippy::wrong_self_convention)]
    async fn from_admin(&self, _message: &OwnedMessage, _session_id: &SessionId) {}

    /// An application message was accepted, in sequence order. Returning
    /// `Err` answers the peer with a session Reject; the sequence number
    /// stays consumed.
    #[allow(clippy::wrong_self_convention)]
    async fn from_app(
        &self,
        message: &OwnedMessage,
        session_id: &SessionId,
    ) -> Result<(), RejectReason>;

    /// An inbound message was discarded or rejected.
    async fn on_reject(&self, _diagnostic: &Diagnostic, _session_id: &SessionId) {}
}

/// Accepts everything and ignores every event.
#[derive(Debug, Default)]
pub struct NoOpApplication;

#[async_trait]
impl Application for NoOpApplication {
    async fn on_logon(&self, _session_id: &SessionId) {}

    async fn on_logout(&self, _session_id: &SessionId) {}

    async fn from_app(
        &self,
        _message: &OwnedMessage,
        _session_id: &SessionId,
    ) -> Result<(), RejectReason> {
        Ok(())
    }
}
