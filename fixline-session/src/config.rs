/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session configuration.
//!
//! This module provides configuration options for FIX sessions and the
//! policies that govern sequencing and recovery decisions.

use fixline_core::error::SessionError;
use fixline_core::types::{CompId, SessionId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which side opens the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Connects out and sends the first Logon.
    Initiator,
    /// Accepts connections and answers Logon.
    Acceptor,
}

/// What to do with the message that revealed a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GapPolicy {
    /// Hold it until the gap is filled, then deliver in order.
    #[default]
    Buffer,
    /// Deliver it now; remember its sequence so the ledger skips it later.
    DeliverImmediately,
}

/// What to do with a poss-dup message below the expected sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DuplicatePolicy {
    /// Drop it silently.
    #[default]
    Discard,
    /// Hand it to the application again, flagged as a duplicate.
    Redeliver,
}

/// What to do with a message below the expected sequence without PossDupFlag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegressionPolicy {
    /// Logout with an explanation and disconnect.
    #[default]
    Disconnect,
    /// Send a session-level Reject and carry on.
    Reject,
}

/// What to do when the store cannot serve a peer's ResendRequest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResendFailurePolicy {
    /// Logout with an explanation and disconnect.
    #[default]
    Disconnect,
    /// Send a session-level Reject referencing the ResendRequest.
    Reject,
}

/// Configuration for a FIX session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sender CompID (tag 49).
    pub sender_comp_id: CompId,
    /// Target CompID (tag 56).
    pub target_comp_id: CompId,
    /// Optional qualifier distinguishing parallel sessions.
    pub qualifier: Option<String>,
    /// FIX version BeginString (e.g., "FIX.4.4").
    pub begin_string: String,
    /// Initiator or acceptor.
    pub role: Role,
    /// Heartbeat interval. Acceptors adopt the interval the peer's Logon carries.
    pub heartbeat_interval: Duration,
    /// Extra silence tolerated past the interval before a TestRequest.
    pub heartbeat_tolerance: Duration,
    /// Silence tolerated after the TestRequest before logging out.
    pub test_request_grace: Duration,
    /// Whether to reset sequence numbers on logon.
    pub reset_on_logon: bool,
    /// Whether to reset sequence numbers on logout.
    pub reset_on_logout: bool,
    /// Whether to reset sequence numbers on disconnect.
    pub reset_on_disconnect: bool,
    /// Maximum message size in bytes.
    pub max_message_size: usize,
    /// Logon timeout duration.
    pub logon_timeout: Duration,
    /// Logout timeout duration.
    pub logout_timeout: Duration,
    /// How long an outstanding ResendRequest may stay unsatisfied.
    pub resend_timeout: Duration,
    /// Sequence numbers fetched from the store per replay batch.
    pub resend_batch_size: usize,
    /// Whether to validate incoming message checksums.
    pub validate_checksum: bool,
    /// Whether to validate incoming message length.
    pub validate_length: bool,
    /// Whether inbound 49/56 must match the session identity.
    pub check_comp_ids: bool,
    /// Maximum SendingTime skew accepted, if checked.
    pub max_latency: Option<Duration>,
    /// Optional sender sub ID (tag 50).
    pub sender_sub_id: Option<String>,
    /// Optional target sub ID (tag 57).
    pub target_sub_id: Option<String>,
    /// Handling of the message that revealed a gap.
    pub gap_policy: GapPolicy,
    /// Handling of poss-dup duplicates.
    pub duplicate_policy: DuplicatePolicy,
    /// Handling of sequence regressions without PossDupFlag.
    pub regression_policy: RegressionPolicy,
    /// Handling of resend requests the store cannot serve.
    pub resend_failure_policy: ResendFailurePolicy,
}

impl SessionConfig {
    /// Creates a new session configuration with required fields.
    ///
    /// # Arguments
    /// * `sender_comp_id` - The sender CompID
    /// * `target_comp_id` - The target CompID
    /// * `begin_string` - The FIX version string
    #[must_use]
    pub fn new(
        sender_comp_id: CompId,
        target_comp_id: CompId,
        begin_string: impl Into<String>,
    ) -> Self {
        Self {
            sender_comp_id,
            target_comp_id,
            qualifier: None,
            begin_string: begin_string.into(),
            role: Role::Acceptor,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_tolerance: Duration::from_secs(1),
            test_request_grace: Duration::from_secs(30),
            reset_on_logon: false,
            reset_on_logout: false,
            reset_on_disconnect: false,
            max_message_size: 1024 * 1024, // 1MB
            logon_timeout: Duration::from_secs(10),
            logout_timeout: Duration::from_secs(10),
            resend_timeout: Duration::from_secs(60),
            resend_batch_size: 500,
            validate_checksum: true,
            validate_length: true,
            check_comp_ids: true,
            max_latency: None,
            sender_sub_id: None,
            target_sub_id: None,
            gap_policy: GapPolicy::default(),
            duplicate_policy: DuplicatePolicy::default(),
            regression_policy: RegressionPolicy::default(),
            resend_failure_policy: ResendFailurePolicy::default(),
        }
    }

    /// Returns the identity of the session this configuration describes.
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        let id = SessionId::new(self.sender_comp_id, self.target_comp_id);
        match &self.qualifier {
            Some(q) => id.with_qualifier(q.clone()),
            None => id,
        }
    }

    /// Sets the role.
    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Sets the qualifier.
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the heartbeat tolerance and TestRequest grace period.
    #[must_use]
    pub const fn with_heartbeat_slack(mut self, tolerance: Duration, grace: Duration) -> Self {
        self.heartbeat_tolerance = tolerance;
        self.test_request_grace = grace;
        self
    }

    /// Sets whether to reset sequence numbers on logon.
    #[must_use]
    pub const fn with_reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets whether to reset sequence numbers on logout.
    #[must_use]
    pub const fn with_reset_on_logout(mut self, reset: bool) -> Self {
        self.reset_on_logout = reset;
        self
    }

    /// Sets whether to reset sequence numbers on disconnect.
    #[must_use]
    pub const fn with_reset_on_disconnect(mut self, reset: bool) -> Self {
        self.reset_on_disconnect = reset;
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets the logon timeout.
    #[must_use]
    pub fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the logout timeout.
    #[must_use]
    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    /// Sets the resend timeout.
    #[must_use]
    pub fn with_resend_timeout(mut self, timeout: Duration) -> Self {
        self.resend_timeout = timeout;
        self
    }

    /// Sets the replay batch size.
    #[must_use]
    pub const fn with_resend_batch_size(mut self, size: usize) -> Self {
        self.resend_batch_size = size;
        self
    }

    /// Sets the maximum accepted SendingTime skew.
    #[must_use]
    pub const fn with_max_latency(mut self, latency: Option<Duration>) -> Self {
        self.max_latency = latency;
        self
    }

    /// Sets the gap policy.
    #[must_use]
    pub const fn with_gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// Sets the duplicate policy.
    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Sets the regression policy.
    #[must_use]
    pub const fn with_regression_policy(mut self, policy: RegressionPolicy) -> Self {
        self.regression_policy = policy;
        self
    }

    /// Sets the resend failure policy.
    #[must_use]
    pub const fn with_resend_failure_policy(mut self, policy: ResendFailurePolicy) -> Self {
        self.resend_failure_policy = policy;
        self
    }

    /// Sets the sender sub ID.
    #[must_use]
    pub fn with_sender_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.sender_sub_id = Some(sub_id.into());
        self
    }

    /// Sets the target sub ID.
    #[must_use]
    pub fn with_target_sub_id(mut self, sub_id: impl Into<String>) -> Self {
        self.target_sub_id = Some(sub_id.into());
        self
    }

    /// Returns the heartbeat interval in seconds.
    #[must_use]
    pub fn heartbeat_interval_secs(&self) -> u64 {
        self.heartbeat_interval.as_secs()
    }

    /// Checks the configuration for values the engine cannot run with.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` describing the first problem.
    pub fn validate(&self) -> Result<(), SessionError> {
        if !self.begin_string.starts_with("FIX") {
            return Err(SessionError::Configuration(format!(
                "unsupported begin string {}",
                self.begin_string
            )));
        }
        if self.role == Role::Initiator && self.heartbeat_interval.is_zero() {
            return Err(SessionError::Configuration(
                "initiator heartbeat interval must be positive".to_string(),
            ));
        }
        if self.resend_batch_size == 0 {
            return Err(SessionError::Configuration(
                "resend batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for session configuration.
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    sender_comp_id: Option<CompId>,
    target_comp_id: Option<CompId>,
    qualifier: Option<String>,
    begin_string: Option<String>,
    role: Option<Role>,
    heartbeat_interval: Option<Duration>,
    reset_on_logon: bool,
    max_message_size: Option<usize>,
    resend_batch_size: Option<usize>,
    gap_policy: GapPolicy,
    duplicate_policy: DuplicatePolicy,
}

impl SessionConfigBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender CompID.
    #[must_use]
    pub fn sender_comp_id(mut self, id: CompId) -> Self {
        self.sender_comp_id = Some(id);
        self
    }

    /// Sets the target CompID.
    #[must_use]
    pub fn target_comp_id(mut self, id: CompId) -> Self {
        self.target_comp_id = Some(id);
        self
    }

    /// Sets the session qualifier.
    #[must_use]
    pub fn qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = Some(qualifier.into());
        self
    }

    /// Sets the FIX version.
    #[must_use]
    pub fn begin_string(mut self, version: impl Into<String>) -> Self {
        self.begin_string = Some(version.into());
        self
    }

    /// Sets the role.
    #[must_use]
    pub const fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = Some(interval);
        self
    }

    /// Sets whether to reset on logon.
    #[must_use]
    pub const fn reset_on_logon(mut self, reset: bool) -> Self {
        self.reset_on_logon = reset;
        self
    }

    /// Sets the maximum message size.
    #[must_use]
    pub const fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Sets the replay batch size.
    #[must_use]
    pub const fn resend_batch_size(mut self, size: usize) -> Self {
        self.resend_batch_size = Some(size);
        self
    }

    /// Sets the gap policy.
    #[must_use]
    pub const fn gap_policy(mut self, policy: GapPolicy) -> Self {
        self.gap_policy = policy;
        self
    }

    /// Sets the duplicate policy.
    #[must_use]
    pub const fn duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    /// Returns `SessionError::Configuration` if a CompID is missing or the
    /// resulting configuration is invalid.
    pub fn build(self) -> Result<SessionConfig, SessionError> {
        let sender = self
            .sender_comp_id
            .ok_or_else(|| SessionError::Configuration("sender_comp_id is required".into()))?;
        let target = self
            .target_comp_id
            .ok_or_else(|| SessionError::Configuration("target_comp_id is required".into()))?;
        let begin_string = self.begin_string.unwrap_or_else(|| "FIX.4.4".to_string());

        let mut config = SessionConfig::new(sender, target, begin_string);

        config.qualifier = self.qualifier;
        if let Some(role) = self.role {
            config.role = role;
        }
        if let Some(interval) = self.heartbeat_interval {
            config.heartbeat_interval = interval;
        }
        config.reset_on_logon = self.reset_on_logon;
        if let Some(size) = self.max_message_size {
            config.max_message_size = size;
        }
        if let Some(size) = self.resend_batch_size {
            config.resend_batch_size = size;
        }
        config.gap_policy = self.gap_policy;
        config.duplicate_policy = self.duplicate_policy;

        config.validate()?;
        Ok(config)
    }
}
