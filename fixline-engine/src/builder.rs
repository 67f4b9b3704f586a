/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine builder for fluent configuration.
//!
//! This module provides a builder API for configuring FIX engines.

use crate::engine::{Engine, Shared};
use crate::registry::{SessionFactory, SessionRegistry, UnregisteredPolicy};
use fixline_core::error::SessionError;
use fixline_session::pool::DEFAULT_BUFFER_CAPACITY;
use fixline_session::{Application, BufferPool, EngineStats, NoOpApplication, SessionConfig};
use fixline_store::{MemoryStore, MessageStore};
use fixline_transport::FixCodec;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Builder for configuring a FIX engine.
pub struct EngineBuilder<A: Application = NoOpApplication> {
    /// Application callback handler.
    application: Arc<A>,
    /// Message store shared by every session.
    store: Option<Arc<dyn MessageStore>>,
    /// Session configurations.
    sessions: Vec<SessionConfig>,
    /// Handling of Logons for unknown sessions.
    unregistered: UnregisteredPolicy,
    /// Peer addresses allowed to connect, if restricted.
    allowed_ips: Option<Vec<IpAddr>>,
    /// Idle encoder buffers kept by the pool.
    pool_capacity: usize,
    /// Largest inbound frame accepted.
    max_message_size: usize,
    /// How often each connection's timers are polled.
    timer_interval: Duration,
    /// How long an acceptor waits for the first Logon.
    logon_timeout: Duration,
    /// Connection timeout.
    connect_timeout: Duration,
}

impl<A: Application> std::fmt::Debug for EngineBuilder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("sessions", &self.sessions)
            .field("unregistered", &self.unregistered)
            .field("allowed_ips", &self.allowed_ips)
            .field("pool_capacity", &self.pool_capacity)
            .field("timer_interval", &self.timer_interval)
            .finish_non_exhaustive()
    }
}

impl Default for EngineBuilder<NoOpApplication> {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder<NoOpApplication> {
    /// Creates a new engine builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            application: Arc::new(NoOpApplication),
            store: None,
            sessions: Vec::new(),
            unregistered: UnregisteredPolicy::default(),
            allowed_ips: None,
            pool_capacity: 64,
            max_message_size: 1024 * 1024,
            timer_interval: Duration::from_secs(1),
            logon_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl<A: Application + 'static> EngineBuilder<A> {
    /// Sets the application callback handler.
    #[must_use]
    pub fn with_application<B: Application>(self, application: B) -> EngineBuilder<B> {
        EngineBuilder {
            application: Arc::new(application),
            store: self.store,
            sessions: self.sessions,
            unregistered: self.unregistered,
            allowed_ips: self.allowed_ips,
            pool_capacity: self.pool_capacity,
            max_message_size: self.max_message_size,
            timer_interval: self.timer_interval,
            logon_timeout: self.logon_timeout,
            connect_timeout: self.connect_timeout,
        }
    }

    /// Sets the message store. Defaults to a [`MemoryStore`].
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn MessageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Adds a session configuration.
    #[must_use]
    pub fn add_session(mut self, config: SessionConfig) -> Self {
        self.sessions.push(config);
        self
    }

    /// Sets the handling of Logons for unknown sessions.
    #[must_use]
    pub fn with_unregistered_policy(mut self, policy: UnregisteredPolicy) -> Self {
        self.unregistered = policy;
        self
    }

    /// Restricts inbound connections to these peer addresses.
    #[must_use]
    pub fn with_allowed_ips(mut self, ips: impl IntoIterator<Item = IpAddr>) -> Self {
        self.allowed_ips = Some(ips.into_iter().collect());
        self
    }

    /// Sets how many idle encoder buffers the pool keeps.
    #[must_use]
    pub const fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    /// Sets the largest inbound frame accepted.
    #[must_use]
    pub const fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Sets how often connection timers are polled.
    #[must_use]
    pub fn with_timer_interval(mut self, interval: Duration) -> Self {
        self.timer_interval = interval;
        self
    }

    /// Sets how long an acceptor waits for the first Logon.
    #[must_use]
    pub fn with_logon_timeout(mut self, timeout: Duration) -> Self {
        self.logon_timeout = timeout;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Returns the configured sessions.
    #[must_use]
    pub fn sessions(&self) -> &[SessionConfig] {
        &self.sessions
    }

    /// Returns the connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Returns the timer poll interval.
    #[must_use]
    pub const fn timer_interval(&self) -> Duration {
        self.timer_interval
    }

    /// Returns the application handler.
    #[must_use]
    pub fn application(&self) -> Arc<A> {
        Arc::clone(&self.application)
    }

    /// Creates the engine and its sessions, restoring their persisted
    /// sequence numbers.
    ///
    /// # Errors
    /// Returns `SessionError` if a session configuration is invalid, two
    /// sessions share an identity, or the store cannot be read.
    pub async fn build(self) -> Result<Engine, SessionError> {
        if self.timer_interval.is_zero() {
            return Err(SessionError::Configuration(
                "timer interval must be positive".into(),
            ));
        }
        let app: Arc<dyn Application> = self.application;
        let factory = SessionFactory {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(MemoryStore::new())),
            app,
            stats: Arc::new(EngineStats::new()),
            pool: Arc::new(BufferPool::new(self.pool_capacity, DEFAULT_BUFFER_CAPACITY)),
        };
        let registry = SessionRegistry::new();
        for config in self.sessions {
            registry.register(factory.create(config).await?)?;
        }
        if let UnregisteredPolicy::Admit { template } = &self.unregistered {
            template.validate()?;
        }
        Ok(Engine::new(Shared {
            registry,
            factory,
            unregistered: self.unregistered,
            allowed_ips: self.allowed_ips,
            codec: FixCodec::new().with_max_message_size(self.max_message_size),
            timer_interval: self.timer_interval,
            logon_timeout: self.logon_timeout,
            connect_timeout: self.connect_timeout,
            shutdown: CancellationToken::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::CompId;

    fn config(sender: &str) -> SessionConfig {
        SessionConfig::new(
            CompId::new(sender).unwrap(),
            CompId::new("TARGET").unwrap(),
            "FIX.4.4",
        )
    }

    #[test]
    fn test_engine_builder_default() {
        let builder = EngineBuilder::new();
        assert_eq!(builder.connect_timeout(), Duration::from_secs(30));
        assert_eq!(builder.timer_interval(), Duration::from_secs(1));
        assert!(builder.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_engine_builder_with_sessions() {
        let engine = EngineBuilder::new()
            .add_session(config("SENDER"))
            .add_session(config("OTHER"))
            .with_connect_timeout(Duration::from_secs(60))
            .build()
            .await
            .unwrap();

        assert_eq!(engine.registry().len(), 2);
        assert_eq!(engine.stats().logons, 0);
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let result = EngineBuilder::new()
            .add_session(config("SENDER"))
            .add_session(config("SENDER"))
            .build()
            .await;
        assert!(matches!(result, Err(SessionError::DuplicateSession(_))));
    }

    #[tokio::test]
    async fn test_restores_persisted_sequences() {
        let store = Arc::new(MemoryStore::new());
        let id = config("SENDER").session_id();
        store
            .save_sequences(
                &id,
                fixline_store::SequenceState {
                    next_outbound: 12,
                    next_inbound: 7,
                },
            )
            .await
            .unwrap();

        let engine = EngineBuilder::new()
            .with_store(store)
            .add_session(config("SENDER"))
            .build()
            .await
            .unwrap();

        let session = engine.session(&id).unwrap();
        assert_eq!(session.next_outbound(), 12);
        assert_eq!(session.next_inbound(), 7);
    }
}
