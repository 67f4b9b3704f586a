/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session registry.
//!
//! Every session the engine knows lives here, keyed by [`SessionId`]. A
//! session may be bound to at most one live connection at a time; the
//! registry tracks which ones are.

use fixline_core::error::SessionError;
use fixline_core::types::SessionId;
use fixline_session::{Application, BufferPool, EngineStats, Session, SessionConfig};
use fixline_store::MessageStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// What an acceptor does with a Logon for a session it has no configuration for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum UnregisteredPolicy {
    /// Close the connection.
    #[default]
    Reject,
    /// Create the session from `template`, with the CompIDs taken from the Logon.
    Admit {
        /// Settings for admitted sessions.
        template: Box<SessionConfig>,
    },
}

/// Shared collaborators for sessions created by the registry.
pub(crate) struct SessionFactory {
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) app: Arc<dyn Application>,
    pub(crate) stats: Arc<EngineStats>,
    pub(crate) pool: Arc<BufferPool>,
}

impl SessionFactory {
    /// Creates a session and loads its persisted sequence numbers.
    pub(crate) async fn create(&self, config: SessionConfig) -> Result<Arc<Session>, SessionError> {
        let session = Session::new(
            config,
            Arc::clone(&self.store),
            Arc::clone(&self.app),
            Arc::clone(&self.stats),
            Arc::clone(&self.pool),
        )?;
        session
            .restore()
            .await
            .map_err(|e| SessionError::Configuration(format!("cannot restore session: {e}")))?;
        Ok(Arc::new(session))
    }
}

/// All sessions known to an engine.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    live: RwLock<HashSet<SessionId>>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.read().len())
            .field("live", &self.live.read().len())
            .finish()
    }
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session.
    ///
    /// # Errors
    /// Returns `SessionError::DuplicateSession` if the identity is taken.
    pub fn register(&self, session: Arc<Session>) -> Result<(), SessionError> {
        let mut sessions = self.sessions.write();
        let id = session.id().clone();
        if sessions.contains_key(&id) {
            return Err(SessionError::DuplicateSession(id.to_string()));
        }
        info!(session = %id, "session registered");
        sessions.insert(id, session);
        Ok(())
    }

    /// Looks up a session.
    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Returns every registered session.
    #[must_use]
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.read().values().cloned().collect()
    }

    /// Returns the number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no session is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Marks `id` as bound to a connection. Returns false if it already is.
    pub fn claim(&self, id: &SessionId) -> bool {
        self.live.write().insert(id.clone())
    }

    /// Marks `id` as free for a new connection.
    pub fn release(&self, id: &SessionId) {
        self.live.write().remove(id);
    }

    /// Returns true if `id` is bound to a connection.
    #[must_use]
    pub fn is_live(&self, id: &SessionId) -> bool {
        self.live.read().contains(id)
    }

    /// Finds the session an inbound Logon addresses, creating it if the
    /// policy admits unknown sessions.
    ///
    /// # Errors
    /// Returns `SessionError::UnknownSession` if the session is not
    /// registered and the policy rejects it.
    pub(crate) async fn resolve(
        &self,
        id: &SessionId,
        policy: &UnregisteredPolicy,
        factory: &SessionFactory,
    ) -> Result<Arc<Session>, SessionError> {
        if let Some(session) = self.get(id) {
            return Ok(session);
        }
        let UnregisteredPolicy::Admit { template } = policy else {
            return Err(SessionError::UnknownSession(id.to_string()));
        };
        let mut config = template.as_ref().clone();
        config.sender_comp_id = id.sender;
        config.target_comp_id = id.target;
        config.qualifier.clone_from(&id.qualifier);
        let session = factory.create(config).await?;
        info!(session = %id, "admitting unregistered session");
        match self.register(Arc::clone(&session)) {
            Ok(()) => Ok(session),
            // Lost a race with another connection admitting the same identity.
            Err(_) => self
                .get(id)
                .ok_or_else(|| SessionError::UnknownSession(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::CompId;
    use fixline_session::NoOpApplication;
    use fixline_store::MemoryStore;

    fn factory() -> SessionFactory {
        SessionFactory {
            store: Arc::new(MemoryStore::new()),
            app: Arc::new(NoOpApplication),
            stats: Arc::new(EngineStats::new()),
            pool: Arc::new(BufferPool::default()),
        }
    }

    fn config(sender: &str, target: &str) -> SessionConfig {
        SessionConfig::new(CompId::new(sender).unwrap(), CompId::new(target).unwrap(), "FIX.4.4")
    }

    #[tokio::test]
    async fn test_register_and_claim() {
        let registry = SessionRegistry::new();
        let session = factory().create(config("SERVER", "CLIENT")).await.unwrap();
        let id = session.id().clone();

        registry.register(Arc::clone(&session)).unwrap();
        assert!(matches!(
            registry.register(session),
            Err(SessionError::DuplicateSession(_))
        ));
        assert_eq!(registry.len(), 1);

        assert!(registry.claim(&id));
        assert!(!registry.claim(&id));
        assert!(registry.is_live(&id));
        registry.release(&id);
        assert!(registry.claim(&id));
    }

    #[tokio::test]
    async fn test_resolve_policies() {
        let registry = SessionRegistry::new();
        let factory = factory();
        let id = SessionId::from_inbound("CLIENT", "SERVER").unwrap();

        let rejected = registry.resolve(&id, &UnregisteredPolicy::Reject, &factory).await;
        assert!(matches!(rejected, Err(SessionError::UnknownSession(_))));
        assert!(registry.is_empty());

        let admit = UnregisteredPolicy::Admit {
            template: Box::new(config("ANY", "ANY")),
        };
        let session = registry.resolve(&id, &admit, &factory).await.unwrap();
        assert_eq!(session.id(), &id);
        assert_eq!(session.config().sender_comp_id.as_str(), "SERVER");
        assert!(registry.get(&id).is_some());
    }
}
