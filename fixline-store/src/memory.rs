/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! In-memory message store implementation.
//!
//! This module provides a simple in-memory message store suitable for
//! testing and applications that don't require persistence.

use crate::traits::{Direction, MessageStore, SequenceState, StoredMessage};
use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::SessionId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// One append-only log.
#[derive(Debug)]
struct Log {
    messages: BTreeMap<u64, Bytes>,
    /// Lowest sequence number still retained.
    first_retained: u64,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            messages: BTreeMap::new(),
            first_retained: 1,
        }
    }
}

#[derive(Debug, Default)]
struct SessionLog {
    inbound: Log,
    outbound: Log,
    sequences: SequenceState,
}

impl SessionLog {
    fn log(&self, direction: Direction) -> &Log {
        match direction {
            Direction::Inbound => &self.inbound,
            Direction::Outbound => &self.outbound,
        }
    }

    fn log_mut(&mut self, direction: Direction) -> &mut Log {
        match direction {
            Direction::Inbound => &mut self.inbound,
            Direction::Outbound => &mut self.outbound,
        }
    }
}

/// In-memory message store.
///
/// Stores messages in a `BTreeMap` per session and direction for efficient
/// range queries. Not persistent - all data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, SessionLog>>,
}

impl MemoryStore {
    /// Creates a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of messages in one log.
    #[must_use]
    pub fn message_count(&self, session: &SessionId, direction: Direction) -> usize {
        self.sessions
            .read()
            .get(session)
            .map_or(0, |s| s.log(direction).messages.len())
    }

    /// Checks if a message with the given sequence number exists.
    #[must_use]
    pub fn contains(&self, session: &SessionId, direction: Direction, seq: u64) -> bool {
        self.sessions
            .read()
            .get(session)
            .is_some_and(|s| s.log(direction).messages.contains_key(&seq))
    }

    /// Discards every message below `below`, as a rotating log would.
    ///
    /// Later range queries starting before `below` fail with
    /// `StoreError::RangeNotAvailable`.
    pub fn truncate(&self, session: &SessionId, direction: Direction, below: u64) {
        let mut sessions = self.sessions.write();
        let log = sessions.entry(session.clone()).or_default().log_mut(direction);
        log.messages = log.messages.split_off(&below);
        log.first_retained = log.first_retained.max(below);
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(
        &self,
        session: &SessionId,
        direction: Direction,
        seq: u64,
        raw: Bytes,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write();
        let log = sessions.entry(session.clone()).or_default().log_mut(direction);
        log.messages.insert(seq, raw);
        Ok(())
    }

    async fn range(
        &self,
        session: &SessionId,
        direction: Direction,
        from: u64,
        to: u64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let sessions = self.sessions.read();
        let Some(log) = sessions.get(session).map(|s| s.log(direction)) else {
            return Ok(Vec::new());
        };
        let to = if to == 0 { u64::MAX } else { to };
        if from > to {
            return Ok(Vec::new());
        }
        if from < log.first_retained {
            return Err(StoreError::RangeNotAvailable {
                range: from..to.saturating_add(1),
            });
        }

        Ok(log
            .messages
            .range(from..=to)
            .map(|(seq, raw)| StoredMessage {
                seq: *seq,
                raw: raw.clone(),
            })
            .collect())
    }

    async fn last_seq(
        &self,
        session: &SessionId,
        direction: Direction,
    ) -> Result<Option<u64>, StoreError> {
        Ok(self
            .sessions
            .read()
            .get(session)
            .and_then(|s| s.log(direction).messages.keys().next_back().copied()))
    }

    async fn sequences(&self, session: &SessionId) -> Result<SequenceState, StoreError> {
        Ok(self
            .sessions
            .read()
            .get(session)
            .map(|s| s.sequences)
            .unwrap_or_default())
    }

    async fn save_sequences(
        &self,
        session: &SessionId,
        state: SequenceState,
    ) -> Result<(), StoreError> {
        self.sessions
            .write()
            .entry(session.clone())
            .or_default()
            .sequences = state;
        Ok(())
    }

    async fn reset(&self, session: &SessionId) -> Result<(), StoreError> {
        self.sessions.write().remove(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::CompId;

    fn session(target: &str) -> SessionId {
        SessionId::new(CompId::new("ME").unwrap(), CompId::new(target).unwrap())
    }

    #[tokio::test]
    async fn test_memory_store_new() {
        let store = MemoryStore::new();
        let id = session("B");
        assert_eq!(store.message_count(&id, Direction::Outbound), 0);
        assert_eq!(store.sequences(&id).await.unwrap(), SequenceState::default());
        assert_eq!(store.last_seq(&id, Direction::Outbound).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_store_append_by_direction() {
        let store = MemoryStore::new();
        let id = session("B");

        store
            .append(&id, Direction::Outbound, 1, Bytes::from_static(b"out1"))
            .await
            .unwrap();
        store
            .append(&id, Direction::Inbound, 1, Bytes::from_static(b"in1"))
            .await
            .unwrap();
        store
            .append(&id, Direction::Outbound, 2, Bytes::from_static(b"out2"))
            .await
            .unwrap();

        assert_eq!(store.message_count(&id, Direction::Outbound), 2);
        assert_eq!(store.message_count(&id, Direction::Inbound), 1);
        assert!(store.contains(&id, Direction::Inbound, 1));
        assert!(!store.contains(&id, Direction::Inbound, 2));
        assert_eq!(
            store.last_seq(&id, Direction::Outbound).await.unwrap(),
            Some(2)
        );
        assert_eq!(store.message_count(&session("C"), Direction::Outbound), 0);
    }

    #[tokio::test]
    async fn test_memory_store_range() {
        let store = MemoryStore::new();
        let id = session("B");
        for seq in [1u64, 2, 3, 5] {
            store
                .append(&id, Direction::Outbound, seq, Bytes::from(format!("msg{seq}")))
                .await
                .unwrap();
        }

        let range = store.range(&id, Direction::Outbound, 1, 3).await.unwrap();
        assert_eq!(range.len(), 3);

        let range = store.range(&id, Direction::Outbound, 2, 5).await.unwrap();
        assert_eq!(range.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![2, 3, 5]);

        let open = store.range(&id, Direction::Outbound, 3, 0).await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[1].raw, Bytes::from_static(b"msg5"));
    }

    #[tokio::test]
    async fn test_memory_store_truncated_range() {
        let store = MemoryStore::new();
        let id = session("B");
        for seq in 1..=10u64 {
            store
                .append(&id, Direction::Outbound, seq, Bytes::from_static(b"m"))
                .await
                .unwrap();
        }
        store.truncate(&id, Direction::Outbound, 6);

        let err = store
            .range(&id, Direction::Outbound, 3, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RangeNotAvailable { .. }));
        assert_eq!(
            store.range(&id, Direction::Outbound, 6, 8).await.unwrap().len(),
            3
        );
    }

    #[tokio::test]
    async fn test_memory_store_sequences_and_reset() {
        let store = MemoryStore::new();
        let id = session("B");
        let state = SequenceState {
            next_outbound: 10,
            next_inbound: 20,
        };

        store
            .append(&id, Direction::Outbound, 1, Bytes::from_static(b"msg1"))
            .await
            .unwrap();
        store.save_sequences(&id, state).await.unwrap();
        assert_eq!(store.sequences(&id).await.unwrap(), state);

        store.reset(&id).await.unwrap();

        assert_eq!(store.message_count(&id, Direction::Outbound), 0);
        assert_eq!(store.sequences(&id).await.unwrap(), SequenceState::default());
    }
}
