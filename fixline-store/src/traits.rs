/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Message store trait definition.
//!
//! This module defines the abstract interface for message storage
//! implementations along with the cursor used to replay a range in batches.

use async_trait::async_trait;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the session a log belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Messages received from the counterparty.
    Inbound,
    /// Messages sent to the counterparty.
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inbound => f.write_str("inbound"),
            Self::Outbound => f.write_str("outbound"),
        }
    }
}

/// A message held in the store with the sequence number it was logged under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// MsgSeqNum of the message.
    pub seq: u64,
    /// The framed message exactly as sent or received.
    pub raw: Bytes,
}

/// Persisted sequence numbers of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    /// Next MsgSeqNum to assign to an outbound message.
    pub next_outbound: u64,
    /// Next MsgSeqNum expected from the counterparty.
    pub next_inbound: u64,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self {
            next_outbound: 1,
            next_inbound: 1,
        }
    }
}

/// Abstract interface for FIX message storage.
///
/// A store keeps one append-only log per session and direction, keyed by
/// sequence number, plus the session's sequence numbers so a recreated
/// session can resume where it left off.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Appends a framed message to a session log.
    ///
    /// Appending a sequence number that is already present replaces it; this
    /// only happens after a sequence reset.
    ///
    /// # Errors
    /// Returns `StoreError` if the message cannot be stored.
    async fn append(
        &self,
        session: &SessionId,
        direction: Direction,
        seq: u64,
        raw: Bytes,
    ) -> Result<(), StoreError>;

    /// Retrieves the logged messages with `from <= seq <= to` in ascending order.
    ///
    /// `to == 0` means "through the last logged message". Sequence numbers
    /// that were never logged are simply absent from the result.
    ///
    /// # Errors
    /// Returns `StoreError::RangeNotAvailable` if part of the range is no
    /// longer retained.
    async fn range(
        &self,
        session: &SessionId,
        direction: Direction,
        from: u64,
        to: u64,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Returns the highest logged sequence number, if any.
    ///
    /// # Errors
    /// Returns `StoreError` if the log cannot be read.
    async fn last_seq(
        &self,
        session: &SessionId,
        direction: Direction,
    ) -> Result<Option<u64>, StoreError>;

    /// Loads the persisted sequence numbers, defaulting to 1/1.
    ///
    /// # Errors
    /// Returns `StoreError` if the state cannot be read.
    async fn sequences(&self, session: &SessionId) -> Result<SequenceState, StoreError>;

    /// Persists the session's sequence numbers.
    ///
    /// # Errors
    /// Returns `StoreError` if the state cannot be written.
    async fn save_sequences(
        &self,
        session: &SessionId,
        state: SequenceState,
    ) -> Result<(), StoreError>;

    /// Clears both logs and resets the sequence numbers to 1.
    ///
    /// # Errors
    /// Returns `StoreError` if the reset fails.
    async fn reset(&self, session: &SessionId) -> Result<(), StoreError>;
}

/// Lazy, restartable walk over a stored range.
///
/// Each call to [`ReplayCursor::next_batch`] fetches at most `max` sequence
/// numbers' worth of messages, so a large replay never materializes the whole
/// range at once and the caller can yield between batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayCursor {
    session: SessionId,
    direction: Direction,
    next: u64,
    end: u64,
}

impl ReplayCursor {
    /// Creates a cursor over `from..=end` (both resolved, `end` not 0).
    #[must_use]
    pub fn new(session: SessionId, direction: Direction, from: u64, end: u64) -> Self {
        Self {
            session,
            direction,
            next: from,
            end,
        }
    }

    /// Returns the next sequence number the cursor will fetch.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.next
    }

    /// Returns the inclusive end of the range.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.end
    }

    /// Returns true once the whole range has been fetched.
    #[inline]
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.next > self.end
    }

    /// Restarts the walk at `seq`.
    pub fn resume_from(&mut self, seq: u64) {
        self.next = seq;
    }

    /// Fetches the next batch covering at most `max` sequence numbers.
    ///
    /// Returns the inclusive sequence span covered along with the messages
    /// found in it; the span may contain holes. Returns `None` when done.
    ///
    /// # Errors
    /// Propagates store errors; the cursor does not advance on error.
    pub async fn next_batch(
        &mut self,
        store: &dyn MessageStore,
        max: usize,
    ) -> Result<Option<(std::ops::RangeInclusive<u64>, Vec<StoredMessage>)>, StoreError> {
        if self.is_done() {
            return Ok(None);
        }
        let span = (max.max(1) as u64).saturating_sub(1);
        let to = self.next.saturating_add(span).min(self.end);
        let messages = store
            .range(&self.session, self.direction, self.next, to)
            .await?;
        let covered = self.next..=to;
        self.next = to + 1;
        Ok(Some((covered, messages)))
    }
}
