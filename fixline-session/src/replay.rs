/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Serving a peer's ResendRequest from the outbound store.
//!
//! [`ReplayPlanner`] walks the requested range one batch at a time and turns
//! stored frames into what goes back on the wire: application messages are
//! rewritten as possible duplicates, runs of session messages and holes in
//! the log collapse into a single GapFill.

use crate::pool::BufferPool;
use bytes::Bytes;
use fixline_core::error::StoreError;
use fixline_core::types::Timestamp;
use fixline_store::{MessageStore, ReplayCursor, StoredMessage};
use fixline_tagvalue::{peek_msg_type, rewrite_into};
use tracing::warn;

/// One retransmission step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayItem {
    /// A stored message rewritten with PossDupFlag and OrigSendingTime.
    Resend {
        /// MsgSeqNum of the message.
        seq: u64,
        /// Rewritten frame.
        frame: Bytes,
    },
    /// SequenceReset-GapFill sent under `begin` advancing the peer to `new_seq`.
    GapFill {
        /// MsgSeqNum of the GapFill.
        begin: u64,
        /// NewSeqNo (36).
        new_seq: u64,
    },
}

impl ReplayItem {
    /// Returns the sequence number the item is sent under.
    #[must_use]
    pub const fn seq(&self) -> u64 {
        match self {
            Self::Resend { seq, .. } => *seq,
            Self::GapFill { begin, .. } => *begin,
        }
    }
}

/// Batched replay of one requested range.
#[derive(Debug)]
pub struct ReplayPlanner {
    cursor: ReplayCursor,
    /// MsgSeqNum of the ResendRequest being served.
    request_seq: u64,
    /// Start of a GapFill run not yet emitted.
    fill_from: Option<u64>,
}

impl ReplayPlanner {
    /// Creates a planner over `cursor`, answering the ResendRequest `request_seq`.
    #[must_use]
    pub fn new(cursor: ReplayCursor, request_seq: u64) -> Self {
        Self {
            cursor,
            request_seq,
            fill_from: None,
        }
    }

    /// Returns the MsgSeqNum of the ResendRequest being served.
    #[must_use]
    pub const fn request_seq(&self) -> u64 {
        self.request_seq
    }

    /// Returns the inclusive `(begin, end)` still to be replayed.
    #[must_use]
    pub fn remaining(&self) -> (u64, u64) {
        let begin = self.fill_from.unwrap_or_else(|| self.cursor.position());
        (begin, self.cursor.end())
    }

    /// Returns true once every item has been produced.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.cursor.is_done() && self.fill_from.is_none()
    }

    /// Produces the items for the next batch, `None` once the range is served.
    ///
    /// A GapFill run that reaches the end of a batch is carried into the next
    /// one, so a run is always emitted as a single message.
    ///
    /// # Errors
    /// Propagates store errors, e.g. `RangeNotAvailable` after truncation.
    pub async fn next_batch(
        &mut self,
        store: &dyn MessageStore,
        max: usize,
        pool: &BufferPool,
        sending_time: Timestamp,
    ) -> Result<Option<Vec<ReplayItem>>, StoreError> {
        let Some((span, messages)) = self.cursor.next_batch(store, max).await? else {
            return Ok(None);
        };

        let mut items = Vec::with_capacity(messages.len() + 1);
        let mut expected = *span.start();
        for StoredMessage { seq, raw } in messages {
            if seq > expected {
                self.fill_from.get_or_insert(expected);
            }
            expected = seq + 1;

            match peek_msg_type(&raw) {
                Some(t) if t.is_gap_filled_on_resend() => {
                    self.fill_from.get_or_insert(seq);
                    continue;
                }
                Some(_) => {}
                None => return Err(self.unreadable(seq, "no MsgType")),
            }
            match rewrite_into(&raw, sending_time, pool.acquire()) {
                Ok((frame, scratch)) => {
                    pool.release(scratch);
                    if let Some(begin) = self.fill_from.take() {
                        items.push(ReplayItem::GapFill {
                            begin,
                            new_seq: seq,
                        });
                    }
                    items.push(ReplayItem::Resend {
                        seq,
                        frame: frame.freeze(),
                    });
                }
                Err(error) => return Err(self.unreadable(seq, &error.to_string())),
            }
        }
        if expected <= *span.end() {
            self.fill_from.get_or_insert(expected);
        }
        if self.cursor.is_done()
            && let Some(begin) = self.fill_from.take()
        {
            items.push(ReplayItem::GapFill {
                begin,
                new_seq: self.cursor.end() + 1,
            });
        }
        Ok(Some(items))
    }

    /// A stored frame that cannot be replayed must never be gap filled, since
    /// it may be an application message. The planner is left pointing at it.
    fn unreadable(&mut self, seq: u64, reason: &str) -> StoreError {
        warn!(seq, reason, "stored message unreadable");
        self.fill_from = None;
        self.cursor.resume_from(seq);
        StoreError::Io(format!("stored message {seq} unreadable: {reason}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixline_core::types::{CompId, SessionId};
    use fixline_store::{Direction, MemoryStore};
    use fixline_tagvalue::Decoder;

    fn session() -> SessionId {
        SessionId::new(CompId::new("BUY").unwrap(), CompId::new("SELL").unwrap())
    }

    fn frame(seq: u64, msg_type: &str) -> Bytes {
        let mut enc = fixline_tagvalue::Encoder::new("FIX.4.4");
        enc.put_str(35, msg_type);
        enc.put_uint(34, seq);
        enc.put_str(52, "20260127-10:00:00.000");
        enc.into_frame()
    }

    async fn store_with(entries: &[(u64, &str)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (seq, t) in entries {
            store
                .append(&session(), Direction::Outbound, *seq, frame(*seq, t))
                .await
                .unwrap();
        }
        store
    }

    async fn drain(planner: &mut ReplayPlanner, store: &MemoryStore, max: usize) -> Vec<ReplayItem> {
        let pool = BufferPool::default();
        let mut all = Vec::new();
        while let Some(items) = planner
            .next_batch(store, max, &pool, Timestamp::from_millis(0))
            .await
            .unwrap()
        {
            all.extend(items);
        }
        all
    }

    fn shape(items: &[ReplayItem]) -> Vec<(u64, Option<u64>)> {
        items
            .iter()
            .map(|i| match i {
                ReplayItem::Resend { seq, .. } => (*seq, None),
                ReplayItem::GapFill { begin, new_seq } => (*begin, Some(*new_seq)),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_session_message_gap_filled() {
        let store = store_with(&[(5, "D"), (6, "A"), (7, "D")]).await;
        let cursor = ReplayCursor::new(session(), Direction::Outbound, 5, 7);
        let mut planner = ReplayPlanner::new(cursor, 2);

        let items = drain(&mut planner, &store, 100).await;
        assert_eq!(shape(&items), vec![(5, None), (6, Some(7)), (7, None)]);
        assert!(planner.is_done());

        let ReplayItem::Resend { frame, .. } = &items[0] else {
            panic!("expected resend");
        };
        let raw = Decoder::new(frame).decode().unwrap();
        assert_eq!(raw.get_field_str(43), Some("Y"));
        assert_eq!(raw.get_field_str(122), Some("20260127-10:00:00.000"));
    }

    #[tokio::test]
    async fn test_run_carried_across_batches() {
        let store = store_with(&[(1, "D"), (2, "0"), (3, "0"), (4, "1"), (5, "D")]).await;
        let cursor = ReplayCursor::new(session(), Direction::Outbound, 1, 5);
        let mut planner = ReplayPlanner::new(cursor, 9);

        let items = drain(&mut planner, &store, 2).await;
        assert_eq!(shape(&items), vec![(1, None), (2, Some(5)), (5, None)]);
    }

    #[tokio::test]
    async fn test_holes_and_trailing_run() {
        let store = store_with(&[(3, "D"), (5, "5")]).await;
        let cursor = ReplayCursor::new(session(), Direction::Outbound, 1, 6);
        let mut planner = ReplayPlanner::new(cursor, 9);

        let items = drain(&mut planner, &store, 100).await;
        assert_eq!(shape(&items), vec![(1, Some(3)), (3, None), (4, Some(7))]);
    }

    #[tokio::test]
    async fn test_reject_resent_verbatim() {
        let store = store_with(&[(1, "3")]).await;
        let cursor = ReplayCursor::new(session(), Direction::Outbound, 1, 1);
        let mut planner = ReplayPlanner::new(cursor, 9);

        let items = drain(&mut planner, &store, 100).await;
        assert_eq!(shape(&items), vec![(1, None)]);
    }

    #[tokio::test]
    async fn test_unreadable_app_message_fails_instead_of_filling() {
        let store = store_with(&[(1, "0"), (3, "D")]).await;
        store
            .append(&session(), Direction::Outbound, 2, Bytes::from_static(b"8=FIX.4.4\x019=5\x0135=D\x0134=2"))
            .await
            .unwrap();
        let cursor = ReplayCursor::new(session(), Direction::Outbound, 1, 3);
        let mut planner = ReplayPlanner::new(cursor, 9);

        let pool = BufferPool::default();
        let result = planner
            .next_batch(&store, 10, &pool, Timestamp::from_millis(0))
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(planner.remaining(), (2, 3));
    }

    #[tokio::test]
    async fn test_truncated_store_fails() {
        let store = store_with(&[(1, "D"), (2, "D")]).await;
        store.truncate(&session(), Direction::Outbound, 2);
        let cursor = ReplayCursor::new(session(), Direction::Outbound, 1, 2);
        let mut planner = ReplayPlanner::new(cursor, 9);

        let pool = BufferPool::default();
        let result = planner
            .next_batch(&store, 10, &pool, Timestamp::from_millis(0))
            .await;
        assert!(matches!(result, Err(StoreError::RangeNotAvailable { .. })));
    }
}
