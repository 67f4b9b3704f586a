/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Gap detection and inbound recovery bookkeeping.
//!
//! [`GapTracker`] remembers which inbound ranges have been requested from the
//! peer, holds messages that arrived ahead of a gap, and decides which of
//! them can be released as the ledger advances.

use fixline_core::message::OwnedMessage;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// EndSeqNo meaning "through the latest" in FIX 4.0 and 4.1.
pub const LEGACY_INFINITY: u64 = 999_999;

/// Inclusive range of sequence numbers awaiting retransmission.
///
/// `end == 0` means open ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResendRange {
    /// First sequence number.
    pub begin: u64,
    /// Last sequence number, or 0 for "through the latest".
    pub end: u64,
}

impl ResendRange {
    /// Creates a range.
    #[must_use]
    pub const fn new(begin: u64, end: u64) -> Self {
        Self { begin, end }
    }

    /// Builds a range from a received ResendRequest, mapping the FIX 4.0/4.1
    /// infinity sentinel to 0.
    #[must_use]
    pub fn from_request(begin: u64, end: u64, begin_string: &str) -> Self {
        let legacy = matches!(begin_string, "FIX.4.0" | "FIX.4.1");
        let end = if legacy && end == LEGACY_INFINITY { 0 } else { end };
        Self { begin, end }
    }

    /// Returns true for an open-ended range.
    #[must_use]
    pub const fn is_open_ended(&self) -> bool {
        self.end == 0
    }

    /// Returns true if `seq` falls inside the range.
    #[must_use]
    pub const fn contains(&self, seq: u64) -> bool {
        seq >= self.begin && (self.end == 0 || seq <= self.end)
    }

    /// Resolves an open end against the last sequence number available.
    #[must_use]
    pub fn resolve(&self, last: u64) -> Self {
        let end = if self.end == 0 || self.end > last {
            last
        } else {
            self.end
        };
        Self::new(self.begin, end)
    }
}

impl fmt::Display for ResendRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.end == 0 {
            write!(f, "[{}, ∞)", self.begin)
        } else {
            write!(f, "[{}, {}]", self.begin, self.end)
        }
    }
}

#[derive(Debug, Clone)]
struct Outstanding {
    range: ResendRange,
    requested_at: Instant,
}

/// Inbound gap bookkeeping for one session.
#[derive(Debug, Default)]
pub struct GapTracker {
    /// Ranges requested from the peer and not yet satisfied, ascending.
    outstanding: Vec<Outstanding>,
    /// Highest sequence number already requested or received ahead.
    covered_through: u64,
    /// Messages held until the gap before them closes.
    buffered: BTreeMap<u64, OwnedMessage>,
    /// Sequence numbers already delivered ahead of a gap.
    delivered_ahead: BTreeSet<u64>,
}

impl GapTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a gap revealed by `received` while `expected` was due.
    ///
    /// Returns the range to request, or `None` if everything missing is
    /// already requested. Repeated triggers therefore request nothing new.
    pub fn on_gap(&mut self, expected: u64, received: u64, now: Instant) -> Option<ResendRange> {
        let begin = expected.max(self.covered_through + 1);
        let end = received.saturating_sub(1);
        self.covered_through = self.covered_through.max(received);
        if begin > end {
            return None;
        }
        let range = ResendRange::new(begin, end);
        debug!(%range, "gap recorded");
        self.outstanding.push(Outstanding {
            range,
            requested_at: now,
        });
        Some(range)
    }

    /// Holds a message received ahead of a gap.
    pub fn buffer(&mut self, seq: u64, message: OwnedMessage) {
        self.buffered.insert(seq, message);
    }

    /// Marks a message as delivered ahead of a gap.
    pub fn mark_delivered_ahead(&mut self, seq: u64) {
        self.delivered_ahead.insert(seq);
    }

    /// Removes and returns the buffered message for `seq`, if any.
    pub fn take_buffered(&mut self, seq: u64) -> Option<OwnedMessage> {
        self.buffered.remove(&seq)
    }

    /// Returns true, forgetting it, if `seq` was already delivered ahead.
    pub fn take_delivered_ahead(&mut self, seq: u64) -> bool {
        self.delivered_ahead.remove(&seq)
    }

    /// Returns true if `seq` is buffered or was delivered ahead.
    #[must_use]
    pub fn holds(&self, seq: u64) -> bool {
        self.buffered.contains_key(&seq) || self.delivered_ahead.contains(&seq)
    }

    /// Closes ranges the ledger has passed and drops stale held entries.
    pub fn on_advance(&mut self, next_inbound: u64) {
        self.outstanding.retain(|o| o.range.end >= next_inbound);
        self.buffered = self.buffered.split_off(&next_inbound);
        self.delivered_ahead = self.delivered_ahead.split_off(&next_inbound);
    }

    /// Abandons every outstanding range and held message.
    ///
    /// Returns the abandoned ranges.
    pub fn abandon(&mut self) -> Vec<ResendRange> {
        self.covered_through = 0;
        self.buffered.clear();
        self.delivered_ahead.clear();
        self.outstanding.drain(..).map(|o| o.range).collect()
    }

    /// Returns the oldest range outstanding for longer than `timeout`.
    #[must_use]
    pub fn expired(&self, now: Instant, timeout: Duration) -> Option<ResendRange> {
        self.outstanding
            .iter()
            .find(|o| now.saturating_duration_since(o.requested_at) >= timeout)
            .map(|o| o.range)
    }

    /// Returns true while any range is outstanding.
    #[must_use]
    pub fn is_recovering(&self) -> bool {
        !self.outstanding.is_empty()
    }

    /// Returns the outstanding ranges in ascending order.
    pub fn outstanding(&self) -> impl Iterator<Item = ResendRange> + '_ {
        self.outstanding.iter().map(|o| o.range)
    }

    /// Returns the number of buffered messages.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.buffered.len()
    }
}
