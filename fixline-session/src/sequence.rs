/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Sequence number ledger.
//!
//! This module provides atomic sequence number management for FIX sessions.

use fixline_core::types::SeqNum;
use fixline_store::SequenceState;
use std::sync::atomic::{AtomicU64, Ordering};

/// Inbound and outbound sequence counters of one session.
///
/// Mutation happens under the session lock; the atomics let statistics and
/// diagnostics read the counters without taking it.
#[derive(Debug)]
pub struct SequenceLedger {
    /// Next outgoing sequence number.
    next_outbound: AtomicU64,
    /// Next expected incoming sequence number.
    next_inbound: AtomicU64,
}

impl SequenceLedger {
    /// Creates a new ledger with sequence numbers starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::from_state(SequenceState::default())
    }

    /// Creates a ledger resuming from persisted sequence numbers.
    #[must_use]
    pub fn from_state(state: SequenceState) -> Self {
        Self {
            next_outbound: AtomicU64::new(state.next_outbound),
            next_inbound: AtomicU64::new(state.next_inbound),
        }
    }

    /// Returns the current counters for persistence.
    #[must_use]
    pub fn snapshot(&self) -> SequenceState {
        SequenceState {
            next_outbound: self.next_outbound.load(Ordering::SeqCst),
            next_inbound: self.next_inbound.load(Ordering::SeqCst),
        }
    }

    /// Returns the next outbound sequence number without incrementing.
    #[inline]
    #[must_use]
    pub fn next_outbound(&self) -> SeqNum {
        SeqNum::new(self.next_outbound.load(Ordering::SeqCst))
    }

    /// Returns the next expected inbound sequence number.
    #[inline]
    #[must_use]
    pub fn next_inbound(&self) -> SeqNum {
        SeqNum::new(self.next_inbound.load(Ordering::SeqCst))
    }

    /// Allocates and returns the next outbound sequence number.
    #[inline]
    pub fn allocate_outbound(&self) -> SeqNum {
        SeqNum::new(self.next_outbound.fetch_add(1, Ordering::SeqCst))
    }

    /// Accepts `seq` if it is exactly the expected inbound number.
    ///
    /// Returns false, leaving the ledger untouched, otherwise.
    #[inline]
    pub fn accept_inbound(&self, seq: u64) -> bool {
        self.next_inbound
            .compare_exchange(seq, seq + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Moves the expected inbound number forward to `next`.
    ///
    /// Returns false if `next` would move it backwards.
    #[inline]
    pub fn advance_inbound_to(&self, next: u64) -> bool {
        self.next_inbound.fetch_max(next, Ordering::SeqCst) <= next
    }

    /// Sets the next outbound sequence number.
    #[inline]
    pub fn set_next_outbound(&self, seq: u64) {
        self.next_outbound.store(seq, Ordering::SeqCst);
    }

    /// Sets the next expected inbound sequence number unconditionally.
    #[inline]
    pub fn set_next_inbound(&self, seq: u64) {
        self.next_inbound.store(seq, Ordering::SeqCst);
    }

    /// Resets both sequence numbers to 1.
    #[inline]
    pub fn reset(&self) {
        self.next_outbound.store(1, Ordering::SeqCst);
        self.next_inbound.store(1, Ordering::SeqCst);
    }

    /// Classifies an incoming sequence number against the expected one.
    #[must_use]
    pub fn check(&self, received: u64) -> SequenceCheck {
        let expected = self.next_inbound.load(Ordering::SeqCst);

        if received == expected {
            SequenceCheck::Ok
        } else if received < expected {
            SequenceCheck::TooLow { expected, received }
        } else {
            SequenceCheck::Gap { expected, received }
        }
    }
}

impl Default for SequenceLedger {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of sequence number validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceCheck {
    /// Sequence number is as expected.
    Ok,
    /// Sequence number is lower than expected (duplicate or regression).
    TooLow {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
    /// Sequence number is higher than expected (gap detected).
    Gap {
        /// Expected sequence number.
        expected: u64,
        /// Received sequence number.
        received: u64,
    },
}

impl SequenceCheck {
    /// Returns true if the sequence is valid.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Returns true if there's a gap.
    #[must_use]
    pub const fn is_gap(&self) -> bool {
        matches!(self, Self::Gap { .. })
    }

    /// Returns true if the sequence is too low.
    #[must_use]
    pub const fn is_too_low(&self) -> bool {
        matches!(self, Self::TooLow { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_new() {
        let ledger = SequenceLedger::new();
        assert_eq!(ledger.next_outbound().value(), 1);
        assert_eq!(ledger.next_inbound().value(), 1);
    }

    #[test]
    fn test_allocate_outbound() {
        let ledger = SequenceLedger::new();

        assert_eq!(ledger.allocate_outbound().value(), 1);
        assert_eq!(ledger.allocate_outbound().value(), 2);
        assert_eq!(ledger.next_outbound().value(), 3);
    }

    #[test]
    fn test_accept_inbound_only_in_order() {
        let ledger = SequenceLedger::new();

        assert!(ledger.accept_inbound(1));
        assert!(!ledger.accept_inbound(1));
        assert!(!ledger.accept_inbound(3));
        assert_eq!(ledger.next_inbound().value(), 2);
        assert!(ledger.accept_inbound(2));
        assert_eq!(ledger.next_inbound().value(), 3);
    }

    #[test]
    fn test_advance_never_regresses() {
        let ledger = SequenceLedger::from_state(SequenceState {
            next_outbound: 1,
            next_inbound: 10,
        });

        assert!(ledger.advance_inbound_to(15));
        assert_eq!(ledger.next_inbound().value(), 15);
        assert!(!ledger.advance_inbound_to(12));
        assert_eq!(ledger.next_inbound().value(), 15);
    }

    #[test]
    fn test_check() {
        let ledger = SequenceLedger::new();

        assert!(ledger.check(1).is_ok());

        ledger.set_next_inbound(5);
        assert!(ledger.check(4).is_too_low());
        assert!(ledger.check(5).is_ok());
        assert_eq!(
            ledger.check(10),
            SequenceCheck::Gap {
                expected: 5,
                received: 10
            }
        );
    }

    #[test]
    fn test_snapshot_and_reset() {
        let state = SequenceState {
            next_outbound: 100,
            next_inbound: 200,
        };
        let ledger = SequenceLedger::from_state(state);
        assert_eq!(ledger.snapshot(), state);

        ledger.reset();
        assert_eq!(ledger.snapshot(), SequenceState::default());
    }
}
