/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine-wide statistics.
//!
//! Sessions share one `EngineStats` and bump relaxed atomic counters; a
//! snapshot is a plain copy for whoever reports them.

use fixline_core::error::ErrorClass;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide message counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    messages_received: AtomicU64,
    messages_accepted: AtomicU64,
    messages_sent: AtomicU64,
    messages_delivered: AtomicU64,
    messages_resent: AtomicU64,
    gap_fills_sent: AtomicU64,
    resend_requests_sent: AtomicU64,
    duplicates: AtomicU64,
    garbled: AtomicU64,
    rejected: AtomicU64,
    logons: AtomicU64,
    logouts: AtomicU64,
}

/// Point-in-time copy of [`EngineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Frames handed to the pipeline.
    pub messages_received: u64,
    /// Inbound messages accepted in sequence and logged.
    pub messages_accepted: u64,
    /// Frames written to a transport.
    pub messages_sent: u64,
    /// Application messages delivered to the listener.
    pub messages_delivered: u64,
    /// Stored messages retransmitted.
    pub messages_resent: u64,
    /// GapFills sent while serving resend requests.
    pub gap_fills_sent: u64,
    /// ResendRequests sent for inbound gaps.
    pub resend_requests_sent: u64,
    /// Poss-dup messages below the expected sequence.
    pub duplicates: u64,
    /// Messages dropped as garbled.
    pub garbled: u64,
    /// Messages rejected (structural, state, sequencing).
    pub rejected: u64,
    /// Completed logons.
    pub logons: u64,
    /// Completed logouts.
    pub logouts: u64,
}

macro_rules! counter {
    ($name:ident, $field:ident) => {
        #[doc = concat!("Increments `", stringify!($field), "`.")]
        #[inline]
        pub fn $name(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl EngineStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    counter!(record_received, messages_received);
    counter!(record_accepted, messages_accepted);
    counter!(record_sent, messages_sent);
    counter!(record_delivered, messages_delivered);
    counter!(record_resent, messages_resent);
    counter!(record_gap_fill, gap_fills_sent);
    counter!(record_resend_request, resend_requests_sent);
    counter!(record_duplicate, duplicates);
    counter!(record_logon, logons);
    counter!(record_logout, logouts);

    /// Counts a discarded or rejected inbound message by class.
    pub fn record_error(&self, class: ErrorClass) {
        match class {
            ErrorClass::Garbled => self.garbled.fetch_add(1, Ordering::Relaxed),
            _ => self.rejected.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Copies the counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_accepted: self.messages_accepted.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            messages_resent: self.messages_resent.load(Ordering::Relaxed),
            gap_fills_sent: self.gap_fills_sent.load(Ordering::Relaxed),
            resend_requests_sent: self.resend_requests_sent.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            garbled: self.garbled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            logons: self.logons.load(Ordering::Relaxed),
            logouts: self.logouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = EngineStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_delivered();
        stats.record_error(ErrorClass::Garbled);
        stats.record_error(ErrorClass::Structural);

        let snap = stats.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.messages_delivered, 1);
        assert_eq!(snap.garbled, 1);
        assert_eq!(snap.rejected, 1);
        assert_eq!(snap.logons, 0);
    }
}
