/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Heartbeat and TestRequest management.
//!
//! This module handles FIX session heartbeat logic including:
//! - Sending heartbeats when the link has been idle for one interval
//! - Sending a single TestRequest after `interval + tolerance` of silence
//! - Declaring a timeout when the grace period after the TestRequest expires
//!
//! All checks take the current `Instant` explicitly so timer behaviour is
//! deterministic under test.

use std::time::{Duration, Instant};

/// What the session should do after a heartbeat poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing is due.
    None,
    /// The link has been idle outbound for one interval.
    SendHeartbeat,
    /// Inbound silence exceeded the tolerance; send this TestReqID.
    SendTestRequest(String),
    /// The TestRequest went unanswered for the grace period.
    Timeout {
        /// Silence since the last inbound message.
        silence: Duration,
    },
}

/// Tracks heartbeat timing for a FIX session.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    /// Heartbeat interval.
    interval: Duration,
    /// Extra silence tolerated before a TestRequest.
    tolerance: Duration,
    /// Silence tolerated after the TestRequest.
    grace: Duration,
    /// Time of last message sent.
    last_sent: Instant,
    /// Time of last message received.
    last_received: Instant,
    /// Pending TestRequest ID, if any.
    test_request_pending: Option<String>,
    /// Time when TestRequest was sent.
    test_request_sent_at: Option<Instant>,
    /// TestRequests sent over the session's lifetime.
    test_requests_sent: u64,
}

impl HeartbeatMonitor {
    /// Creates a new monitor.
    #[must_use]
    pub fn new(interval: Duration, tolerance: Duration, grace: Duration, now: Instant) -> Self {
        Self {
            interval,
            tolerance,
            grace,
            last_sent: now,
            last_received: now,
            test_request_pending: None,
            test_request_sent_at: None,
            test_requests_sent: 0,
        }
    }

    /// Records that a message was sent.
    #[inline]
    pub fn on_message_sent(&mut self, now: Instant) {
        self.last_sent = now;
    }

    /// Records that a message was received.
    ///
    /// Any inbound traffic ends the silence, so a pending TestRequest is
    /// considered answered.
    pub fn on_message_received(&mut self, now: Instant) {
        self.last_received = now;
        self.test_request_pending = None;
        self.test_request_sent_at = None;
    }

    /// Decides what is due at `now`, recording a TestRequest if one is issued.
    ///
    /// At most one TestRequest is issued per silence episode.
    pub fn poll(&mut self, now: Instant) -> HeartbeatAction {
        if self.interval.is_zero() {
            return HeartbeatAction::None;
        }

        let silence = now.saturating_duration_since(self.last_received);
        if let Some(sent_at) = self.test_request_sent_at {
            if now.saturating_duration_since(sent_at) >= self.grace {
                return HeartbeatAction::Timeout { silence };
            }
        } else if silence >= self.interval + self.tolerance {
            self.test_requests_sent += 1;
            let id = format!("TEST{}", self.test_requests_sent);
            self.test_request_pending = Some(id.clone());
            self.test_request_sent_at = Some(now);
            return HeartbeatAction::SendTestRequest(id);
        }

        if now.saturating_duration_since(self.last_sent) >= self.interval {
            return HeartbeatAction::SendHeartbeat;
        }
        HeartbeatAction::None
    }

    /// Returns the pending TestRequest ID, if any.
    #[must_use]
    pub fn pending_test_request(&self) -> Option<&str> {
        self.test_request_pending.as_deref()
    }

    /// Returns the number of TestRequests issued so far.
    #[must_use]
    pub const fn test_requests_sent(&self) -> u64 {
        self.test_requests_sent
    }

    /// Returns the heartbeat interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Adopts a negotiated heartbeat interval.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Returns when the next poll could produce an action.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.interval.is_zero() {
            return None;
        }
        let heartbeat = self.last_sent + self.interval;
        let silence = match self.test_request_sent_at {
            Some(sent_at) => sent_at + self.grace,
            None => self.last_received + self.interval + self.tolerance,
        };
        Some(heartbeat.min(silence))
    }

    /// Restarts timing from `now`.
    pub fn reset(&mut self, now: Instant) {
        self.last_sent = now;
        self.last_received = now;
        self.test_request_pending = None;
        self.test_request_sent_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(start: Instant) -> HeartbeatMonitor {
        HeartbeatMonitor::new(
            Duration::from_secs(30),
            Duration::from_secs(2),
            Duration::from_secs(10),
            start,
        )
    }

    #[test]
    fn test_heartbeat_due_when_idle() {
        let start = Instant::now();
        let mut hb = monitor(start);

        hb.on_message_received(start + Duration::from_secs(29));
        assert_eq!(hb.poll(start + Duration::from_secs(29)), HeartbeatAction::None);
        assert_eq!(
            hb.poll(start + Duration::from_secs(30)),
            HeartbeatAction::SendHeartbeat
        );

        hb.on_message_sent(start + Duration::from_secs(30));
        assert_eq!(hb.poll(start + Duration::from_secs(31)), HeartbeatAction::None);
    }

    #[test]
    fn test_single_test_request_then_timeout() {
        let start = Instant::now();
        let mut hb = monitor(start);
        hb.on_message_sent(start + Duration::from_secs(25));

        let at = start + Duration::from_secs(32);
        assert_eq!(
            hb.poll(at),
            HeartbeatAction::SendTestRequest("TEST1".to_string())
        );
        assert_eq!(hb.pending_test_request(), Some("TEST1"));
        hb.on_message_sent(at);

        for secs in 33..42 {
            let action = hb.poll(start + Duration::from_secs(secs));
            assert!(!matches!(action, HeartbeatAction::SendTestRequest(_)));
            assert!(!matches!(action, HeartbeatAction::Timeout { .. }));
        }
        assert_eq!(hb.test_requests_sent(), 1);

        assert_eq!(
            hb.poll(start + Duration::from_secs(42)),
            HeartbeatAction::Timeout {
                silence: Duration::from_secs(42)
            }
        );
    }

    #[test]
    fn test_inbound_traffic_answers_test_request() {
        let start = Instant::now();
        let mut hb = monitor(start);

        assert!(matches!(
            hb.poll(start + Duration::from_secs(32)),
            HeartbeatAction::SendTestRequest(_)
        ));
        hb.on_message_received(start + Duration::from_secs(33));
        assert!(hb.pending_test_request().is_none());
        hb.on_message_sent(start + Duration::from_secs(33));
        assert_eq!(hb.poll(start + Duration::from_secs(50)), HeartbeatAction::None);
    }

    #[test]
    fn test_next_deadline() {
        let start = Instant::now();
        let hb = monitor(start);
        assert_eq!(hb.next_deadline(), Some(start + Duration::from_secs(30)));

        let mut disabled = monitor(start);
        disabled.set_interval(Duration::ZERO);
        assert_eq!(disabled.next_deadline(), None);
        assert_eq!(disabled.poll(start + Duration::from_secs(999)), HeartbeatAction::None);
    }
}
