/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session lifecycle state machine.
//!
//! The state lives inside the session and changes in response to network
//! events, so it is a runtime value. Every transition is checked against the
//! table in [`SessionState::can_transition_to`]; every inbound message is
//! checked against [`SessionState::admits`] before it reaches the pipeline.

use fixline_core::error::SessionError;
use fixline_core::message::MsgType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::info;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No transport. Initial and terminal.
    #[default]
    Disconnected,
    /// Transport attached, no Logon exchanged yet.
    Connecting,
    /// Initiator sent its Logon and awaits the answer.
    LogonSent,
    /// Acceptor validated the peer's Logon and is answering it.
    LogonReceived,
    /// Initiator validated the answer and is arming post-logon recovery.
    LogonPending,
    /// Logged on; application traffic flows.
    Active,
    /// Logout sent, awaiting the echo.
    LogoutSent,
    /// Closing the transport.
    Disconnecting,
}

impl SessionState {
    /// Returns true if `next` is a legal successor of this state.
    ///
    /// Dropping to `Disconnected` is always legal.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{
            Active, Connecting, Disconnected, Disconnecting, LogonPending, LogonReceived,
            LogonSent, LogoutSent,
        };
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, LogonSent | LogonReceived | Disconnecting)
                | (LogonSent, LogonPending | Disconnecting)
                | (LogonReceived, Active | Disconnecting)
                | (LogonPending, Active | Disconnecting)
                | (Active, LogoutSent | Disconnecting)
                | (LogoutSent, Disconnecting)
        )
    }

    /// Returns true if an inbound message of `msg_type` may enter the pipeline.
    #[must_use]
    pub fn admits(self, msg_type: &MsgType) -> bool {
        match self {
            Self::Disconnected => false,
            Self::Connecting => matches!(msg_type, MsgType::Logon | MsgType::Logout),
            Self::LogonSent => {
                matches!(msg_type, MsgType::Logon | MsgType::Logout | MsgType::Reject)
            }
            Self::LogonReceived | Self::LogonPending | Self::Active | Self::LogoutSent => {
                *msg_type != MsgType::Logon
            }
            Self::Disconnecting => *msg_type == MsgType::Logout,
        }
    }

    /// Returns true while a Logon has been exchanged and not yet torn down.
    #[must_use]
    pub const fn is_logged_on(self) -> bool {
        matches!(self, Self::Active | Self::LogoutSent)
    }

    /// Returns true if application messages may be transmitted.
    #[must_use]
    pub const fn can_send_app(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::LogonSent => "LogonSent",
            Self::LogonReceived => "LogonReceived",
            Self::LogonPending => "LogonPending",
            Self::Active => "Active",
            Self::LogoutSent => "LogoutSent",
            Self::Disconnecting => "Disconnecting",
        };
        f.write_str(s)
    }
}

/// Current state plus the time it was entered.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: SessionState,
    entered_at: Instant,
}

impl StateMachine {
    /// Creates a machine in `Disconnected`.
    #[must_use]
    pub fn new(now: Instant) -> Self {
        Self {
            state: SessionState::Disconnected,
            entered_at: now,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns when the current state was entered.
    #[inline]
    #[must_use]
    pub const fn entered_at(&self) -> Instant {
        self.entered_at
    }

    /// Moves to `next`.
    ///
    /// # Errors
    /// Returns `SessionError::InvalidState` if the transition is not legal.
    pub fn transition(&mut self, next: SessionState, now: Instant) -> Result<(), SessionError> {
        if self.state == next {
            return Ok(());
        }
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidState {
                expected: format!("a predecessor of {next}"),
                current: self.state.to_string(),
            });
        }
        info!(from = %self.state, to = %next, "session state change");
        self.state = next;
        self.entered_at = now;
        Ok(())
    }

    /// Checks that an inbound message is admissible now.
    ///
    /// # Errors
    /// Returns `SessionError::UnexpectedMessage` otherwise.
    pub fn gate(&self, msg_type: &MsgType) -> Result<(), SessionError> {
        if self.state.admits(msg_type) {
            Ok(())
        } else {
            Err(SessionError::UnexpectedMessage {
                msg_type: msg_type.to_string(),
                state: self.state.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;
    use super::*;

    #[test]
    fn test_acceptor_path() {
        let now = Instant::now();
        let mut sm = StateMachine::new(now);
        for next in [Connecting, LogonReceived, Active, LogoutSent, Disconnecting, Disconnected] {
            sm.transition(next, now).unwrap();
        }
        assert_eq!(sm.state(), Disconnected);
    }

    #[test]
    fn test_initiator_path() {
        let now = Instant::now();
        let mut sm = StateMachine::new(now);
        for next in [Connecting, LogonSent, LogonPending, Active] {
            sm.transition(next, now).unwrap();
        }
        assert!(sm.state().is_logged_on());
    }

    #[test]
    fn test_illegal_transitions() {
        let now = Instant::now();
        let mut sm = StateMachine::new(now);
        assert!(sm.transition(Active, now).is_err());
        sm.transition(Connecting, now).unwrap();
        assert!(sm.transition(Active, now).is_err());
        assert!(sm.transition(LogonPending, now).is_err());
        assert!(!LogonSent.can_transition_to(LogonReceived));
        assert!(Active.can_transition_to(Disconnected));
    }

    #[test]
    fn test_gate() {
        let app = MsgType::App("D".into());
        assert!(!Disconnected.admits(&MsgType::Logon));
        assert!(Connecting.admits(&MsgType::Logon));
        assert!(!Connecting.admits(&app));
        assert!(!Connecting.admits(&MsgType::Heartbeat));
        assert!(LogonSent.admits(&MsgType::Reject));
        assert!(!LogonSent.admits(&MsgType::ResendRequest));
        assert!(Active.admits(&app));
        assert!(!Active.admits(&MsgType::Logon));
        assert!(Disconnecting.admits(&MsgType::Logout));
        assert!(!Disconnecting.admits(&app));

        let sm = StateMachine::new(Instant::now());
        assert!(matches!(
            sm.gate(&app),
            Err(SessionError::UnexpectedMessage { .. })
        ));
    }
}
