/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Session
//!
//! FIX session layer for the Fixline engine.
//!
//! This crate provides:
//! - **State machine**: Session lifecycle with a checked transition table and state gate
//! - **Sequence ledger**: Atomic inbound and outbound sequence numbers
//! - **Heartbeat handling**: Heartbeat, TestRequest escalation and timeouts
//! - **Recovery**: Gap detection, ResendRequest, replay with GapFill
//! - **Pipeline**: Ordered inbound handler stages
//! - **Configuration**: Session configuration and recovery policies

pub mod admin;
pub mod application;
pub mod config;
pub mod exchange;
mod handlers;
pub mod heartbeat;
pub mod outbound;
pub mod pipeline;
pub mod pool;
pub mod replay;
pub mod resend;
pub mod sequence;
pub mod session;
pub mod state;
pub mod stats;

#[cfg(test)]
mod testing;

pub use admin::AdminMessage;
pub use application::{Application, Diagnostic, NoOpApplication, RejectReason};
pub use config::{
    DuplicatePolicy, GapPolicy, RegressionPolicy, ResendFailurePolicy, Role, SessionConfig,
    SessionConfigBuilder,
};
pub use exchange::Exchange;
pub use heartbeat::{HeartbeatAction, HeartbeatMonitor};
pub use outbound::OutboundMessage;
pub use pipeline::{
    DataLengthStage, DeliveryStage, Flow, GarbledStage, Inbound, PerTypeStage, Pipeline,
    PostProcessStage, Stage,
};
pub use pool::BufferPool;
pub use resend::{GapTracker, ResendRange};
pub use sequence::{SequenceCheck, SequenceLedger};
pub use session::Session;
pub use state::{SessionState, StateMachine};
pub use stats::{EngineStats, StatsSnapshot};
