/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline
//!
//! A FIX session protocol engine for Rust.
//!
//! Fixline establishes, maintains and recovers FIX sessions over TCP: logon
//! and logout, heartbeats and TestRequests, gap detection with
//! ResendRequest, and replay of stored messages with GapFill.
//!
//! ## Features
//!
//! - **Zero-copy parsing**: Field values reference the original buffer
//! - **Strict ordering**: Out-of-order messages are held until their gap is filled
//! - **Recovery**: Replays are served from a pluggable message store in batches
//! - **Async support**: Built on Tokio, one lock per session
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fixline::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .with_application(MyApplication)
//!     .add_session(
//!         SessionConfig::new(
//!             CompId::new("SENDER").unwrap(),
//!             CompId::new("TARGET").unwrap(),
//!             "FIX.4.4",
//!         )
//!         .with_role(Role::Initiator),
//!     )
//!     .build()
//!     .await?;
//! engine.connect(&session_id, "127.0.0.1:9876".parse()?).await?;
//! ```
//!
//! ## Crate Organization
//!
//! - [`core`]: Fundamental types and error definitions
//! - [`tagvalue`]: Zero-copy tag=value encoding and decoding
//! - [`session`]: Session layer protocol implementation
//! - [`store`]: Message persistence and storage
//! - [`transport`]: Network transport layer
//! - [`engine`]: High-level engine facade

pub mod core {
    //! Core types and error definitions.
    pub use fixline_core::*;
}

pub mod tagvalue {
    //! Zero-copy tag=value encoding and decoding.
    pub use fixline_tagvalue::*;
}

pub mod session {
    //! Session layer protocol implementation.
    pub use fixline_session::*;
}

pub mod store {
    //! Message persistence and storage.
    pub use fixline_store::*;
}

pub mod transport {
    //! Network transport layer.
    pub use fixline_transport::*;
}

pub mod engine {
    //! High-level engine facade.
    pub use fixline_engine::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Core types
    pub use fixline_core::{
        CompId, DecodeError, EncodeError, ErrorClass, FieldRef, FixError, MsgType, OwnedMessage,
        RawMessage, Result, SeqNum, SessionError, SessionId, StoreError, Timestamp,
        TransportError,
    };

    // Tag-value encoding
    pub use fixline_tagvalue::{Decoder, Encoder, calculate_checksum};

    // Session
    pub use fixline_session::{
        Application, Diagnostic, DuplicatePolicy, GapPolicy, NoOpApplication, OutboundMessage,
        RegressionPolicy, RejectReason, ResendFailurePolicy, Role, Session, SessionConfig,
        SessionConfigBuilder, SessionState, StatsSnapshot,
    };

    // Store
    pub use fixline_store::{MemoryStore, MessageStore};

    // Transport
    pub use fixline_transport::{ChannelTransport, FixCodec, TcpTransport, Transport};

    // Engine
    pub use fixline_engine::{Engine, EngineBuilder, UnregisteredPolicy};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_imports() {
        let _seq = SeqNum::new(1);
        let _ts = Timestamp::now();
        let config = SessionConfig::new(
            CompId::new("SENDER").unwrap(),
            CompId::new("TARGET").unwrap(),
            "FIX.4.4",
        );
        assert_eq!(config.session_id().to_string(), "SENDER->TARGET");
    }
}
