/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # fixline Core
//!
//! Core types and error definitions shared by every fixline crate:
//! - **Error types**: the error taxonomy of the session engine, built on `thiserror`
//! - **Field types**: `FieldRef` for zero-copy views, `Field` for composition
//! - **Message types**: `RawMessage`, `OwnedMessage` and `MsgType`
//! - **Core types**: `SeqNum`, `Timestamp`, `CompId`, `SessionId`
//! - **Tags**: header, trailer and session-message tag numbers

pub mod error;
pub mod field;
pub mod message;
pub mod tags;
pub mod types;

pub use error::{
    DecodeError, EncodeError, ErrorClass, FixError, Result, SessionError, StoreError,
    TransportError,
};
pub use field::{Field, FieldRef};
pub use message::{MsgType, OwnedMessage, RawMessage};
pub use types::{CompId, SeqNum, SessionId, Timestamp};
