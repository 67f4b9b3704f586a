/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Store
//!
//! Message persistence contract for the Fixline session engine.
//!
//! This crate provides:
//! - **MessageStore trait**: Per-session, per-direction append-only logs and
//!   persisted sequence numbers
//! - **ReplayCursor**: Batched, restartable retrieval of a stored range
//! - **MemoryStore**: In-memory message store for testing and simple use cases

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{Direction, MessageStore, ReplayCursor, SequenceState, StoredMessage};
