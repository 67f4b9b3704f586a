/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Engine
//!
//! High-level FIX engine hosting sessions over TCP.
//!
//! This crate provides:
//! - **Initiator**: `Engine::connect` opens a connection and logs on
//! - **Acceptor**: `Engine::serve` accepts connections and binds them on the first Logon
//! - **Registry**: Known sessions, live connections and the unregistered-session policy
//! - **Builder API**: Fluent configuration for engine setup

pub mod builder;
pub mod engine;
pub mod registry;

pub use builder::EngineBuilder;
pub use engine::Engine;
pub use registry::{SessionRegistry, UnregisteredPolicy};
