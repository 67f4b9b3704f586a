/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Transport
//!
//! Transport boundary for the Fixline session engine.
//!
//! This crate provides:
//! - **Transport trait**: Outbound half of a connection, with TCP and
//!   in-memory implementations
//! - **FrameReader**: Inbound half yielding complete FIX frames
//! - **Codec**: Tokio codec for FIX message framing with resynchronisation
//! - **Listener**: Accept loop and IP allow-list decorator

pub mod codec;
pub mod listener;
pub mod memory;
pub mod transport;

pub use codec::{CodecError, FixCodec};
pub use listener::{AllowListListener, ConnectionListener, accept_loop};
pub use memory::{ChannelPeer, ChannelTransport};
pub use transport::{ByteSource, FrameReader, TcpTransport, Transport};
