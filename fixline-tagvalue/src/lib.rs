/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! # Fixline Tag-Value
//!
//! Zero-copy FIX tag=value encoding and decoding for the Fixline engine.
//!
//! This crate provides parsing and serialization of FIX messages using the
//! standard tag=value format with SOH (0x01) delimiters.
//!
//! ## Features
//!
//! - **Zero-copy parsing**: Field values reference the original buffer
//! - **Data fields**: Length-prefixed values may contain SOH
//! - **Resend rewrite**: PossDup/OrigSendingTime stamping with fresh trailer

pub mod checksum;
pub mod data;
pub mod decoder;
pub mod encoder;
pub mod rewrite;

pub use checksum::{calculate_checksum, verify_trailer};
pub use data::{data_tag_for, length_tag_for};
pub use decoder::{Decoder, peek_msg_type};
pub use encoder::{Encoder, SOH};
pub use fixline_core::message::RawMessage;
pub use rewrite::{rewrite_for_resend, rewrite_into};
