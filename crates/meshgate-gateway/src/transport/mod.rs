//! Transport layer (WebSocket).
//!
//! The member endpoint with its pre-upgrade guard and decode-once codec,
//! plus the read-only activity monitor stream.

pub mod codec;
pub mod guard;
pub mod monitor;
pub mod ws;
