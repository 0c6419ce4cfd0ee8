//! meshgate gateway library entry.
//!
//! Wires the record store, policy engine, session registry, routers, and the
//! WebSocket transport into one gateway. Consumed by the binary (`main.rs`)
//! and by integration tests.

pub mod app_state;
pub mod auth;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod realtime;
pub mod router;
pub mod services;
pub mod store;
pub mod transport;
