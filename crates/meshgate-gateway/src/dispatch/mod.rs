//! Dispatcher module exports.
//!
//! Re-exports the dispatcher and the handler trait so routers can register
//! themselves without reaching into submodules.

pub mod dispatcher;

pub use dispatcher::{Dispatcher, FrameHandler};
