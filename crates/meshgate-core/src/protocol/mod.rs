//! Protocol modules (frame envelope + capability manifest).
//!
//! Every frame on the member transport is a JSON text message
//! `{type, payload}`. Parsers are panic-free: malformed input is reported as
//! `MeshError` instead of panicking, keeping the gateway resilient to hostile
//! traffic.

pub mod frame;
pub mod manifest;
