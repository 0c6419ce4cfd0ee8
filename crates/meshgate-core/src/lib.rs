//! Wire contracts and records shared by the mesh gateway.
//!
//! Frames and their payloads, the capability manifest with its schema checks,
//! the realm/member/policy model, and `MeshError`. Nothing here touches a
//! socket or a runtime.
//!
//! `unwrap`, `expect` and `panic!` are denied: malformed input always comes
//! back as a `MeshError`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod model;
pub mod protocol;

pub use error::{MeshError, Result};
