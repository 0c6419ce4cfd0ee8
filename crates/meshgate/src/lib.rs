//! Facade crate for meshgate.
//!
//! One dependency for the protocol types and the gateway library.

pub mod core {
    pub use meshgate_core::*;
}

pub mod gateway {
    pub use meshgate_gateway::*;
}

pub use meshgate_core::{MeshError, Result};
