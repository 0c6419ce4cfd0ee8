//! Realtime runtime (egress engine) for the mesh gateway.
//!
//! Session registry, pending service requests, and QoS-based delivery helpers
//! shared by the routers.

pub mod core;
pub mod types;

pub use self::core::{CallKey, CloseReason, MeshCore, PendingEntry, PendingRequests, RouteCtx, Session, SessionRegistry};
pub use types::{PreparedMsg, QoS};
