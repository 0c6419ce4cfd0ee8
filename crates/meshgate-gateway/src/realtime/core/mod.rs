//! Realtime core components for the gateway runtime.
//!
//! Session registry, pending-request table, and the egress runtime/context
//! shared across frame handlers.

mod pending;
mod realtime;
mod session_registry;

pub use pending::{CallKey, PendingEntry, PendingRequests};
pub use realtime::{MeshCore, RouteCtx};
pub use session_registry::{CloseReason, Session, SessionRegistry};
