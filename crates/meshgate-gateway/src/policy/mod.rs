//! Policy layer (capability-access evaluation).
//!
//! Realm-hierarchy-aware, first-match-allow / implicit-deny evaluation over
//! the policies attached to the source realm and, when inheritance is on, to
//! its ancestors.

pub mod engine;
pub mod pattern;

pub use engine::{AccessContext, AccessDecision, PolicyEngine, MAX_REALM_DEPTH};
