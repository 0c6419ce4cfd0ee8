//! Session token validation (issuance lives elsewhere).

pub mod token;

pub use token::{SessionClaims, TokenVerifier};
