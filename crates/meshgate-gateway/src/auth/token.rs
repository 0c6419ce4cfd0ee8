//! HS256 session token verification.
//!
//! The token is minted by the auth collaborator and passed as the `token`
//! query parameter on the gateway endpoint. Only signature and expiry are
//! checked here; membership is checked against the store during admission.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use meshgate_core::error::{MeshError, Result};

use crate::config::AuthSection;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    pub member_id: String,
    pub realm_id: String,
    /// Expiry (unix seconds).
    pub exp: u64,
}

pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(cfg: &AuthSection) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = cfg.leeway_secs;
        validation.validate_exp = true;
        Self {
            key: DecodingKey::from_secret(cfg.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let data = decode::<SessionClaims>(token, &self.key, &self.validation)
            .map_err(|e| MeshError::Admission(format!("invalid session token: {e}")))?;
        let claims = data.claims;
        if claims.member_id.is_empty() || claims.realm_id.is_empty() {
            return Err(MeshError::Admission("session token lacks member or realm".into()));
        }
        Ok(claims)
    }
}
