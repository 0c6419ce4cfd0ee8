//! Pre-upgrade admission: token -> (member, realm).

use std::sync::Arc;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::model::{Member, Realm};

use crate::auth::TokenVerifier;
use crate::store::RecordStore;

/// Identity established before the transport is upgraded.
#[derive(Debug, Clone)]
pub struct Admitted {
    pub member: Member,
    pub realm: Realm,
}

pub struct Admission {
    verifier: TokenVerifier,
    store: Arc<dyn RecordStore>,
}

impl Admission {
    pub fn new(verifier: TokenVerifier, store: Arc<dyn RecordStore>) -> Self {
        Self { verifier, store }
    }

    /// Validate the token and check that its member exists and belongs to
    /// the realm it names. Every failure is `MeshError::Admission` except
    /// store faults, which surface as `MeshError::Store`.
    pub async fn admit(&self, token: Option<&str>) -> Result<Admitted> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MeshError::Admission("missing session token".into()))?;
        let claims = self.verifier.verify(token)?;

        let member = self
            .store
            .member(&claims.member_id)
            .await?
            .ok_or_else(|| MeshError::Admission(format!("unknown member {}", claims.member_id)))?;
        let realm = self
            .store
            .realm_by_id(&claims.realm_id)
            .await?
            .ok_or_else(|| MeshError::Admission(format!("unknown realm {}", claims.realm_id)))?;

        if member.realm_id != realm.id {
            return Err(MeshError::Admission(format!(
                "member {} does not belong to realm {}",
                member.id, realm.id
            )));
        }

        Ok(Admitted { member, realm })
    }
}
