//! Record store seam.
//!
//! Realm, member, and policy rows live in an external, independently
//! consistent store. Every call may suspend on I/O; callers must not hold
//! session-wide locks across these awaits. Nothing here is cached across
//! requests by the gateway.

pub mod memory;

use async_trait::async_trait;

use meshgate_core::error::Result;
use meshgate_core::model::{Member, MemberStatus, Policy, Realm};
use meshgate_core::protocol::manifest::CapabilityManifest;

pub use memory::MemoryStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn realm_by_id(&self, id: &str) -> Result<Option<Realm>>;
    async fn realm_by_key(&self, realm_key: &str) -> Result<Option<Realm>>;
    async fn policy(&self, name: &str) -> Result<Option<Policy>>;
    async fn member(&self, id: &str) -> Result<Option<Member>>;

    /// Members currently marked `online`, in store order.
    async fn online_members(&self) -> Result<Vec<Member>>;

    async fn set_member_status(&self, id: &str, status: MemberStatus) -> Result<()>;
    async fn set_declared_contract(
        &self,
        id: &str,
        contract: CapabilityManifest,
        contract_name: Option<String>,
        contract_version: Option<String>,
    ) -> Result<()>;
}
