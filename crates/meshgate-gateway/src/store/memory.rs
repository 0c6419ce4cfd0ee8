//! In-memory record store.
//!
//! Rows are kept in insertion order so discovery order is stable. The
//! `upsert_*` methods are the administrative surface; the gateway only calls
//! the `RecordStore` trait.

use std::fs;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::model::{Member, MemberStatus, Policy, Realm};
use meshgate_core::protocol::manifest::CapabilityManifest;

use super::RecordStore;

/// Seed document layout.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directory {
    #[serde(default)]
    pub realms: Vec<Realm>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Directory>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_directory(mut dir: Directory) -> Self {
        // Nothing is connected yet.
        for m in &mut dir.members {
            m.status = MemberStatus::Offline;
        }
        Self { inner: RwLock::new(dir) }
    }

    pub fn load_from_file(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)
            .map_err(|e| MeshError::Internal(format!("read store seed failed: {e}")))?;
        Self::load_from_str(&s)
    }

    pub fn load_from_str(s: &str) -> Result<Self> {
        let dir: Directory = serde_yaml::from_str(s)
            .map_err(|e| MeshError::BadRequest(format!("invalid store seed: {e}")))?;
        Ok(Self::from_directory(dir))
    }

    pub fn upsert_realm(&self, realm: Realm) -> Result<()> {
        let mut g = self.write()?;
        match g.realms.iter_mut().find(|r| r.id == realm.id) {
            Some(slot) => *slot = realm,
            None => g.realms.push(realm),
        }
        Ok(())
    }

    pub fn upsert_policy(&self, policy: Policy) -> Result<()> {
        let mut g = self.write()?;
        match g.policies.iter_mut().find(|p| p.name == policy.name) {
            Some(slot) => *slot = policy,
            None => g.policies.push(policy),
        }
        Ok(())
    }

    pub fn upsert_member(&self, member: Member) -> Result<()> {
        let mut g = self.write()?;
        match g.members.iter_mut().find(|m| m.id == member.id) {
            Some(slot) => *slot = member,
            None => g.members.push(member),
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Directory>> {
        self.inner
            .read()
            .map_err(|_| MeshError::Store("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Directory>> {
        self.inner
            .write()
            .map_err(|_| MeshError::Store("memory store lock poisoned".into()))
    }

    fn with_member<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Member),
    {
        let mut g = self.write()?;
        let member = g
            .members
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| MeshError::Store(format!("unknown member: {id}")))?;
        f(member);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn realm_by_id(&self, id: &str) -> Result<Option<Realm>> {
        Ok(self.read()?.realms.iter().find(|r| r.id == id).cloned())
    }

    async fn realm_by_key(&self, realm_key: &str) -> Result<Option<Realm>> {
        Ok(self.read()?.realms.iter().find(|r| r.realm_key == realm_key).cloned())
    }

    async fn policy(&self, name: &str) -> Result<Option<Policy>> {
        Ok(self.read()?.policies.iter().find(|p| p.name == name).cloned())
    }

    async fn member(&self, id: &str) -> Result<Option<Member>> {
        Ok(self.read()?.members.iter().find(|m| m.id == id).cloned())
    }

    async fn online_members(&self) -> Result<Vec<Member>> {
        Ok(self
            .read()?
            .members
            .iter()
            .filter(|m| m.status == MemberStatus::Online)
            .cloned()
            .collect())
    }

    async fn set_member_status(&self, id: &str, status: MemberStatus) -> Result<()> {
        self.with_member(id, |m| m.status = status)
    }

    async fn set_declared_contract(
        &self,
        id: &str,
        contract: CapabilityManifest,
        contract_name: Option<String>,
        contract_version: Option<String>,
    ) -> Result<()> {
        self.with_member(id, |m| {
            m.declared_contract = Some(contract);
            if contract_name.is_some() {
                m.contract_name = contract_name;
            }
            if contract_version.is_some() {
                m.contract_version = contract_version;
            }
        })
    }
}
