//! Record model shared by the gateway and its record store.
//!
//! Realms, members, and policies are owned by the administrative collaborator;
//! the gateway reads them and only mutates a member's `status` and
//! `declared_contract`. Field names follow the camelCase JSON/YAML layout the
//! store persists.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MeshError, Result};
use crate::protocol::manifest::CapabilityManifest;

/// Policy type implemented by the gateway's policy engine.
pub const CAPABILITY_ACCESS: &str = "capability-access";

/// Hierarchical namespace / tenant boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Realm {
    /// Opaque identifier (UUID in practice).
    pub id: String,
    /// Human-readable dotted name, unique.
    pub realm_key: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Policy names attached directly to this realm, in evaluation order.
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub inherit_policies: bool,
}

/// Member connection status as recorded in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Online,
    #[default]
    Offline,
    Error,
}

impl MemberStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberStatus::Online => "online",
            MemberStatus::Offline => "offline",
            MemberStatus::Error => "error",
        }
    }
}

/// Authenticated client entity (`<realmKey>/<name>` by convention).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub realm_id: String,
    #[serde(default)]
    pub status: MemberStatus,
    #[serde(default)]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub contract_version: Option<String>,
    #[serde(default)]
    pub declared_contract: Option<CapabilityManifest>,
}

/// Named policy row. `config` is interpreted according to `policy_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Value,
}

impl Policy {
    /// Parse the capability-access rule set.
    ///
    /// Returns `Ok(None)` for other policy types.
    pub fn capability_access(&self) -> Result<Option<CapabilityAccessConfig>> {
        if self.policy_type != CAPABILITY_ACCESS {
            return Ok(None);
        }
        let cfg = serde_json::from_value(self.config.clone()).map_err(|e| {
            MeshError::BadRequest(format!("policy {} has invalid rules: {e}", self.name))
        })?;
        Ok(Some(cfg))
    }
}

/// `config` body of a `capability-access` policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityAccessConfig {
    #[serde(default)]
    pub rules: Vec<AccessRule>,
}

/// One capability/operation/direction/realm-constraint clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRule {
    /// Dotted wildcard pattern (`*` matches any remaining characters).
    pub capability: String,
    /// `None` => any operation.
    #[serde(default)]
    pub operations: Option<OperationSet>,
    pub direction: RuleDirection,
    #[serde(default)]
    pub allow_from: RealmConstraint,
    #[serde(default)]
    pub allow_to: Option<RealmConstraint>,
}

/// `operations` may be a list or the bare string `"*"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationSet {
    Many(Vec<String>),
    One(String),
}

impl OperationSet {
    pub fn admits(&self, operation: &str) -> bool {
        match self {
            OperationSet::One(s) => s == "*" || s == operation,
            OperationSet::Many(ops) => ops.iter().any(|o| o == "*" || o == operation),
        }
    }
}

/// Which other realms a rule applies to. Populated fields are OR-ed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RealmConstraint {
    #[serde(default)]
    pub realm_ids: Vec<String>,
    #[serde(default)]
    pub realm_patterns: Vec<String>,
    #[serde(default)]
    pub child_realms: bool,
    #[serde(default)]
    pub descendant_realms: bool,
    #[serde(default)]
    pub any_realm: bool,
}

/// Direction of a concrete interaction, relative to the source realm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    /// Same-realm traffic is inbound, cross-realm traffic is outbound.
    pub fn between(source_realm_id: &str, target_realm_id: &str) -> Self {
        if source_realm_id == target_realm_id {
            Direction::Inbound
        } else {
            Direction::Outbound
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Direction a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleDirection {
    Inbound,
    Outbound,
    Bidirectional,
}

impl RuleDirection {
    pub fn admits(self, direction: Direction) -> bool {
        match self {
            RuleDirection::Bidirectional => true,
            RuleDirection::Inbound => direction == Direction::Inbound,
            RuleDirection::Outbound => direction == Direction::Outbound,
        }
    }
}

/// Kind of cross-member interaction being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Service,
    Event,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Service => "service",
            OperationType::Event => "event",
        }
    }
}
