use std::collections::HashSet;
use std::sync::Arc;

use meshgate_core::error::Result;
use meshgate_core::model::{AccessRule, Direction, OperationType, Realm, RealmConstraint};

use crate::store::RecordStore;

use super::pattern;

/// Upper bound on parent-chain walks. The hierarchy is a tree; this only
/// guards against corrupt store rows.
pub const MAX_REALM_DEPTH: usize = 64;

/// Reason returned when the source realm has no effective policies.
pub const NO_POLICIES: &str = "no policies configured";

/// One access question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessContext {
    pub source_realm_key: String,
    pub source_member_id: String,
    /// `None` => the counter-party is the source realm itself.
    pub target_realm_key: Option<String>,
    pub target_member_id: Option<String>,
    pub capability: String,
    /// Service name or event name.
    pub operation: String,
    pub operation_type: OperationType,
    pub direction: Direction,
}

/// Outcome of `PolicyEngine::evaluate_access`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: String,
    pub matched_policy: Option<String>,
}

impl AccessDecision {
    fn deny(reason: impl Into<String>) -> Self {
        Self { allowed: false, reason: reason.into(), matched_policy: None }
    }

    fn allow(reason: String, policy: &str) -> Self {
        Self { allowed: true, reason, matched_policy: Some(policy.to_string()) }
    }
}

/// Capability-access policy engine.
///
/// Stateless apart from the store handle: every evaluation re-reads the rows
/// it needs, so two evaluations against unchanged store state agree.
pub struct PolicyEngine {
    store: Arc<dyn RecordStore>,
}

impl PolicyEngine {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Evaluate one access decision. Store failures fail closed.
    pub async fn evaluate_access(&self, ctx: &AccessContext) -> AccessDecision {
        match self.evaluate(ctx).await {
            Ok(d) => {
                tracing::debug!(
                    source = %ctx.source_member_id,
                    target = ?ctx.target_member_id,
                    capability = %ctx.capability,
                    operation = %ctx.operation,
                    kind = ctx.operation_type.as_str(),
                    direction = ctx.direction.as_str(),
                    allowed = d.allowed,
                    policy = ?d.matched_policy,
                    "policy decision"
                );
                d
            }
            Err(e) => {
                tracing::error!(error = %e, "policy evaluation failed");
                AccessDecision::deny(format!("policy evaluation error: {e}"))
            }
        }
    }

    async fn evaluate(&self, ctx: &AccessContext) -> Result<AccessDecision> {
        let Some(source) = self.store.realm_by_key(&ctx.source_realm_key).await? else {
            return Ok(AccessDecision::deny(format!(
                "source realm {} not found",
                ctx.source_realm_key
            )));
        };

        let names = self.effective_policies(&source).await?;
        if names.is_empty() {
            return Ok(AccessDecision::deny(NO_POLICIES));
        }

        let other_key = ctx.target_realm_key.as_deref().unwrap_or(&ctx.source_realm_key);
        let mut other = OtherRealm::new(other_key);

        for name in &names {
            let Some(policy) = self.store.policy(name).await? else {
                tracing::debug!(policy = %name, "attached policy not found, skipping");
                continue;
            };
            let rules = match policy.capability_access() {
                Ok(Some(cfg)) => cfg.rules,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(policy = %name, error = %e, "skipping malformed policy");
                    continue;
                }
            };

            for rule in &rules {
                if !rule_applies(rule, ctx) {
                    continue;
                }

                let mut satisfied = self.constraint_matches(&rule.allow_from, &source, &mut other).await?;
                if !satisfied && ctx.direction == Direction::Outbound {
                    if let Some(to) = &rule.allow_to {
                        satisfied = self.constraint_matches(to, &source, &mut other).await?;
                    }
                }

                if satisfied {
                    return Ok(AccessDecision::allow(
                        format!(
                            "allowed by rule for {} ({:?}) in {}",
                            rule.capability, rule.direction, policy.name
                        ),
                        &policy.name,
                    ));
                }
            }
        }

        Ok(AccessDecision::deny("no policy allows this operation"))
    }

    /// Effective policy names for `realm`: its own list first, then (while
    /// `inheritPolicies` holds) each ancestor's, nearest first, deduplicated.
    pub async fn effective_policies(&self, realm: &Realm) -> Result<Vec<String>> {
        let mut out: Vec<String> = Vec::new();
        let mut seen_policies: HashSet<String> = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();

        let mut current = Some(realm.clone());
        while let Some(r) = current {
            if !visited.insert(r.id.clone()) || visited.len() > MAX_REALM_DEPTH {
                tracing::warn!(realm = %realm.realm_key, "realm ancestry loops or is too deep");
                break;
            }
            for p in &r.policies {
                if seen_policies.insert(p.clone()) {
                    out.push(p.clone());
                }
            }
            if !r.inherit_policies {
                break;
            }
            current = match &r.parent_id {
                Some(pid) => self.store.realm_by_id(pid).await?,
                None => None,
            };
        }

        Ok(out)
    }

    async fn constraint_matches(
        &self,
        c: &RealmConstraint,
        current: &Realm,
        other: &mut OtherRealm<'_>,
    ) -> Result<bool> {
        if c.any_realm {
            return Ok(true);
        }
        if c.realm_ids.iter().any(|id| id == other.key) {
            return Ok(true);
        }
        if c.realm_patterns.iter().any(|p| pattern::matches(p, other.key)) {
            return Ok(true);
        }

        let needs_row = !c.realm_ids.is_empty() || c.child_realms || c.descendant_realms;
        if !needs_row {
            return Ok(false);
        }
        let Some(row) = other.row(self.store.as_ref()).await? else {
            return Ok(false);
        };

        if c.realm_ids.iter().any(|id| *id == row.id) {
            return Ok(true);
        }
        if c.child_realms && row.parent_id.as_deref() == Some(current.id.as_str()) {
            return Ok(true);
        }
        if c.descendant_realms && self.is_descendant(&row, &current.id).await? {
            return Ok(true);
        }
        Ok(false)
    }

    /// Walk `other`'s ancestor chain looking for `ancestor_id`.
    async fn is_descendant(&self, other: &Realm, ancestor_id: &str) -> Result<bool> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut next = other.parent_id.clone();

        while let Some(pid) = next {
            if pid == ancestor_id {
                return Ok(true);
            }
            if !seen.insert(pid.clone()) || seen.len() > MAX_REALM_DEPTH {
                tracing::warn!(realm = %other.realm_key, "realm ancestry loops or is too deep");
                return Ok(false);
            }
            next = self.store.realm_by_id(&pid).await?.and_then(|r| r.parent_id);
        }
        Ok(false)
    }
}

fn rule_applies(rule: &AccessRule, ctx: &AccessContext) -> bool {
    if !pattern::matches(&rule.capability, &ctx.capability) {
        return false;
    }
    if let Some(ops) = &rule.operations {
        if !ops.admits(&ctx.operation) {
            return false;
        }
    }
    rule.direction.admits(ctx.direction)
}

/// Counter-party realm, fetched at most once per evaluation.
struct OtherRealm<'a> {
    key: &'a str,
    row: Option<Option<Realm>>,
}

impl<'a> OtherRealm<'a> {
    fn new(key: &'a str) -> Self {
        Self { key, row: None }
    }

    async fn row(&mut self, store: &dyn RecordStore) -> Result<Option<Realm>> {
        if self.row.is_none() {
            self.row = Some(store.realm_by_key(self.key).await?);
        }
        Ok(self.row.clone().flatten())
    }
}
