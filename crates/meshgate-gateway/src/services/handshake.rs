//! `member-handshake` processing.
//!
//! A rejected handshake is answered with an ack carrying `error`; the session
//! stays connected but not ready, so the member may retry until the
//! handshake window closes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::model::MemberStatus;
use meshgate_core::protocol::frame::{types, Directory, Frame, HandshakeAck, MemberHandshake};
use meshgate_core::protocol::manifest::CapabilityManifest;

use crate::obs::{ActivityMonitor, MeshMetrics};
use crate::policy::PolicyEngine;
use crate::realtime::{QoS, Session};
use crate::store::RecordStore;

pub const STATUS_CONNECTED: &str = "connected";
pub const STATUS_REJECTED: &str = "rejected";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Accepted,
    Rejected(String),
}

pub struct HandshakeService {
    store: Arc<dyn RecordStore>,
    policy: Arc<PolicyEngine>,
    activity: Arc<ActivityMonitor>,
    metrics: Arc<MeshMetrics>,
    write_timeout_ms: u64,
}

impl HandshakeService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        policy: Arc<PolicyEngine>,
        activity: Arc<ActivityMonitor>,
        metrics: Arc<MeshMetrics>,
        write_timeout_ms: u64,
    ) -> Self {
        Self { store, policy, activity, metrics, write_timeout_ms }
    }

    /// Process one handshake frame. Errors returned here are transport
    /// failures (the ack could not be queued); handshake problems come back
    /// as `HandshakeOutcome::Rejected`.
    pub async fn complete(&self, session: &Arc<Session>, frame: &Frame) -> Result<HandshakeOutcome> {
        match self.accept(session, frame).await {
            Ok(ack) => {
                self.send_ack(session, &ack).await?;
                // Routed traffic may only follow the ack.
                session.mark_ready();
                self.metrics.handshakes.inc(&[("result", "accepted")]);
                tracing::info!(
                    member_id = %session.member_id(),
                    realm = %session.realm_key(),
                    policies = ack.policies.len(),
                    "handshake accepted"
                );
                Ok(HandshakeOutcome::Accepted)
            }
            Err(e) => {
                let msg = e.to_string();
                if matches!(e, MeshError::Store(_)) {
                    tracing::error!(member_id = %session.member_id(), error = %e, "handshake store failure");
                } else {
                    tracing::warn!(member_id = %session.member_id(), error = %e, "handshake rejected");
                }
                self.metrics.handshakes.inc(&[("result", "rejected")]);
                self.activity.error(Some(session.member_id()), format!("handshake rejected: {msg}"), None);

                let ack = HandshakeAck {
                    member_id: session.member_id().to_string(),
                    status: STATUS_REJECTED.to_string(),
                    policies: Vec::new(),
                    directory: Directory::default(),
                    error: Some(msg.clone()),
                };
                self.send_ack(session, &ack).await?;
                Ok(HandshakeOutcome::Rejected(msg))
            }
        }
    }

    async fn accept(&self, session: &Arc<Session>, frame: &Frame) -> Result<HandshakeAck> {
        let hs: MemberHandshake = frame
            .decode_payload()
            .map_err(|e| match e {
                MeshError::BadRequest(m) => MeshError::Handshake(m),
                other => other,
            })?;

        if hs.member_id != session.member_id() || hs.realm_id != session.realm_id() {
            return Err(MeshError::Handshake(format!(
                "handshake identity {}@{} does not match the session token",
                hs.member_id, hs.realm_id
            )));
        }
        hs.capabilities.validate()?;

        let realm = self
            .store
            .realm_by_id(session.realm_id())
            .await?
            .ok_or_else(|| MeshError::Handshake(format!("realm {} no longer exists", session.realm_id())))?;

        self.store
            .set_declared_contract(
                session.member_id(),
                hs.capabilities.clone(),
                hs.contract_name.clone(),
                hs.contract_version.clone(),
            )
            .await?;
        self.store
            .set_member_status(session.member_id(), MemberStatus::Online)
            .await?;

        self.activity.handshake(session.member_id(), &hs.capabilities);
        session.set_manifest(hs.capabilities);

        let policies = self.policy.effective_policies(&realm).await?;
        let directory = self.directory().await?;

        Ok(HandshakeAck {
            member_id: session.member_id().to_string(),
            status: STATUS_CONNECTED.to_string(),
            policies,
            directory,
            error: None,
        })
    }

    /// What online members currently provide.
    async fn directory(&self) -> Result<Directory> {
        let mut services: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut capabilities: BTreeSet<String> = BTreeSet::new();

        for m in self.store.online_members().await? {
            let Some(manifest) = m.declared_contract.as_ref() else { continue };
            collect(manifest, &mut services, &mut capabilities);
        }

        Ok(Directory {
            available_services: services
                .into_iter()
                .map(|(cap, names)| (cap, names.into_iter().collect()))
                .collect(),
            available_capabilities: capabilities.into_iter().collect(),
        })
    }

    async fn send_ack(&self, session: &Session, ack: &HandshakeAck) -> Result<()> {
        let frame = Frame::new(types::MEMBER_HANDSHAKE_ACK, ack)?;
        let prepared = crate::realtime::PreparedMsg::prepare(&frame)?;
        session
            .send(&prepared, QoS::Reliable { timeout_ms: self.write_timeout_ms })
            .await
    }
}

fn collect(
    manifest: &CapabilityManifest,
    services: &mut BTreeMap<String, BTreeSet<String>>,
    capabilities: &mut BTreeSet<String>,
) {
    for s in &manifest.provides.services {
        services
            .entry(s.capability.clone())
            .or_default()
            .insert(s.name.clone());
    }
    for cap in manifest.provided_capabilities() {
        capabilities.insert(cap.to_string());
    }
}
