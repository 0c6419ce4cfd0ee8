//! Event fanout.
//!
//! Fire-and-forget: the publisher never hears about individual deliveries.
//! Each candidate subscriber gets its own policy decision, including
//! same-realm ones.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use meshgate_core::error::{MeshError, Result};
use meshgate_core::model::{Direction, Member, OperationType};
use meshgate_core::protocol::frame::{types, EventDelivery, EventPublish, Frame};

use crate::dispatch::FrameHandler;
use crate::obs::{ActivityMonitor, MeshMetrics};
use crate::policy::{pattern, AccessContext, PolicyEngine};
use crate::realtime::{MeshCore, PreparedMsg, RouteCtx};
use crate::store::RecordStore;

use super::RealmKeys;

/// Per-publish aggregate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Queued on the subscriber's transport.
    pub delivered: usize,
    /// Denied by policy (or the subscriber's realm could not be resolved).
    pub blocked: usize,
    /// Allowed but no ready session.
    pub offline: usize,
    /// The publisher itself matched as a candidate.
    pub skipped: usize,
    /// Subscriber queue full or closed.
    pub dropped: usize,
}

impl PublishReport {
    pub fn candidates(&self) -> usize {
        self.delivered + self.blocked + self.offline + self.dropped
    }
}

pub struct EventRouter {
    store: Arc<dyn RecordStore>,
    policy: Arc<PolicyEngine>,
    core: Arc<MeshCore>,
    activity: Arc<ActivityMonitor>,
    metrics: Arc<MeshMetrics>,
}

/// Subscribed by an explicit handler, or (only when no handler metadata was
/// declared) by a required capability pattern.
fn subscribes(member: &Member, ev: &EventPublish) -> bool {
    let Some(m) = member.declared_contract.as_ref() else { return false };
    if m.handles_event(&ev.capability, &ev.event_name, &ev.topic) {
        return true;
    }
    !m.has_event_handlers()
        && m.requires
            .capabilities
            .iter()
            .any(|p| pattern::matches(p, &ev.capability))
}

impl EventRouter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        policy: Arc<PolicyEngine>,
        core: Arc<MeshCore>,
        activity: Arc<ActivityMonitor>,
        metrics: Arc<MeshMetrics>,
    ) -> Self {
        Self { store, policy, core, activity, metrics }
    }

    pub async fn publish(&self, source_member_id: &str, ev: EventPublish) -> Result<PublishReport> {
        let mut report = PublishReport::default();

        let Some(source) = self.core.sessions.get_ready(source_member_id) else {
            tracing::debug!(member_id = %source_member_id, "publish from unregistered member dropped");
            return Ok(report);
        };

        self.activity.event_published(
            source.member_id(),
            source.realm_id(),
            &ev.capability,
            &ev.event_name,
            &ev.topic,
        );

        let members = match self.store.online_members().await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(member_id = %source.member_id(), error = %e, "subscriber discovery failed; event dropped");
                self.activity.error(Some(source.member_id()), format!("event not routed: {e}"), None);
                return Ok(report);
            }
        };

        let delivery = EventDelivery {
            capability: ev.capability.clone(),
            event_name: ev.event_name.clone(),
            topic: ev.topic.clone(),
            payload: ev.payload.clone(),
            source_member_id: source.member_id().to_string(),
            source_realm_id: source.realm_id().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let prepared = PreparedMsg::prepare(&Frame::new(types::EVENT, &delivery)?)?;

        let mut realms = RealmKeys::default();
        for member in members.iter().filter(|m| subscribes(m, &ev)) {
            if member.id == source.member_id() {
                report.skipped += 1;
                continue;
            }

            let Some(target_realm_key) = realms.resolve(self.store.as_ref(), &member.realm_id).await else {
                tracing::warn!(member_id = %member.id, realm_id = %member.realm_id, "subscriber realm unavailable");
                report.blocked += 1;
                self.metrics.event_deliveries.inc(&[("outcome", "blocked")]);
                continue;
            };

            let ctx = AccessContext {
                source_realm_key: source.realm_key().to_string(),
                source_member_id: source.member_id().to_string(),
                target_realm_key: Some(target_realm_key),
                target_member_id: Some(member.id.clone()),
                capability: ev.capability.clone(),
                operation: ev.event_name.clone(),
                operation_type: OperationType::Event,
                direction: Direction::between(source.realm_id(), &member.realm_id),
            };
            let decision = self.policy.evaluate_access(&ctx).await;
            self.metrics.policy_decisions.inc(&[
                ("kind", OperationType::Event.as_str()),
                ("allowed", if decision.allowed { "true" } else { "false" }),
            ]);

            let outcome = if !decision.allowed {
                report.blocked += 1;
                "blocked"
            } else {
                match self.core.sessions.get_ready(&member.id) {
                    None => {
                        report.offline += 1;
                        "offline"
                    }
                    Some(s) if s.send_lossy(prepared.to_ws_message()) => {
                        report.delivered += 1;
                        "delivered"
                    }
                    Some(_) => {
                        report.dropped += 1;
                        "dropped"
                    }
                }
            };
            self.metrics.event_deliveries.inc(&[("outcome", outcome)]);
        }

        tracing::debug!(
            member_id = %source.member_id(),
            capability = %ev.capability,
            event = %ev.event_name,
            topic = %ev.topic,
            delivered = report.delivered,
            blocked = report.blocked,
            offline = report.offline,
            dropped = report.dropped,
            "event routed"
        );
        self.activity.routing(
            source.member_id(),
            source.realm_id(),
            format!("event routed to {} of {} members", report.delivered, report.candidates()),
            serde_json::json!({
                "delivered": report.delivered,
                "blocked": report.blocked,
                "offline": report.offline,
                "skipped": report.skipped,
                "dropped": report.dropped,
            }),
        );
        Ok(report)
    }
}

#[async_trait]
impl FrameHandler for EventRouter {
    fn frame_types(&self) -> &'static [&'static str] {
        &[types::EVENT_PUBLISH]
    }

    async fn handle(&self, ctx: RouteCtx, frame: Frame) -> Result<()> {
        let ev: EventPublish = frame.decode_payload()?;
        if ev.capability.is_empty() || ev.event_name.is_empty() {
            return Err(MeshError::BadRequest("event-publish requires capability and eventName".into()));
        }
        self.publish(ctx.member_id(), ev).await.map(|_| ())
    }
}
