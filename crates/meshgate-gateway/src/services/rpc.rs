//! Correlated service calls.
//!
//! `call` picks the first policy-allowed provider in discovery order, records
//! a pending entry and forwards a `service-request`. The entry then leaves
//! the table exactly once: on the provider's response, on its deadline, or
//! when either session goes away.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;

use meshgate_core::error::{ClientCode, MeshError, Result};
use meshgate_core::model::{Direction, OperationType};
use meshgate_core::protocol::frame::{types, Frame, ServiceCall, ServiceRequest, ServiceResponse};

use crate::config::RoutingSection;
use crate::dispatch::FrameHandler;
use crate::obs::{ActivityMonitor, MeshMetrics};
use crate::policy::{AccessContext, PolicyEngine};
use crate::realtime::{CallKey, MeshCore, PendingEntry, PreparedMsg, QoS, RouteCtx, Session};
use crate::store::RecordStore;

use super::RealmKeys;

/// What happened to a call at the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Forwarded; the reply (or TIMEOUT) arrives later.
    Forwarded { target_member_id: String },
    /// Answered immediately with a synthesized failure.
    Rejected(ClientCode),
}

pub struct ServiceRouter {
    store: Arc<dyn RecordStore>,
    policy: Arc<PolicyEngine>,
    core: Arc<MeshCore>,
    activity: Arc<ActivityMonitor>,
    metrics: Arc<MeshMetrics>,
    routing: RoutingSection,
    write_timeout_ms: u64,
}

impl ServiceRouter {
    pub fn new(
        store: Arc<dyn RecordStore>,
        policy: Arc<PolicyEngine>,
        core: Arc<MeshCore>,
        activity: Arc<ActivityMonitor>,
        metrics: Arc<MeshMetrics>,
        routing: RoutingSection,
        write_timeout_ms: u64,
    ) -> Self {
        Self { store, policy, core, activity, metrics, routing, write_timeout_ms }
    }

    fn qos(&self) -> QoS {
        QoS::Reliable { timeout_ms: self.write_timeout_ms }
    }

    fn call_timeout(&self, requested: Option<u64>) -> Duration {
        let ms = requested
            .unwrap_or(self.routing.default_call_timeout_ms)
            .min(self.routing.max_call_timeout_ms)
            .max(1);
        Duration::from_millis(ms)
    }

    pub async fn call(&self, source: &Arc<Session>, call: ServiceCall) -> Result<CallOutcome> {
        if self.core.pending.contains(source.id(), &call.request_id) {
            return self
                .reject(source, &call, ClientCode::BadRequest, "duplicate", format!("requestId {} is already in flight", call.request_id))
                .await;
        }

        let online = match self.store.online_members().await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(request_id = %call.request_id, error = %e, "provider discovery failed");
                return self
                    .reject(source, &call, ClientCode::StoreError, "store_error", format!("provider lookup for {}.{} failed", call.capability, call.service_name))
                    .await;
            }
        };
        let providers: Vec<_> = online
            .into_iter()
            .filter(|m| {
                m.declared_contract
                    .as_ref()
                    .is_some_and(|c| c.provides_service(&call.capability, &call.service_name))
            })
            .collect();

        if providers.is_empty() {
            return self
                .reject(source, &call, ClientCode::ServiceNotFound, "not_found", format!("no provider for {}.{}", call.capability, call.service_name))
                .await;
        }

        let mut realms = RealmKeys::default();
        let mut selected = None;
        for p in &providers {
            let Some(target_realm_key) = realms.resolve(self.store.as_ref(), &p.realm_id).await else {
                tracing::warn!(member_id = %p.id, realm_id = %p.realm_id, "provider realm unavailable; skipped");
                continue;
            };
            let ctx = AccessContext {
                source_realm_key: source.realm_key().to_string(),
                source_member_id: source.member_id().to_string(),
                target_realm_key: Some(target_realm_key),
                target_member_id: Some(p.id.clone()),
                capability: call.capability.clone(),
                operation: call.service_name.clone(),
                operation_type: OperationType::Service,
                direction: Direction::between(source.realm_id(), &p.realm_id),
            };
            let decision = self.policy.evaluate_access(&ctx).await;
            self.metrics.policy_decisions.inc(&[
                ("kind", OperationType::Service.as_str()),
                ("allowed", if decision.allowed { "true" } else { "false" }),
            ]);
            if decision.allowed {
                selected = Some(p);
                break;
            }
        }

        let Some(provider) = selected else {
            return self
                .reject(source, &call, ClientCode::PolicyDenied, "denied", format!("access to {}.{} denied", call.capability, call.service_name))
                .await;
        };

        let Some(target) = self.core.sessions.get_ready(&provider.id) else {
            return self
                .reject(source, &call, ClientCode::TargetOffline, "offline", format!("provider {} is not connected", provider.id))
                .await;
        };

        let timeout = self.call_timeout(call.timeout);
        let entry = PendingEntry::new(
            call.request_id.clone(),
            source.member_id(),
            source.id(),
            target.member_id(),
            target.id(),
            call.capability.clone(),
            call.service_name.clone(),
            Instant::now() + timeout,
        );
        let key = entry.key();
        let deadline = entry.deadline;
        if let Err(e) = self.core.pending.insert(entry) {
            return self.reject(source, &call, ClientCode::BadRequest, "duplicate", e.to_string()).await;
        }
        self.spawn_deadline(key, deadline);

        let request = ServiceRequest {
            request_id: call.request_id.clone(),
            capability: call.capability.clone(),
            service_name: call.service_name.clone(),
            input: call.input.clone(),
            source_member_id: source.member_id().to_string(),
            source_realm_id: source.realm_id().to_string(),
        };
        let prepared = PreparedMsg::prepare(&Frame::new(types::SERVICE_REQUEST, &request)?)?;
        if let Err(e) = target.send(&prepared, self.qos()).await {
            tracing::warn!(request_id = %call.request_id, target = %target.member_id(), error = %e, "service-request forward failed");
            if self.core.pending.complete(&call.request_id, target.id()).is_some() {
                return self
                    .reject(source, &call, ClientCode::TargetOffline, "offline", format!("provider {} is unreachable", target.member_id()))
                    .await;
            }
            // Timer or disconnect already settled the entry.
            return Ok(CallOutcome::Rejected(ClientCode::TargetOffline));
        }

        self.metrics.service_calls.inc(&[("outcome", "forwarded")]);
        tracing::debug!(
            request_id = %call.request_id,
            source = %source.member_id(),
            target = %target.member_id(),
            capability = %call.capability,
            service = %call.service_name,
            timeout_ms = timeout.as_millis() as u64,
            "service call forwarded"
        );
        self.activity.routing(
            source.member_id(),
            source.realm_id(),
            format!("service call {}.{} routed to {}", call.capability, call.service_name, target.member_id()),
            serde_json::json!({ "requestId": call.request_id, "target": target.member_id() }),
        );
        Ok(CallOutcome::Forwarded { target_member_id: target.member_id().to_string() })
    }

    fn spawn_deadline(&self, key: CallKey, deadline: Instant) {
        let core = Arc::clone(&self.core);
        let metrics = Arc::clone(&self.metrics);
        let activity = Arc::clone(&self.activity);
        let qos = self.qos();
        let timer_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(entry) = core.pending.expire(&timer_key) else { return };
            let rid = entry.request_id.as_str();
            metrics.service_calls.inc(&[("outcome", "timeout")]);
            tracing::info!(request_id = %rid, source = %entry.source_member_id, target = %entry.target_member_id, "service call timed out");
            activity.error(
                Some(&entry.source_member_id),
                format!("service call {}.{} timed out", entry.capability, entry.service_name),
                Some(serde_json::json!({ "requestId": rid })),
            );

            let resp = ServiceResponse::failure(rid, ClientCode::Timeout.as_str(), "service call timed out");
            let Ok(frame) = Frame::new(types::SERVICE_RESPONSE, &resp) else { return };
            if let Err(e) = core
                .send_to_session(&entry.source_member_id, entry.source_session_id, &frame, qos)
                .await
            {
                tracing::debug!(request_id = %rid, error = %e, "timeout reply not delivered");
            }
        });
        self.core.pending.attach_timer(&key, handle.abort_handle());
    }

    /// Settle a pending call with the provider's response. Unknown, late, or
    /// misattributed responses are dropped; returns whether it was forwarded.
    pub async fn respond(&self, responder: &Session, payload: Value) -> Result<bool> {
        let request_id = payload
            .get("requestId")
            .and_then(Value::as_str)
            .ok_or_else(|| MeshError::BadRequest("service-response requires requestId".into()))?
            .to_string();

        let Some(entry) = self.core.pending.complete(&request_id, responder.id()) else {
            tracing::debug!(request_id = %request_id, responder = %responder.member_id(), "unmatched service-response dropped");
            return Ok(false);
        };
        self.metrics.service_calls.inc(&[("outcome", "completed")]);

        let frame = Frame { frame_type: types::SERVICE_RESPONSE.to_string(), payload };
        match self
            .core
            .send_to_session(&entry.source_member_id, entry.source_session_id, &frame, self.qos())
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                tracing::debug!(request_id = %request_id, error = %e, "service-response not delivered");
                Ok(false)
            }
        }
    }

    /// Forget every pending call that references `session` on either side.
    pub fn purge_session(&self, session: &Session) -> usize {
        let purged = self.core.pending.purge_session(session.id());
        if !purged.is_empty() {
            tracing::debug!(member_id = %session.member_id(), purged = purged.len(), "pending calls purged");
        }
        purged.len()
    }

    async fn reject(
        &self,
        source: &Session,
        call: &ServiceCall,
        code: ClientCode,
        outcome: &'static str,
        message: String,
    ) -> Result<CallOutcome> {
        self.metrics.service_calls.inc(&[("outcome", outcome)]);
        tracing::debug!(request_id = %call.request_id, source = %source.member_id(), code = code.as_str(), %message, "service call rejected");
        self.activity.error(
            Some(source.member_id()),
            message.clone(),
            Some(serde_json::json!({ "requestId": call.request_id, "code": code.as_str() })),
        );

        let resp = ServiceResponse::failure(&call.request_id, code.as_str(), message);
        let prepared = PreparedMsg::prepare(&Frame::new(types::SERVICE_RESPONSE, &resp)?)?;
        if let Err(e) = source.send(&prepared, self.qos()).await {
            tracing::debug!(request_id = %call.request_id, error = %e, "failure reply not delivered");
        }
        Ok(CallOutcome::Rejected(code))
    }
}

#[async_trait]
impl FrameHandler for ServiceRouter {
    fn frame_types(&self) -> &'static [&'static str] {
        &[types::SERVICE_CALL, types::SERVICE_RESPONSE]
    }

    async fn handle(&self, ctx: RouteCtx, frame: Frame) -> Result<()> {
        if frame.frame_type == types::SERVICE_RESPONSE {
            return self.respond(ctx.session(), frame.payload).await.map(|_| ());
        }
        let call: ServiceCall = frame.decode_payload()?;
        if call.request_id.is_empty() {
            return Err(MeshError::BadRequest("service-call requires requestId".into()));
        }
        self.call(ctx.session(), call).await.map(|_| ())
    }
}
