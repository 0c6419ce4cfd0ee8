//! Shared application state: the gateway's composition root.
//!
//! Owns the session registry, pending-call table, policy engine, routers,
//! and diagnostics. Handlers get narrow operations through this type rather
//! than raw access to the concurrent maps.

use std::sync::Arc;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::model::MemberStatus;
use meshgate_core::protocol::frame::types;

use crate::auth::TokenVerifier;
use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::obs::{ActivityMonitor, MeshMetrics};
use crate::policy::PolicyEngine;
use crate::realtime::{CloseReason, MeshCore, Session};
use crate::services::{Admission, EventRouter, HandshakeService, ServiceRouter};
use crate::store::RecordStore;
use crate::transport::guard::AdmissionGuard;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    store: Arc<dyn RecordStore>,
    policy: Arc<PolicyEngine>,
    core: Arc<MeshCore>,
    dispatcher: Arc<Dispatcher>,
    admission: Admission,
    handshake: HandshakeService,
    events: Arc<EventRouter>,
    rpc: Arc<ServiceRouter>,
    guard: AdmissionGuard,
    metrics: Arc<MeshMetrics>,
    activity: Arc<ActivityMonitor>,
}

impl AppState {
    /// Build application state. Fails on invalid config instead of panicking.
    pub fn new(cfg: GatewayConfig, store: Arc<dyn RecordStore>) -> Result<Self> {
        cfg.validate()?;

        let metrics = Arc::new(MeshMetrics::default());
        let activity = Arc::new(ActivityMonitor::new(cfg.monitor.enabled, cfg.monitor.buffer_size));
        let policy = Arc::new(PolicyEngine::new(Arc::clone(&store)));
        let core = Arc::new(MeshCore::new());
        let write_timeout_ms = cfg.gateway.write_timeout_ms;

        let events = Arc::new(EventRouter::new(
            Arc::clone(&store),
            Arc::clone(&policy),
            Arc::clone(&core),
            Arc::clone(&activity),
            Arc::clone(&metrics),
        ));
        let rpc = Arc::new(ServiceRouter::new(
            Arc::clone(&store),
            Arc::clone(&policy),
            Arc::clone(&core),
            Arc::clone(&activity),
            Arc::clone(&metrics),
            cfg.routing.clone(),
            write_timeout_ms,
        ));

        let dispatcher = Dispatcher::new();
        dispatcher.register(events.clone());
        dispatcher.register(rpc.clone());
        let registered = dispatcher.registered_types();
        for t in [types::EVENT_PUBLISH, types::SERVICE_CALL, types::SERVICE_RESPONSE] {
            if !registered.contains(&t) {
                return Err(MeshError::Internal(format!("no handler registered for {t}")));
            }
        }

        let admission = Admission::new(TokenVerifier::new(&cfg.auth), Arc::clone(&store));
        let handshake = HandshakeService::new(
            Arc::clone(&store),
            Arc::clone(&policy),
            Arc::clone(&activity),
            Arc::clone(&metrics),
            write_timeout_ms,
        );
        let guard = AdmissionGuard::new(cfg.admission_limits.clone());

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                store,
                policy,
                core,
                dispatcher: Arc::new(dispatcher),
                admission,
                handshake,
                events,
                rpc,
                guard,
                metrics,
                activity,
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig { &self.inner.cfg }
    pub fn store(&self) -> Arc<dyn RecordStore> { Arc::clone(&self.inner.store) }
    pub fn policy(&self) -> Arc<PolicyEngine> { Arc::clone(&self.inner.policy) }
    pub fn core(&self) -> Arc<MeshCore> { Arc::clone(&self.inner.core) }
    pub fn dispatcher(&self) -> Arc<Dispatcher> { Arc::clone(&self.inner.dispatcher) }
    pub fn admission(&self) -> &Admission { &self.inner.admission }
    pub fn handshake(&self) -> &HandshakeService { &self.inner.handshake }
    pub fn events(&self) -> Arc<EventRouter> { Arc::clone(&self.inner.events) }
    pub fn rpc(&self) -> Arc<ServiceRouter> { Arc::clone(&self.inner.rpc) }
    pub fn guard(&self) -> &AdmissionGuard { &self.inner.guard }
    pub fn metrics(&self) -> Arc<MeshMetrics> { Arc::clone(&self.inner.metrics) }
    pub fn activity(&self) -> Arc<ActivityMonitor> { Arc::clone(&self.inner.activity) }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    pub fn set_draining(&self) {
        self.inner.metrics.set_draining();
    }

    /// Point-in-time gauges appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![
            ("meshgate_sessions_registered", self.inner.core.sessions.len() as u64),
            ("meshgate_pending_requests", self.inner.core.pending.len() as u64),
            ("meshgate_monitor_subscribers", self.inner.activity.stats().subscribers as u64),
            ("meshgate_admission_tracked_ips", self.inner.guard.tracked_ips() as u64),
        ]
    }

    /// Bind `session` to its member. Any previous session for the member is
    /// superseded and told to close.
    pub fn register(&self, session: Arc<Session>) {
        let m = &self.inner.metrics;
        if let Some(old) = self.inner.core.sessions.insert(Arc::clone(&session)) {
            tracing::info!(member_id = %old.member_id(), old_session = %old.id(), new_session = %session.id(), "session superseded");
            m.superseded_sessions.inc(&[]);
            old.close(CloseReason::superseded());
        }
        m.active_sessions.inc(&[]);
        self.inner.activity.connection(session.member_id(), session.realm_id());
    }

    /// Tear down after the transport closed: unbind (unless superseded),
    /// mark offline, and drop pending calls touching this session.
    pub async fn release(&self, session: &Session) {
        let current = self
            .inner
            .core
            .sessions
            .remove_if_current(session.member_id(), session.id());
        self.inner.rpc.purge_session(session);
        self.inner.metrics.active_sessions.dec(&[]);

        if current {
            if let Err(e) = self
                .inner
                .store
                .set_member_status(session.member_id(), MemberStatus::Offline)
                .await
            {
                tracing::error!(member_id = %session.member_id(), error = %e, "failed to mark member offline");
            }
        }
        self.inner.activity.disconnection(session.member_id());
    }
}
