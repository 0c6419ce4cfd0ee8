//! Routing when the record store fails part-way through.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use meshgate_core::error::{ClientCode, MeshError, Result};
use meshgate_core::model::{Member, MemberStatus, Policy, Realm};
use meshgate_core::protocol::frame::{EventPublish, ServiceCall};
use meshgate_core::protocol::manifest::CapabilityManifest;
use meshgate_gateway::app_state::AppState;
use meshgate_gateway::services::{CallOutcome, PublishReport};
use meshgate_gateway::store::{MemoryStore, RecordStore};

/// Delegates to a seeded `MemoryStore` but can fail one realm row, or member
/// discovery as a whole.
struct FlakyStore {
    inner: Arc<MemoryStore>,
    broken_realm: &'static str,
    discovery_down: AtomicBool,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn realm_by_id(&self, id: &str) -> Result<Option<Realm>> {
        if id == self.broken_realm {
            return Err(MeshError::Store(format!("{id} row unavailable")));
        }
        self.inner.realm_by_id(id).await
    }
    async fn realm_by_key(&self, realm_key: &str) -> Result<Option<Realm>> {
        self.inner.realm_by_key(realm_key).await
    }
    async fn policy(&self, name: &str) -> Result<Option<Policy>> {
        self.inner.policy(name).await
    }
    async fn member(&self, id: &str) -> Result<Option<Member>> {
        self.inner.member(id).await
    }
    async fn online_members(&self) -> Result<Vec<Member>> {
        if self.discovery_down.load(Ordering::Relaxed) {
            return Err(MeshError::Store("member index unavailable".into()));
        }
        self.inner.online_members().await
    }
    async fn set_member_status(&self, id: &str, status: MemberStatus) -> Result<()> {
        self.inner.set_member_status(id, status).await
    }
    async fn set_declared_contract(
        &self,
        id: &str,
        contract: CapabilityManifest,
        contract_name: Option<String>,
        contract_version: Option<String>,
    ) -> Result<()> {
        self.inner.set_declared_contract(id, contract, contract_name, contract_version).await
    }
}

fn gateway() -> (AppState, Arc<MemoryStore>, Arc<FlakyStore>) {
    let seeded = common::store();
    let flaky = Arc::new(FlakyStore {
        inner: seeded.clone(),
        broken_realm: "r-gamma",
        discovery_down: AtomicBool::new(false),
    });
    let app = AppState::new(common::config(), flaky.clone()).unwrap();
    (app, seeded, flaky)
}

fn ping() -> EventPublish {
    EventPublish {
        capability: "test.ping-pong".into(),
        event_name: "Ping".into(),
        topic: "ping-pong".into(),
        payload: json!({ "n": 1 }),
    }
}

fn add(request_id: &str) -> ServiceCall {
    ServiceCall {
        request_id: request_id.into(),
        capability: "math".into(),
        service_name: "add".into(),
        input: json!({ "a": 1, "b": 2 }),
        timeout: None,
    }
}

#[tokio::test]
async fn unreadable_subscriber_realm_blocks_only_that_subscriber() {
    let (app, store, _flaky) = gateway();
    common::go_online(&store, "alpha/ping", CapabilityManifest::default()).await;
    // Store order puts gamma/math ahead of alpha.kids/math.
    common::go_online(&store, "gamma/math", common::ping_pong_handler()).await;
    common::go_online(&store, "alpha.kids/math", common::ping_pong_handler()).await;

    let (src, mut src_rx) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    let (gamma, mut gamma_rx) = common::ready_session("gamma/math", "r-gamma", "gamma");
    let (kids, mut kids_rx) = common::ready_session("alpha.kids/math", "r-kids", "alpha.kids");
    for s in [src, gamma, kids] {
        app.core().sessions.insert(s);
    }

    let report = app.events().publish("alpha/ping", ping()).await.unwrap();
    assert_eq!(report, PublishReport { delivered: 1, blocked: 1, ..Default::default() });

    assert_eq!(common::next_json(&mut kids_rx).expect("event")["type"], "event");
    assert!(common::next_json(&mut gamma_rx).is_none());
    assert!(common::next_json(&mut src_rx).is_none());
}

#[tokio::test]
async fn failed_discovery_drops_the_event_quietly() {
    let (app, store, flaky) = gateway();
    common::go_online(&store, "alpha/ping", CapabilityManifest::default()).await;
    let (src, mut src_rx) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    app.core().sessions.insert(src);

    flaky.discovery_down.store(true, Ordering::Relaxed);
    let report = app.events().publish("alpha/ping", ping()).await.unwrap();
    assert_eq!(report, PublishReport::default());
    assert!(common::next_json(&mut src_rx).is_none());
}

#[tokio::test]
async fn unreadable_provider_realm_is_skipped() {
    let (app, store, _flaky) = gateway();
    common::go_online(&store, "gamma/math", common::math_provider()).await;
    common::go_online(&store, "alpha.kids/math", common::math_provider()).await;

    let (gamma, mut gamma_rx) = common::ready_session("gamma/math", "r-gamma", "gamma");
    let (kids, mut kids_rx) = common::ready_session("alpha.kids/math", "r-kids", "alpha.kids");
    let (caller, mut caller_rx) = common::ready_session("alpha/caller", "r-alpha", "alpha");
    for s in [gamma, kids, caller.clone()] {
        app.core().sessions.insert(s);
    }

    let out = app.rpc().call(&caller, add("r1")).await.unwrap();
    assert_eq!(out, CallOutcome::Forwarded { target_member_id: "alpha.kids/math".into() });
    assert_eq!(common::next_json(&mut kids_rx).expect("request")["type"], "service-request");
    assert!(common::next_json(&mut gamma_rx).is_none());
    assert!(common::next_json(&mut caller_rx).is_none());
}

#[tokio::test]
async fn failed_discovery_answers_the_caller_with_its_request_id() {
    let (app, _store, flaky) = gateway();
    let (caller, mut caller_rx) = common::ready_session("alpha/caller", "r-alpha", "alpha");
    app.core().sessions.insert(caller.clone());

    flaky.discovery_down.store(true, Ordering::Relaxed);
    let out = app.rpc().call(&caller, add("r7")).await.unwrap();
    assert_eq!(out, CallOutcome::Rejected(ClientCode::StoreError));

    let got = common::next_json(&mut caller_rx).expect("service-response");
    assert_eq!(got["type"], "service-response");
    assert_eq!(got["payload"]["requestId"], "r7");
    assert_eq!(got["payload"]["error"]["code"], "STORE_ERROR");
    assert!(app.core().pending.is_empty());
}
