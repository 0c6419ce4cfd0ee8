#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use serde_json::json;

use meshgate_core::protocol::frame::{EventPublish, Frame};
use meshgate_gateway::app_state::AppState;
use meshgate_gateway::realtime::RouteCtx;
use meshgate_gateway::services::PublishReport;
use meshgate_gateway::store::MemoryStore;

fn gateway() -> (AppState, Arc<MemoryStore>) {
    let store = common::store();
    let app = AppState::new(common::config(), store.clone()).unwrap();
    (app, store)
}

fn ping(topic: &str) -> EventPublish {
    EventPublish {
        capability: "test.ping-pong".into(),
        event_name: "Ping".into(),
        topic: topic.into(),
        payload: json!({ "n": 1 }),
    }
}

#[tokio::test]
async fn ping_reaches_pong_in_sibling_realm() {
    let (app, store) = gateway();
    common::go_online(&store, "alpha/ping", common::manifest(json!({
        "provides": { "events": [ { "capability": "test.ping-pong", "name": "Ping", "topic": "ping-pong" } ] }
    }))).await;
    common::go_online(&store, "beta/pong", common::ping_pong_handler()).await;

    let (src, _src_rx) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    let (dst, mut dst_rx) = common::ready_session("beta/pong", "r-beta", "beta");
    app.core().sessions.insert(src);
    app.core().sessions.insert(dst);

    let report = app.events().publish("alpha/ping", ping("ping-pong")).await.unwrap();
    assert_eq!(report, PublishReport { delivered: 1, ..Default::default() });

    let frame = common::next_json(&mut dst_rx).expect("event delivered");
    assert_eq!(frame["type"], "event");
    let p = &frame["payload"];
    assert_eq!(p["capability"], "test.ping-pong");
    assert_eq!(p["eventName"], "Ping");
    assert_eq!(p["topic"], "ping-pong");
    assert_eq!(p["payload"], json!({ "n": 1 }));
    assert_eq!(p["sourceMemberId"], "alpha/ping");
    assert_eq!(p["sourceRealmId"], "r-alpha");
    assert!(p["timestamp"].as_str().unwrap().contains('T'));
}

#[tokio::test]
async fn handler_match_is_exact_on_topic() {
    let (app, store) = gateway();
    common::go_online(&store, "beta/pong", common::ping_pong_handler()).await;
    let (src, _r) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    let (dst, mut dst_rx) = common::ready_session("beta/pong", "r-beta", "beta");
    app.core().sessions.insert(src);
    app.core().sessions.insert(dst);

    let report = app.events().publish("alpha/ping", ping("other-topic")).await.unwrap();
    assert_eq!(report.candidates(), 0);
    assert!(common::next_json(&mut dst_rx).is_none());
}

#[tokio::test]
async fn required_capability_fallback_only_without_handlers() {
    let (app, store) = gateway();
    // Wildcard requirement, no handler metadata: subscribed.
    common::go_online(&store, "beta/pong", common::manifest(json!({
        "requires": { "capabilities": ["test.*"] }
    }))).await;
    // Has handlers (for something else): the requirement does not count.
    common::go_online(&store, "alpha/caller", common::manifest(json!({
        "requires": { "capabilities": ["test.*"] },
        "eventHandlers": [ { "capability": "test.other", "eventName": "X", "topic": "t" } ]
    }))).await;

    let (src, _r) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    let (pong, mut pong_rx) = common::ready_session("beta/pong", "r-beta", "beta");
    let (caller, mut caller_rx) = common::ready_session("alpha/caller", "r-alpha", "alpha");
    for s in [src, pong, caller] {
        app.core().sessions.insert(s);
    }

    let report = app.events().publish("alpha/ping", ping("ping-pong")).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(common::next_json(&mut pong_rx).is_some());
    assert!(common::next_json(&mut caller_rx).is_none());
}

#[tokio::test]
async fn same_realm_delivery_is_still_policy_checked() {
    let (app, store) = gateway();
    common::go_online(&store, "alpha/caller", common::manifest(json!({
        "eventHandlers": [
            { "capability": "test.ping-pong", "eventName": "Ping", "topic": "ping-pong" },
            { "capability": "internal.audit", "eventName": "Entry", "topic": "audit" }
        ]
    }))).await;
    let (src, _r) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    let (caller, mut caller_rx) = common::ready_session("alpha/caller", "r-alpha", "alpha");
    app.core().sessions.insert(src);
    app.core().sessions.insert(caller);

    // allow-ping-pong-any covers inbound too.
    let r = app.events().publish("alpha/ping", ping("ping-pong")).await.unwrap();
    assert_eq!(r.delivered, 1);
    assert!(common::next_json(&mut caller_rx).is_some());

    // Nothing allows internal.audit inside alpha.
    let audit = EventPublish {
        capability: "internal.audit".into(),
        event_name: "Entry".into(),
        topic: "audit".into(),
        payload: json!(null),
    };
    let r = app.events().publish("alpha/ping", audit).await.unwrap();
    assert_eq!(r, PublishReport { blocked: 1, ..Default::default() });
    assert!(common::next_json(&mut caller_rx).is_none());
}

#[tokio::test]
async fn cross_realm_without_policy_is_blocked() {
    let (app, store) = gateway();
    common::go_online(&store, "gamma/listener", common::manifest(json!({
        "eventHandlers": [ { "capability": "math", "eventName": "Result", "topic": "results" } ]
    }))).await;
    let (src, _r) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    let (l, mut l_rx) = common::ready_session("gamma/listener", "r-gamma", "gamma");
    app.core().sessions.insert(src);
    app.core().sessions.insert(l);

    let ev = EventPublish {
        capability: "math".into(),
        event_name: "Result".into(),
        topic: "results".into(),
        payload: json!(3),
    };
    let r = app.events().publish("alpha/ping", ev).await.unwrap();
    assert_eq!(r.blocked, 1);
    assert!(common::next_json(&mut l_rx).is_none());
}

#[tokio::test]
async fn publisher_skipped_and_offline_counted() {
    let (app, store) = gateway();
    common::go_online(&store, "alpha/ping", common::ping_pong_handler()).await;
    common::go_online(&store, "beta/pong", common::ping_pong_handler()).await;
    let (src, mut src_rx) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    app.core().sessions.insert(src);

    let r = app.events().publish("alpha/ping", ping("ping-pong")).await.unwrap();
    assert_eq!(r, PublishReport { skipped: 1, offline: 1, ..Default::default() });
    assert!(common::next_json(&mut src_rx).is_none());
}

#[tokio::test]
async fn unregistered_publisher_is_dropped() {
    let (app, store) = gateway();
    common::go_online(&store, "beta/pong", common::ping_pong_handler()).await;
    let (dst, mut dst_rx) = common::ready_session("beta/pong", "r-beta", "beta");
    app.core().sessions.insert(dst);

    let r = app.events().publish("alpha/ping", ping("ping-pong")).await.unwrap();
    assert_eq!(r, PublishReport::default());
    assert!(common::next_json(&mut dst_rx).is_none());
}

#[tokio::test]
async fn dispatcher_routes_event_publish_and_rejects_unknown_types() {
    let (app, store) = gateway();
    common::go_online(&store, "beta/pong", common::ping_pong_handler()).await;
    let (src, _r) = common::ready_session("alpha/ping", "r-alpha", "alpha");
    let (dst, mut dst_rx) = common::ready_session("beta/pong", "r-beta", "beta");
    app.core().sessions.insert(src.clone());
    app.core().sessions.insert(dst);

    let ctx = RouteCtx::new(src);
    let frame = Frame::new("event-publish", &ping("ping-pong")).unwrap();
    app.dispatcher().dispatch(ctx.clone(), frame).await.unwrap();
    assert!(common::next_json(&mut dst_rx).is_some());

    let bad = Frame { frame_type: "agent-invoke".into(), payload: json!({}) };
    let err = app.dispatcher().dispatch(ctx.clone(), bad).await.unwrap_err();
    assert_eq!(err.client_code().as_str(), "PROTOCOL_VIOLATION");

    let malformed = Frame { frame_type: "event-publish".into(), payload: json!({ "topic": 1 }) };
    let err = app.dispatcher().dispatch(ctx, malformed).await.unwrap_err();
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
    assert!(!err.is_terminal());

    assert_eq!(app.dispatcher().registered_types(), vec!["event-publish", "service-call", "service-response"]);
}
