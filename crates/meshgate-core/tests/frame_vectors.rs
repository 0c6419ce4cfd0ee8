//! Frame envelope vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::fs;

use meshgate_core::error::ClientCode;
use meshgate_core::model::{OperationSet, Policy, RuleDirection};
use meshgate_core::protocol::frame::{
    types, EventPublish, Frame, MemberHandshake, ServiceCall, ServiceResponse,
};

fn load(name: &str) -> String {
    fs::read_to_string(format!("tests/vectors/{name}")).unwrap()
}

#[test]
fn parse_handshake_full() {
    let frame = Frame::parse(&load("handshake_full.json")).unwrap();
    assert_eq!(frame.frame_type, types::MEMBER_HANDSHAKE);

    let hs: MemberHandshake = frame.decode_payload().unwrap();
    assert_eq!(hs.member_id, "beta/pong");
    assert_eq!(hs.contract_version.as_deref(), Some("1.0.0"));
    assert!(hs.capabilities.handles_event("test.ping-pong", "Ping", "ping-pong"));
    assert!(!hs.capabilities.handles_event("test.ping-pong", "Ping", "other"));
    assert!(hs.capabilities.provides_service("test.ping-pong", "echo"));
    hs.capabilities.validate().unwrap();
}

#[test]
fn service_call_accepts_service_alias() {
    let frame = Frame::parse(&load("service_call_alias.json")).unwrap();
    let call: ServiceCall = frame.decode_payload().unwrap();
    assert_eq!(call.service_name, "add");
    assert_eq!(call.timeout, None);
    assert_eq!(call.input["b"], 2);
}

#[test]
fn event_publish_payload_defaults_to_null() {
    let frame = Frame::parse(&load("event_publish_min.json")).unwrap();
    let ev: EventPublish = frame.decode_payload().unwrap();
    assert_eq!(ev.event_name, "Ping");
    assert!(ev.payload.is_null());
}

#[test]
fn malformed_json_is_protocol_violation() {
    let err = Frame::parse("{\"type\": ").unwrap_err();
    assert_eq!(err.client_code(), ClientCode::ProtocolViolation);
    assert!(err.is_terminal());
}

#[test]
fn wrong_payload_shape_is_bad_request() {
    let frame = Frame::parse(r#"{"type":"service-call","payload":{"capability":"x"}}"#).unwrap();
    let err = frame.decode_payload::<ServiceCall>().unwrap_err();
    assert_eq!(err.client_code(), ClientCode::BadRequest);
    assert!(!err.is_terminal());
}

#[test]
fn synthesized_failure_has_code_and_message() {
    let resp = ServiceResponse::failure("req-9", "TIMEOUT", "no response within 50ms");
    let v = serde_json::to_value(&resp).unwrap();
    assert_eq!(v["requestId"], "req-9");
    assert_eq!(v["error"]["code"], "TIMEOUT");
    assert!(v.get("result").is_none());
}

#[test]
fn policy_rules_parse_both_operation_forms() {
    let policy: Policy = serde_json::from_str(&load("policy_rules.json")).unwrap();
    let cfg = policy.capability_access().unwrap().unwrap();
    assert_eq!(cfg.rules.len(), 2);

    let first = &cfg.rules[0];
    assert_eq!(first.direction, RuleDirection::Bidirectional);
    assert!(first.allow_from.child_realms);
    assert!(first.allow_to.as_ref().unwrap().child_realms);

    let second = &cfg.rules[1];
    assert_eq!(second.operations, Some(OperationSet::One("*".into())));
    assert_eq!(second.allow_from.realm_ids, vec!["r-audit".to_string()]);
    assert!(second.allow_to.is_none());
}

#[test]
fn non_capability_policy_yields_no_rules() {
    let policy: Policy = serde_json::from_str(
        r#"{"name":"rate","type":"rate-limit","config":{"rps":10}}"#,
    )
    .unwrap();
    assert!(policy.capability_access().unwrap().is_none());
}
