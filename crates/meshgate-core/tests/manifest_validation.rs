//! Capability manifest schema checks.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use meshgate_core::error::ClientCode;
use meshgate_core::model::{Direction, OperationSet, RuleDirection};
use meshgate_core::protocol::manifest::{
    CapabilityManifest, EventHandlerDescriptor, ServiceDescriptor,
};

fn service(cap: &str, name: &str) -> ServiceDescriptor {
    ServiceDescriptor { capability: cap.into(), name: name.into(), description: None }
}

#[test]
fn empty_manifest_is_valid() {
    CapabilityManifest::default().validate().unwrap();
}

#[test]
fn provided_capability_rejects_wildcards_and_empty_segments() {
    let mut m = CapabilityManifest::default();
    m.provides.services.push(service("test.*", "echo"));
    assert_eq!(m.validate().unwrap_err().client_code(), ClientCode::HandshakeFailed);

    let mut m = CapabilityManifest::default();
    m.provides.services.push(service("test..echo", "echo"));
    assert!(m.validate().is_err());

    let mut m = CapabilityManifest::default();
    m.provides.services.push(service("test.echo", "  "));
    assert!(m.validate().is_err());
}

#[test]
fn required_capability_may_use_wildcards() {
    let mut m = CapabilityManifest::default();
    m.requires.capabilities.push("test.*".into());
    m.requires.capabilities.push("*".into());
    m.validate().unwrap();
}

#[test]
fn handler_topic_is_required() {
    let mut m = CapabilityManifest::default();
    m.event_handlers.push(EventHandlerDescriptor {
        capability: "test.ping-pong".into(),
        event_name: "Ping".into(),
        topic: String::new(),
    });
    assert!(m.validate().is_err());
}

#[test]
fn provided_capabilities_cover_services_and_events() {
    let m: CapabilityManifest = serde_json::from_value(serde_json::json!({
        "provides": {
            "services": [{ "capability": "math.basic", "name": "add" }],
            "events": [{ "capability": "test.ping-pong", "name": "Ping", "topic": "ping-pong" }]
        }
    }))
    .unwrap();
    let caps: Vec<&str> = m.provided_capabilities().collect();
    assert_eq!(caps, vec!["math.basic", "test.ping-pong"]);
    assert!(!m.has_event_handlers());
}

#[test]
fn direction_and_operation_helpers() {
    assert_eq!(Direction::between("r1", "r1"), Direction::Inbound);
    assert_eq!(Direction::between("r1", "r2"), Direction::Outbound);
    assert!(RuleDirection::Bidirectional.admits(Direction::Inbound));
    assert!(!RuleDirection::Inbound.admits(Direction::Outbound));

    let ops = OperationSet::Many(vec!["Ping".into()]);
    assert!(ops.admits("Ping"));
    assert!(!ops.admits("Pong"));
    assert!(!OperationSet::Many(vec![]).admits("Ping"));
    assert!(OperationSet::One("*".into()).admits("anything"));
}
