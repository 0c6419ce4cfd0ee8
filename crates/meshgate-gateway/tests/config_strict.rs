#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use meshgate_gateway::config;
use meshgate_gateway::store::{MemoryStore, RecordStore};

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
gateway:
  listen: "0.0.0.0:8080"
  ping_intervall_ms: 5000 # typo should fail
auth:
  jwt_secret: "s"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let ok = r#"
version: 1
auth:
  jwt_secret: "s"
"#;
    let cfg = config::load_from_str(ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.gateway.listen, "0.0.0.0:8080");
    assert_eq!(cfg.gateway.ping_interval_ms, 10_000);
    assert_eq!(cfg.routing.default_call_timeout_ms, 30_000);
    assert_eq!(cfg.monitor.buffer_size, 100);
    assert!(!cfg.monitor.enabled);
    assert!(!cfg.admission_limits.enabled);
    assert!(cfg.store.seed_path.is_none());
}

#[test]
fn auth_section_is_required() {
    let err = config::load_from_str("version: 1\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "BAD_REQUEST");
}

#[test]
fn unsupported_version() {
    let err = config::load_from_str("version: 2\nauth:\n  jwt_secret: s\n").expect_err("must fail");
    assert_eq!(err.client_code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn heartbeat_must_exceed_ping_interval() {
    let bad = r#"
version: 1
gateway:
  ping_interval_ms: 5000
  heartbeat_timeout_ms: 5000
auth:
  jwt_secret: "s"
"#;
    let err = config::load_from_str(bad).expect_err("must fail");
    assert!(err.to_string().contains("heartbeat_timeout_ms"));
}

#[test]
fn ping_interval_bounds() {
    for ms in [999u64, 120_001] {
        let bad = format!("version: 1\ngateway:\n  ping_interval_ms: {ms}\n  heartbeat_timeout_ms: 200000\nauth:\n  jwt_secret: s\n");
        assert!(config::load_from_str(&bad).is_err(), "{ms} accepted");
    }
}

#[test]
fn empty_secret_rejected() {
    let err = config::load_from_str("version: 1\nauth:\n  jwt_secret: \"  \"\n").expect_err("must fail");
    assert!(err.to_string().contains("jwt_secret"));
}

#[test]
fn call_timeouts_must_be_ordered() {
    let bad = r#"
version: 1
auth:
  jwt_secret: "s"
routing:
  default_call_timeout_ms: 5000
  max_call_timeout_ms: 1000
"#;
    assert!(config::load_from_str(bad).is_err());
}

#[tokio::test]
async fn store_seed_is_strict_and_starts_offline() {
    let seed = r#"
realms:
  - id: r1
    realmKey: one
members:
  - id: one/m
    realmId: r1
    status: online
"#;
    let store = MemoryStore::load_from_str(seed).unwrap();
    let m = store.member("one/m").await.unwrap().unwrap();
    assert_eq!(m.status.as_str(), "offline");
    assert!(store.online_members().await.unwrap().is_empty());
    assert_eq!(store.realm_by_key("one").await.unwrap().unwrap().id, "r1");

    let typo = "realmz: []\n";
    assert!(MemoryStore::load_from_str(typo).is_err());
}
