#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Arc;

use axum::extract::ws::Message;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::mpsc;

use meshgate_core::model::MemberStatus;
use meshgate_core::protocol::manifest::CapabilityManifest;
use meshgate_gateway::auth::SessionClaims;
use meshgate_gateway::config::{self, GatewayConfig};
use meshgate_gateway::realtime::Session;
use meshgate_gateway::store::{MemoryStore, RecordStore};

pub const SECRET: &str = "test-secret";

/// root
/// ├── alpha            (+ allow-ping-pong-any, inherits)
/// │   └── alpha.kids   (inherits)
/// ├── beta             (+ allow-ping-pong-any, inherits)
/// └── gamma            (no policies, does not inherit)
/// empty-parent
/// └── empty-parent.child (inherits nothing useful)
pub const SEED: &str = r#"
realms:
  - id: r-root
    realmKey: root
    policies: [allow-child-realms-all]
  - id: r-alpha
    realmKey: alpha
    parentId: r-root
    policies: [allow-ping-pong-any]
    inheritPolicies: true
  - id: r-kids
    realmKey: alpha.kids
    parentId: r-alpha
    inheritPolicies: true
  - id: r-beta
    realmKey: beta
    parentId: r-root
    policies: [allow-ping-pong-any]
    inheritPolicies: true
  - id: r-gamma
    realmKey: gamma
    parentId: r-root
  - id: r-empty
    realmKey: empty-parent
  - id: r-empty-child
    realmKey: empty-parent.child
    parentId: r-empty
    inheritPolicies: true
policies:
  - name: allow-child-realms-all
    type: capability-access
    config:
      rules:
        - capability: "*"
          direction: bidirectional
          allowFrom: { childRealms: true }
          allowTo: { childRealms: true }
  - name: allow-ping-pong-any
    type: capability-access
    config:
      rules:
        - capability: test.ping-pong
          direction: bidirectional
          allowFrom: { anyRealm: true }
members:
  - id: alpha/ping
    realmId: r-alpha
  - id: beta/pong
    realmId: r-beta
  - id: gamma/math
    realmId: r-gamma
  - id: alpha/caller
    realmId: r-alpha
  - id: alpha.kids/math
    realmId: r-kids
  - id: gamma/listener
    realmId: r-gamma
  - id: empty-parent.child/lonely
    realmId: r-empty-child
"#;

pub fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::load_from_str(SEED).expect("seed"))
}

pub fn config() -> GatewayConfig {
    config::load_from_str(&format!(
        r#"
version: 1
gateway:
  listen: "127.0.0.1:0"
  ping_interval_ms: 1000
  heartbeat_timeout_ms: 10000
  handshake_timeout_ms: 500
  outbound_queue: 64
  write_timeout_ms: 500
auth:
  jwt_secret: "{SECRET}"
routing:
  default_call_timeout_ms: 2000
  max_call_timeout_ms: 10000
monitor:
  enabled: true
  buffer_size: 50
"#
    ))
    .expect("config")
}

pub fn token(member_id: &str, realm_id: &str) -> String {
    token_with(member_id, realm_id, SECRET, 3600)
}

pub fn token_with(member_id: &str, realm_id: &str, secret: &str, ttl_secs: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = SessionClaims {
        member_id: member_id.into(),
        realm_id: realm_id.into(),
        exp: (now + ttl_secs).max(0) as u64,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
}

pub fn manifest(v: Value) -> CapabilityManifest {
    serde_json::from_value(v).unwrap()
}

pub fn ping_pong_handler() -> CapabilityManifest {
    manifest(json!({
        "eventHandlers": [
            { "capability": "test.ping-pong", "eventName": "Ping", "topic": "ping-pong" }
        ]
    }))
}

pub fn math_provider() -> CapabilityManifest {
    manifest(json!({
        "provides": { "services": [ { "capability": "math", "name": "add" } ] }
    }))
}

/// Mark the member online with `contract`, as a completed handshake would.
pub async fn go_online(store: &MemoryStore, member_id: &str, contract: CapabilityManifest) {
    store
        .set_declared_contract(member_id, contract, None, None)
        .await
        .unwrap();
    store.set_member_status(member_id, MemberStatus::Online).await.unwrap();
}

/// A handshaken session whose outbound queue the test reads directly.
pub fn ready_session(member_id: &str, realm_id: &str, realm_key: &str) -> (Arc<Session>, mpsc::Receiver<Message>) {
    let (tx, rx) = mpsc::channel(64);
    let s = Arc::new(Session::new(member_id, realm_id, realm_key, tx));
    s.mark_ready();
    (s, rx)
}

/// Next queued text frame as JSON, if any.
pub fn next_json(rx: &mut mpsc::Receiver<Message>) -> Option<Value> {
    loop {
        match rx.try_recv().ok()? {
            Message::Text(t) => return Some(serde_json::from_str(&t).unwrap()),
            _ => continue,
        }
    }
}
