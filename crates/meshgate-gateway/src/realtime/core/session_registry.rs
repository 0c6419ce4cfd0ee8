use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::protocol::manifest::CapabilityManifest;

use crate::realtime::types::{PreparedMsg, QoS};

/// Why the gateway is closing a session's transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const PROTOCOL_ERROR: u16 = 1002;
    pub const SUPERSEDED: u16 = 4000;
    pub const HANDSHAKE_TIMEOUT: u16 = 4008;
    pub const HEARTBEAT_TIMEOUT: u16 = 4009;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into() }
    }

    pub fn superseded() -> Self {
        Self::new(Self::SUPERSEDED, "superseded by a newer connection")
    }
}

/// Live binding between one transport and one member.
///
/// The outbound queue (`tx`) is drained by a single writer task, so every
/// routing path writes through it and per-destination order is preserved.
pub struct Session {
    id: Uuid,
    member_id: String,
    realm_id: String,
    realm_key: String,
    tx: mpsc::Sender<Message>,
    close_tx: watch::Sender<Option<CloseReason>>,
    ready: AtomicBool,
    manifest: RwLock<Option<CapabilityManifest>>,
    connected_at: DateTime<Utc>,
    last_heartbeat: Mutex<Instant>,
}

impl Session {
    pub fn new(
        member_id: impl Into<String>,
        realm_id: impl Into<String>,
        realm_key: impl Into<String>,
        tx: mpsc::Sender<Message>,
    ) -> Self {
        let (close_tx, _) = watch::channel(None);
        Self {
            id: Uuid::new_v4(),
            member_id: member_id.into(),
            realm_id: realm_id.into(),
            realm_key: realm_key.into(),
            tx,
            close_tx,
            ready: AtomicBool::new(false),
            manifest: RwLock::new(None),
            connected_at: Utc::now(),
            last_heartbeat: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn member_id(&self) -> &str { &self.member_id }
    pub fn realm_id(&self) -> &str { &self.realm_id }
    pub fn realm_key(&self) -> &str { &self.realm_key }
    pub fn connected_at(&self) -> DateTime<Utc> { self.connected_at }

    /// Set once the handshake ack has been queued.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn set_manifest(&self, manifest: CapabilityManifest) {
        if let Ok(mut g) = self.manifest.write() {
            *g = Some(manifest);
        }
    }

    pub fn manifest(&self) -> Option<CapabilityManifest> {
        self.manifest.read().ok().and_then(|g| g.clone())
    }

    pub fn touch_heartbeat(&self) {
        if let Ok(mut g) = self.last_heartbeat.lock() {
            *g = Instant::now();
        }
    }

    pub fn since_heartbeat(&self) -> Duration {
        self.last_heartbeat
            .lock()
            .map(|g| g.elapsed())
            .unwrap_or_default()
    }

    /// Ask the session's connection task to close the transport.
    pub fn close(&self, reason: CloseReason) {
        self.close_tx.send_replace(Some(reason));
    }

    pub fn close_signal(&self) -> watch::Receiver<Option<CloseReason>> {
        self.close_tx.subscribe()
    }

    /// Enqueue without waiting. Returns false if the queue is full or closed.
    pub fn send_lossy(&self, msg: Message) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    pub async fn send_reliable(&self, msg: Message, timeout_ms: u64) -> Result<()> {
        match timeout(Duration::from_millis(timeout_ms), self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(MeshError::TargetOffline(format!(
                "{} outbound queue closed",
                self.member_id
            ))),
            Err(_) => Err(MeshError::Timeout(format!(
                "{} outbound queue full for {timeout_ms}ms",
                self.member_id
            ))),
        }
    }

    pub async fn send(&self, msg: &PreparedMsg, qos: QoS) -> Result<()> {
        match qos {
            QoS::Lossy => {
                if self.send_lossy(msg.to_ws_message()) {
                    Ok(())
                } else {
                    Err(MeshError::TargetOffline(format!("{} queue full or closed", self.member_id)))
                }
            }
            QoS::Reliable { timeout_ms } => self.send_reliable(msg.to_ws_message(), timeout_ms).await,
        }
    }
}

/// Session registry: `member_id -> Session`, at most one live entry per member.
///
/// Reads (route lookups) vastly outnumber writes (connect/disconnect); the
/// sharded map keeps fanout from serializing unrelated connections.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: DashMap::new() }
    }

    /// Register `session`; last writer wins. Returns the superseded session,
    /// which the caller must close.
    pub fn insert(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions.insert(session.member_id().to_string(), session)
    }

    pub fn get(&self, member_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(member_id).map(|r| Arc::clone(r.value()))
    }

    /// Only sessions whose handshake ack went out may receive routed traffic.
    pub fn get_ready(&self, member_id: &str) -> Option<Arc<Session>> {
        self.get(member_id).filter(|s| s.is_ready())
    }

    /// Remove the entry only if it still belongs to `session_id`
    /// (a superseding connection must not be evicted by its predecessor).
    pub fn remove_if_current(&self, member_id: &str, session_id: Uuid) -> bool {
        self.sessions
            .remove_if(member_id, |_, s| s.id() == session_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions.iter().map(|r| Arc::clone(r.value())).collect()
    }
}
