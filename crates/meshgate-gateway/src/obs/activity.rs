//! Diagnostic activity feed.
//!
//! A bounded ring buffer of recent gateway activity plus a broadcast channel
//! for live `/monitor` subscribers. Writes never block and never fail; a
//! lagging subscriber just misses entries.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;

use meshgate_core::protocol::manifest::CapabilityManifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Connection,
    Disconnection,
    Handshake,
    Message,
    Event,
    Routing,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub level: ActivityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ActivityEvent {
    pub fn new(kind: ActivityKind, level: ActivityLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
            level,
            member_id: None,
            realm_id: None,
            message: message.into(),
            data: None,
        }
    }

    pub fn member(mut self, member_id: &str) -> Self {
        self.member_id = Some(member_id.to_string());
        self
    }

    pub fn realm(mut self, realm_id: &str) -> Self {
        self.realm_id = Some(realm_id.to_string());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStats {
    pub enabled: bool,
    pub subscribers: usize,
    pub buffer_size: usize,
    pub max_buffer_size: usize,
}

pub struct ActivityMonitor {
    enabled: AtomicBool,
    capacity: usize,
    buffer: Mutex<VecDeque<ActivityEvent>>,
    live: broadcast::Sender<ActivityEvent>,
}

impl ActivityMonitor {
    pub fn new(enabled: bool, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (live, _) = broadcast::channel(capacity);
        Self {
            enabled: AtomicBool::new(enabled),
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            live,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
        self.log(ActivityEvent::new(ActivityKind::Connection, ActivityLevel::Info, "activity monitoring enabled"));
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
        self.log(ActivityEvent::new(ActivityKind::Connection, ActivityLevel::Info, "activity monitoring disabled"));
    }

    /// Buffer always; broadcast only while enabled.
    pub fn log(&self, event: ActivityEvent) {
        if let Ok(mut buf) = self.buffer.lock() {
            if buf.len() == self.capacity {
                buf.pop_front();
            }
            buf.push_back(event.clone());
        }
        if self.is_enabled() {
            let _ = self.live.send(event);
        }
    }

    /// Snapshot of the ring buffer plus a receiver for what follows.
    pub fn subscribe(&self) -> (Vec<ActivityEvent>, broadcast::Receiver<ActivityEvent>) {
        let rx = self.live.subscribe();
        let history = self
            .buffer
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default();
        (history, rx)
    }

    pub fn history(&self) -> Vec<ActivityEvent> {
        self.buffer
            .lock()
            .map(|b| b.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            enabled: self.is_enabled(),
            subscribers: self.live.receiver_count(),
            buffer_size: self.buffer.lock().map(|b| b.len()).unwrap_or(0),
            max_buffer_size: self.capacity,
        }
    }

    pub fn connection(&self, member_id: &str, realm_id: &str) {
        self.log(
            ActivityEvent::new(
                ActivityKind::Connection,
                ActivityLevel::Info,
                format!("member connected: {member_id} (realm: {realm_id})"),
            )
            .member(member_id)
            .realm(realm_id),
        );
    }

    pub fn disconnection(&self, member_id: &str) {
        self.log(
            ActivityEvent::new(
                ActivityKind::Disconnection,
                ActivityLevel::Info,
                format!("member disconnected: {member_id}"),
            )
            .member(member_id),
        );
    }

    pub fn handshake(&self, member_id: &str, manifest: &CapabilityManifest) {
        self.log(
            ActivityEvent::new(
                ActivityKind::Handshake,
                ActivityLevel::Info,
                format!("handshake completed: {member_id}"),
            )
            .member(member_id)
            .data(serde_json::json!({
                "services": manifest.provides.services.len(),
                "events": manifest.provides.events.len(),
                "eventHandlers": manifest.event_handlers.len(),
            })),
        );
    }

    pub fn message(&self, member_id: &str, frame_type: &str) {
        self.log(
            ActivityEvent::new(
                ActivityKind::Message,
                ActivityLevel::Debug,
                format!("message received: {frame_type} from {member_id}"),
            )
            .member(member_id),
        );
    }

    pub fn event_published(&self, member_id: &str, realm_id: &str, capability: &str, event_name: &str, topic: &str) {
        self.log(
            ActivityEvent::new(
                ActivityKind::Event,
                ActivityLevel::Info,
                format!("event published: {capability}.{event_name} on topic '{topic}' by {member_id}"),
            )
            .member(member_id)
            .realm(realm_id),
        );
    }

    pub fn routing(&self, member_id: &str, realm_id: &str, message: impl Into<String>, data: Value) {
        self.log(
            ActivityEvent::new(ActivityKind::Routing, ActivityLevel::Info, message)
                .member(member_id)
                .realm(realm_id)
                .data(data),
        );
    }

    pub fn error(&self, member_id: Option<&str>, message: impl Into<String>, details: Option<Value>) {
        let mut ev = ActivityEvent::new(ActivityKind::Error, ActivityLevel::Error, message);
        ev.member_id = member_id.map(str::to_string);
        ev.data = details;
        self.log(ev);
    }
}
