//! Capability manifest exchanged at handshake time.
//!
//! The manifest is an explicit typed declaration of what a member provides
//! (services, events) and what it wants delivered (event handlers, required
//! capabilities). It is validated once at handshake and only then trusted by
//! the routers.

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityManifest {
    #[serde(default)]
    pub provides: Provides,
    #[serde(default)]
    pub requires: Requires,
    /// Explicit event subscriptions.
    #[serde(default)]
    pub event_handlers: Vec<EventHandlerDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Provides {
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
    #[serde(default)]
    pub events: Vec<EventDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Requires {
    /// Capability patterns (dotted wildcard) the member depends on.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub capability: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    pub capability: String,
    pub name: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventHandlerDescriptor {
    pub capability: String,
    pub event_name: String,
    pub topic: String,
}

impl CapabilityManifest {
    /// Schema checks beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        for s in &self.provides.services {
            check_capability(&s.capability, false)?;
            check_name("service name", &s.name)?;
        }
        for e in &self.provides.events {
            check_capability(&e.capability, false)?;
            check_name("event name", &e.name)?;
        }
        for h in &self.event_handlers {
            check_capability(&h.capability, false)?;
            check_name("handler event name", &h.event_name)?;
            check_name("handler topic", &h.topic)?;
        }
        for c in &self.requires.capabilities {
            check_capability(c, true)?;
        }
        Ok(())
    }

    pub fn provides_service(&self, capability: &str, service_name: &str) -> bool {
        self.provides
            .services
            .iter()
            .any(|s| s.capability == capability && s.name == service_name)
    }

    /// Exact `(capability, eventName, topic)` handler match.
    pub fn handles_event(&self, capability: &str, event_name: &str, topic: &str) -> bool {
        self.event_handlers
            .iter()
            .any(|h| h.capability == capability && h.event_name == event_name && h.topic == topic)
    }

    pub fn has_event_handlers(&self) -> bool {
        !self.event_handlers.is_empty()
    }

    /// Capabilities this member provides through services or events.
    pub fn provided_capabilities(&self) -> impl Iterator<Item = &str> {
        self.provides
            .services
            .iter()
            .map(|s| s.capability.as_str())
            .chain(self.provides.events.iter().map(|e| e.capability.as_str()))
    }
}

fn check_name(what: &str, v: &str) -> Result<()> {
    if v.trim().is_empty() {
        return Err(MeshError::Handshake(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Dotted capability name: non-empty segments of `[A-Za-z0-9_-]`, plus `*`
/// when `allow_wildcard` is set.
fn check_capability(cap: &str, allow_wildcard: bool) -> Result<()> {
    if cap.is_empty() {
        return Err(MeshError::Handshake("capability must not be empty".into()));
    }
    for seg in cap.split('.') {
        if seg.is_empty() {
            return Err(MeshError::Handshake(format!("capability {cap:?} has an empty segment")));
        }
        let ok = seg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || (allow_wildcard && c == '*'));
        if !ok {
            return Err(MeshError::Handshake(format!("capability {cap:?} has invalid characters")));
        }
    }
    Ok(())
}
