//! Frame envelope and typed payloads.
//!
//! The envelope keeps `payload` as a `serde_json::Value` so the dispatcher can
//! route on `type` before a handler commits to a payload schema.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{MeshError, Result};
use crate::protocol::manifest::CapabilityManifest;

/// Frame `type` discriminators.
pub mod types {
    pub const MEMBER_HANDSHAKE: &str = "member-handshake";
    pub const MEMBER_HANDSHAKE_ACK: &str = "member-handshake-ack";
    pub const EVENT_PUBLISH: &str = "event-publish";
    pub const EVENT: &str = "event";
    pub const SERVICE_CALL: &str = "service-call";
    pub const SERVICE_REQUEST: &str = "service-request";
    pub const SERVICE_RESPONSE: &str = "service-response";
    pub const ERROR: &str = "error";
}

/// `{type, payload}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl Frame {
    pub fn new<T: Serialize>(frame_type: &str, payload: &T) -> Result<Self> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| MeshError::Internal(format!("encode {frame_type} payload: {e}")))?;
        Ok(Self { frame_type: frame_type.to_string(), payload })
    }

    /// Parse a text frame. Malformed JSON is a protocol violation.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| MeshError::ProtocolViolation(format!("invalid frame json: {e}")))
    }

    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| MeshError::BadRequest(format!("invalid {} payload: {e}", self.frame_type)))
    }

    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| MeshError::Internal(format!("encode frame: {e}")))
    }

    /// Out-of-band `error` frame.
    pub fn error(code: &str, message: impl Into<String>, details: Option<Value>) -> Self {
        let payload = ErrorPayload { code: code.to_string(), message: message.into(), details };
        Self {
            frame_type: types::ERROR.to_string(),
            payload: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }
}

/// `member-handshake` (client -> gateway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberHandshake {
    pub member_id: String,
    pub realm_id: String,
    #[serde(default)]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub contract_version: Option<String>,
    pub capabilities: CapabilityManifest,
}

/// `member-handshake-ack` (gateway -> client).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeAck {
    pub member_id: String,
    pub status: String,
    #[serde(default)]
    pub policies: Vec<String>,
    #[serde(default)]
    pub directory: Directory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What is reachable on the mesh at handshake time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Directory {
    /// capability -> service names.
    #[serde(default)]
    pub available_services: std::collections::BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub available_capabilities: Vec<String>,
}

/// `event-publish` (client -> gateway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPublish {
    pub capability: String,
    pub event_name: String,
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

/// `event` (gateway -> subscriber).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDelivery {
    pub capability: String,
    pub event_name: String,
    pub topic: String,
    pub payload: Value,
    pub source_member_id: String,
    pub source_realm_id: String,
    pub timestamp: String,
}

/// `service-call` (client -> gateway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCall {
    pub request_id: String,
    pub capability: String,
    #[serde(alias = "service")]
    pub service_name: String,
    #[serde(default)]
    pub input: Value,
    /// Milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// `service-request` (gateway -> provider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub request_id: String,
    pub capability: String,
    pub service_name: String,
    pub input: Value,
    pub source_member_id: String,
    pub source_realm_id: String,
}

/// `service-response` (provider -> gateway -> caller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

impl ServiceResponse {
    /// Gateway-synthesized failure (`{code, message}` error body).
    pub fn failure(request_id: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            result: None,
            error: Some(serde_json::json!({ "code": code, "message": message.into() })),
        }
    }
}

/// `error` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
