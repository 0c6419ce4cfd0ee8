//! Shared error type across meshgate crates.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid input / malformed payload.
    BadRequest,
    /// Session token missing, invalid, or expired.
    AuthFailed,
    /// Capability manifest rejected.
    HandshakeFailed,
    /// A provider or subscriber exists but access is not granted.
    PolicyDenied,
    /// No member declares the requested capability/service.
    ServiceNotFound,
    /// Declared provider is not currently connected.
    TargetOffline,
    /// Deadline elapsed (service call, handshake, heartbeat).
    Timeout,
    /// Unknown frame type, binary frame, or disallowed transport extension.
    ProtocolViolation,
    /// Admission rate limited.
    RateLimited,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Record store failure.
    StoreError,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON frames.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::AuthFailed => "AUTH_FAILED",
            ClientCode::HandshakeFailed => "HANDSHAKE_FAILED",
            ClientCode::PolicyDenied => "POLICY_DENIED",
            ClientCode::ServiceNotFound => "SERVICE_NOT_FOUND",
            ClientCode::TargetOffline => "TARGET_OFFLINE",
            ClientCode::Timeout => "TIMEOUT",
            ClientCode::ProtocolViolation => "PROTOCOL_VIOLATION",
            ClientCode::RateLimited => "RATE_LIMITED",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::StoreError => "STORE_ERROR",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MeshError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("admission refused: {0}")]
    Admission(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("policy denied: {0}")]
    PolicyDenied(String),
    #[error("service not found: {0}")]
    ServiceNotFound(String),
    #[error("target offline: {0}")]
    TargetOffline(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("rate limited")]
    RateLimited,
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("store: {0}")]
    Store(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl MeshError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            MeshError::BadRequest(_) => ClientCode::BadRequest,
            MeshError::Admission(_) => ClientCode::AuthFailed,
            MeshError::Handshake(_) => ClientCode::HandshakeFailed,
            MeshError::PolicyDenied(_) => ClientCode::PolicyDenied,
            MeshError::ServiceNotFound(_) => ClientCode::ServiceNotFound,
            MeshError::TargetOffline(_) => ClientCode::TargetOffline,
            MeshError::Timeout(_) => ClientCode::Timeout,
            MeshError::ProtocolViolation(_) => ClientCode::ProtocolViolation,
            MeshError::RateLimited => ClientCode::RateLimited,
            MeshError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            MeshError::Store(_) => ClientCode::StoreError,
            MeshError::Internal(_) => ClientCode::Internal,
        }
    }

    /// Whether the error ends the connection it occurred on.
    ///
    /// Routing errors are reported to the originator only; admission and
    /// protocol errors close the transport.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MeshError::Admission(_) | MeshError::ProtocolViolation(_) | MeshError::Internal(_)
        )
    }
}
