use serde::Deserialize;
use meshgate_core::error::{MeshError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    pub auth: AuthSection,

    #[serde(default)]
    pub routing: RoutingSection,

    #[serde(default)]
    pub monitor: MonitorSection,

    #[serde(default)]
    pub admission_limits: AdmissionLimits,

    #[serde(default)]
    pub store: StoreSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MeshError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.auth.validate()?;
        self.routing.validate()?;

        if self.monitor.buffer_size == 0 {
            return Err(MeshError::BadRequest("monitor.buffer_size must be > 0".into()));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Interval between server pings.
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    /// Close when no heartbeat ack arrived within this window.
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    /// Window for the first `member-handshake` frame.
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    /// Per-session outbound queue depth.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Upper bound for reliable writes into a session queue.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            outbound_queue: default_outbound_queue(),
            max_frame_bytes: default_max_frame_bytes(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(1000..=120000).contains(&self.ping_interval_ms) {
            return Err(MeshError::BadRequest(
                "gateway.ping_interval_ms must be between 1000 and 120000".into(),
            ));
        }
        if self.heartbeat_timeout_ms <= self.ping_interval_ms {
            return Err(MeshError::BadRequest(
                "gateway.heartbeat_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.heartbeat_timeout_ms > 600000 {
            return Err(MeshError::BadRequest(
                "gateway.heartbeat_timeout_ms must be at most 600000".into(),
            ));
        }
        if !(100..=120000).contains(&self.handshake_timeout_ms) {
            return Err(MeshError::BadRequest(
                "gateway.handshake_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(MeshError::BadRequest("gateway.outbound_queue must be > 0".into()));
        }
        if self.max_frame_bytes < 1024 {
            return Err(MeshError::BadRequest("gateway.max_frame_bytes must be >= 1024".into()));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    10000
}
fn default_heartbeat_timeout_ms() -> u64 {
    30000
}
fn default_handshake_timeout_ms() -> u64 {
    15000
}
fn default_outbound_queue() -> usize {
    1024
}
fn default_max_frame_bytes() -> usize {
    1024 * 1024
}
fn default_write_timeout_ms() -> u64 {
    1500
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// HS256 secret shared with the token issuer.
    pub jwt_secret: String,
    #[serde(default)]
    pub leeway_secs: u64,
}

impl AuthSection {
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.trim().is_empty() {
            return Err(MeshError::BadRequest("auth.jwt_secret must not be empty".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingSection {
    /// Used when a `service-call` carries no `timeout`.
    #[serde(default = "default_call_timeout_ms")]
    pub default_call_timeout_ms: u64,
    /// Caller-supplied timeouts are clamped to this.
    #[serde(default = "default_max_call_timeout_ms")]
    pub max_call_timeout_ms: u64,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            default_call_timeout_ms: default_call_timeout_ms(),
            max_call_timeout_ms: default_max_call_timeout_ms(),
        }
    }
}

impl RoutingSection {
    pub fn validate(&self) -> Result<()> {
        if self.default_call_timeout_ms == 0 {
            return Err(MeshError::BadRequest(
                "routing.default_call_timeout_ms must be > 0".into(),
            ));
        }
        if self.max_call_timeout_ms < self.default_call_timeout_ms {
            return Err(MeshError::BadRequest(
                "routing.max_call_timeout_ms must be >= default_call_timeout_ms".into(),
            ));
        }
        Ok(())
    }
}

fn default_call_timeout_ms() -> u64 {
    30000
}
fn default_max_call_timeout_ms() -> u64 {
    300000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    /// Broadcast to `/monitor` subscribers from start-up.
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self { enabled: false, buffer_size: default_buffer_size() }
    }
}

fn default_buffer_size() -> usize {
    100
}

/// Pre-upgrade leaky-bucket limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionLimits {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_global_rps")]
    pub global_rps: u32,
    #[serde(default = "default_global_burst")]
    pub global_burst: u32,
    #[serde(default = "default_per_ip_rps")]
    pub per_ip_rps: u32,
    #[serde(default = "default_per_ip_burst")]
    pub per_ip_burst: u32,
    #[serde(default = "default_max_ip_entries")]
    pub max_ip_entries: usize,
}

impl Default for AdmissionLimits {
    fn default() -> Self {
        Self {
            enabled: false,
            global_rps: default_global_rps(),
            global_burst: default_global_burst(),
            per_ip_rps: default_per_ip_rps(),
            per_ip_burst: default_per_ip_burst(),
            max_ip_entries: default_max_ip_entries(),
        }
    }
}

fn default_global_rps() -> u32 {
    500
}
fn default_global_burst() -> u32 {
    1000
}
fn default_per_ip_rps() -> u32 {
    10
}
fn default_per_ip_burst() -> u32 {
    20
}
fn default_max_ip_entries() -> usize {
    100_000
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    /// YAML directory (realms/policies/members) for the in-memory store.
    #[serde(default)]
    pub seed_path: Option<String>,
}
