//! Operational HTTP endpoints.
//!
//! - `/healthz`   : liveness
//! - `/readyz`    : readiness (503 when draining)
//! - `/metrics`   : Prometheus text format
//! - `/v1/status` : live sessions and table sizes (JSON)

use std::collections::BTreeSet;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::SecondsFormat;
use serde::Serialize;

use crate::app_state::AppState;
use crate::obs::MonitorStats;

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_draining() {
        (StatusCode::SERVICE_UNAVAILABLE, "draining")
    } else {
        (StatusCode::OK, "ready")
    }
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render(&state.metrics_extra());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub member_id: String,
    pub realm_id: String,
    pub realm_key: String,
    pub session_id: String,
    pub connected_at: String,
    pub ready: bool,
    /// Capabilities the member declared as provided at handshake.
    pub capabilities: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub draining: bool,
    pub sessions: Vec<SessionStatus>,
    pub pending_requests: usize,
    pub monitor: MonitorStats,
}

pub async fn status(State(state): State<AppState>) -> Json<GatewayStatus> {
    let core = state.core();
    let mut sessions: Vec<SessionStatus> = core
        .sessions
        .snapshot()
        .into_iter()
        .map(|s| SessionStatus {
            member_id: s.member_id().to_string(),
            realm_id: s.realm_id().to_string(),
            realm_key: s.realm_key().to_string(),
            session_id: s.id().to_string(),
            connected_at: s.connected_at().to_rfc3339_opts(SecondsFormat::Millis, true),
            ready: s.is_ready(),
            capabilities: s
                .manifest()
                .map(|m| {
                    let caps: BTreeSet<&str> = m.provided_capabilities().collect();
                    caps.into_iter().map(str::to_string).collect()
                })
                .unwrap_or_default(),
        })
        .collect();
    sessions.sort_by(|a, b| a.member_id.cmp(&b.member_id));

    Json(GatewayStatus {
        draining: state.is_draining(),
        sessions,
        pending_requests: core.pending.len(),
        monitor: state.activity().stats(),
    })
}
