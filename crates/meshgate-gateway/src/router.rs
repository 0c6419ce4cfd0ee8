//! Axum router wiring.
//!
//! `/gateway` is the member endpoint, `/monitor` the diagnostic stream; the
//! rest are operational.

use axum::{routing::get, Router};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/gateway", get(transport::ws::gateway_upgrade))
        .route("/monitor", get(transport::monitor::monitor_upgrade))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route("/v1/status", get(ops::status))
        .with_state(state)
}
