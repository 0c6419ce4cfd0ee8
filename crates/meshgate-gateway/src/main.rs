//! meshgate gateway binary.
//!
//! - Member endpoint: /gateway?token=...
//! - Activity stream: /monitor
//! - Ops: /healthz, /readyz, /metrics, /v1/status
//!
//! Config path comes from `MESHGATE_CONFIG` (default `meshgate.yaml`).

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{fmt, EnvFilter};

use meshgate_gateway::{app_state, config, router, store::MemoryStore};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let path = std::env::var("MESHGATE_CONFIG").unwrap_or_else(|_| "meshgate.yaml".to_string());
    let cfg = config::load_from_file(&path).expect("config load failed");
    let listen: SocketAddr = cfg
        .gateway
        .listen
        .parse()
        .expect("gateway.listen must be a valid SocketAddr");

    let store = match cfg.store.seed_path.as_deref() {
        Some(seed) => MemoryStore::load_from_file(seed).expect("store seed load failed"),
        None => MemoryStore::new(),
    };

    let state = app_state::AppState::new(cfg, Arc::new(store)).expect("gateway state init failed");
    let app = router::build_router(state.clone());

    tracing::info!(%listen, config = %path, "meshgate-gateway starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested; draining");
            state.set_draining();
        })
        .await
        .expect("server failed");
}
