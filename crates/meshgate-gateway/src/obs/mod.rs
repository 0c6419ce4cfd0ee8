//! Observability: Prometheus-style metrics and the activity monitor feed.

pub mod activity;
pub mod metrics;

pub use activity::{ActivityEvent, ActivityKind, ActivityLevel, ActivityMonitor, MonitorStats};
pub use metrics::MeshMetrics;
