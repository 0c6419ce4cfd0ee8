//! In-process metrics registry rendered in Prometheus text format.
//!
//! Labelled counters, gauges and a fixed-bucket latency histogram, each keyed
//! by a sorted label set in a `DashMap`.

use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;

type LabelKey = Vec<(String, String)>;

fn key_of(labels: &[(&str, &str)]) -> LabelKey {
    let mut key: LabelKey = labels
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    key.sort();
    key
}

fn fmt_labels(key: &LabelKey) -> String {
    key.iter()
        .map(|(k, v)| {
            let v = v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n");
            format!("{k}=\"{v}\"")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn sample_line(out: &mut String, name: &str, labels: &str, value: impl std::fmt::Display) {
    if labels.is_empty() {
        let _ = writeln!(out, "{name} {value}");
    } else {
        let _ = writeln!(out, "{name}{{{labels}}} {value}");
    }
}

#[derive(Default)]
pub struct CounterVec {
    map: DashMap<LabelKey, AtomicU64>,
}

impl CounterVec {
    pub fn inc(&self, labels: &[(&str, &str)]) {
        self.add(labels, 1);
    }

    pub fn add(&self, labels: &[(&str, &str)], v: u64) {
        self.map
            .entry(key_of(labels))
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    /// Current value for an exact label set (0 if never touched).
    pub fn get(&self, labels: &[(&str, &str)]) -> u64 {
        self.map
            .get(&key_of(labels))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} counter");
        for r in self.map.iter() {
            sample_line(out, name, &fmt_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

#[derive(Default)]
pub struct GaugeVec {
    map: DashMap<LabelKey, AtomicI64>,
}

impl GaugeVec {
    pub fn inc(&self, labels: &[(&str, &str)]) { self.add(labels, 1); }
    pub fn dec(&self, labels: &[(&str, &str)]) { self.add(labels, -1); }

    pub fn add(&self, labels: &[(&str, &str)], v: i64) {
        self.map
            .entry(key_of(labels))
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(v, Ordering::Relaxed);
    }

    pub fn get(&self, labels: &[(&str, &str)]) -> i64 {
        self.map
            .get(&key_of(labels))
            .map(|g| g.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} gauge");
        for r in self.map.iter() {
            sample_line(out, name, &fmt_labels(r.key()), r.value().load(Ordering::Relaxed));
        }
    }
}

/// Bucket upper bounds in microseconds: 100us .. 1s.
const BUCKETS_MICROS: [u64; 9] = [100, 500, 1_000, 5_000, 10_000, 50_000, 100_000, 500_000, 1_000_000];

#[derive(Default)]
struct Histogram {
    count: AtomicU64,
    sum_micros: AtomicU64,
    buckets: [AtomicU64; BUCKETS_MICROS.len()],
}

#[derive(Default)]
pub struct HistogramVec {
    map: DashMap<LabelKey, Histogram>,
}

impl HistogramVec {
    pub fn observe(&self, labels: &[(&str, &str)], elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        let h = self.map.entry(key_of(labels)).or_default();
        h.count.fetch_add(1, Ordering::Relaxed);
        h.sum_micros.fetch_add(micros, Ordering::Relaxed);
        for (slot, &le) in h.buckets.iter().zip(BUCKETS_MICROS.iter()) {
            if micros <= le {
                slot.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// `le` values are integer microseconds.
    fn render(&self, name: &str, help: &str, out: &mut String) {
        let _ = writeln!(out, "# HELP {name} {help}\n# TYPE {name} histogram");
        for r in self.map.iter() {
            let labels = fmt_labels(r.key());
            let sep = if labels.is_empty() { "" } else { "," };
            let h = r.value();
            for (slot, &le) in h.buckets.iter().zip(BUCKETS_MICROS.iter()) {
                let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"{le}\"}} {}", slot.load(Ordering::Relaxed));
            }
            let count = h.count.load(Ordering::Relaxed);
            let _ = writeln!(out, "{name}_bucket{{{labels}{sep}le=\"+Inf\"}} {count}");
            sample_line(out, &format!("{name}_sum"), &labels, h.sum_micros.load(Ordering::Relaxed));
            sample_line(out, &format!("{name}_count"), &labels, count);
        }
    }
}

/// Gateway-wide metric set.
#[derive(Default)]
pub struct MeshMetrics {
    /// `result`: accepted | rate_limited | unauthorized | draining
    pub upgrades: CounterVec,
    pub active_sessions: GaugeVec,
    /// `result`: accepted | rejected
    pub handshakes: CounterVec,
    pub superseded_sessions: CounterVec,
    /// `reason`: unknown_type | invalid_json | binary | transport | handshake_required
    pub protocol_violations: CounterVec,
    /// `kind`: service | event, `allowed`: true | false
    pub policy_decisions: CounterVec,
    /// `outcome`: delivered | blocked | offline | dropped
    pub event_deliveries: CounterVec,
    /// `outcome`: forwarded | not_found | denied | offline | timeout | completed | duplicate
    pub service_calls: CounterVec,
    /// `frame_type`
    pub dispatch_duration: HistogramVec,
    draining: AtomicBool,
}

impl MeshMetrics {
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }

    /// Render every metric plus caller-provided point-in-time gauges.
    pub fn render(&self, extra: &[(&str, u64)]) -> String {
        let mut out = String::new();
        self.upgrades.render("meshgate_ws_upgrades_total", "Gateway upgrade attempts by result.", &mut out);
        self.active_sessions.render("meshgate_sessions_active", "Connected member sessions.", &mut out);
        self.handshakes.render("meshgate_handshakes_total", "Member handshakes by result.", &mut out);
        self.superseded_sessions.render("meshgate_sessions_superseded_total", "Sessions replaced by a newer connection.", &mut out);
        self.protocol_violations.render("meshgate_protocol_violations_total", "Connections closed for protocol violations.", &mut out);
        self.policy_decisions.render("meshgate_policy_decisions_total", "Capability access decisions.", &mut out);
        self.event_deliveries.render("meshgate_event_deliveries_total", "Event fanout outcomes per candidate.", &mut out);
        self.service_calls.render("meshgate_service_calls_total", "Service call outcomes.", &mut out);
        self.dispatch_duration.render("meshgate_dispatch_duration_micros", "Frame handling latency.", &mut out);

        let _ = writeln!(
            out,
            "# TYPE meshgate_draining gauge\nmeshgate_draining {}",
            u8::from(self.is_draining())
        );
        for (k, v) in extra {
            let _ = writeln!(out, "# TYPE {k} gauge\n{k} {v}");
        }
        out
    }
}
