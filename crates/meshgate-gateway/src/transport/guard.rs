//! Admission guard: per-IP and global leaky buckets checked before the
//! WebSocket upgrade. Rejections become HTTP 429 with `Retry-After`.

use std::net::IpAddr;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::config::AdmissionLimits;

#[derive(Debug)]
pub struct LeakyBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last: Instant,
}

impl LeakyBucket {
    pub fn new(burst: u32, rps: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: f64::from(rps.max(1)),
            last: Instant::now(),
        }
    }

    /// Take one token, or return the seconds until one is available (>= 1).
    pub fn try_take(&mut self) -> Result<(), u64> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let wait = ((1.0 - self.tokens) / self.refill_per_sec).ceil();
            Err(wait.max(1.0) as u64)
        }
    }

    fn idle_for(&self, now: Instant) -> f64 {
        now.duration_since(self.last).as_secs_f64()
    }

    /// A bucket left alone this long is back to full and can be forgotten.
    fn refilled_at(&self, now: Instant) -> bool {
        self.tokens + self.idle_for(now) * self.refill_per_sec >= self.capacity
    }
}

#[derive(Debug)]
pub struct AdmissionGuard {
    limits: AdmissionLimits,
    global: Mutex<LeakyBucket>,
    per_ip: DashMap<IpAddr, Mutex<LeakyBucket>>,
}

impl AdmissionGuard {
    pub fn new(limits: AdmissionLimits) -> Self {
        Self {
            global: Mutex::new(LeakyBucket::new(limits.global_burst, limits.global_rps)),
            per_ip: DashMap::new(),
            limits,
        }
    }

    pub fn tracked_ips(&self) -> usize {
        self.per_ip.len()
    }

    /// `Err(retry_after_secs)` when the upgrade must be refused.
    pub async fn check(&self, ip: IpAddr) -> Result<(), u64> {
        if !self.limits.enabled {
            return Ok(());
        }

        self.global.lock().await.try_take()?;

        {
            let entry = self
                .per_ip
                .entry(ip)
                .or_insert_with(|| Mutex::new(LeakyBucket::new(self.limits.per_ip_burst, self.limits.per_ip_rps)));
            entry.value().lock().await.try_take()?;
        }

        if self.per_ip.len() > self.limits.max_ip_entries {
            self.trim();
        }
        Ok(())
    }

    /// Drop buckets that have fully refilled; they carry no state worth keeping.
    fn trim(&self) {
        let now = Instant::now();
        let before = self.per_ip.len();
        self.per_ip.retain(|_, b| match b.try_lock() {
            Ok(b) => !b.refilled_at(now),
            Err(_) => true,
        });
        tracing::warn!(before, after = self.per_ip.len(), "admission guard ip table trimmed");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn limits(per_ip_burst: u32) -> AdmissionLimits {
        AdmissionLimits {
            enabled: true,
            global_rps: 1000,
            global_burst: 1000,
            per_ip_rps: 1,
            per_ip_burst,
            max_ip_entries: 16,
        }
    }

    #[tokio::test]
    async fn per_ip_burst_then_retry_after() {
        let g = AdmissionGuard::new(limits(2));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(g.check(ip).await.is_ok());
        assert!(g.check(ip).await.is_ok());
        let ra = g.check(ip).await.unwrap_err();
        assert!(ra >= 1);

        let other: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(g.check(other).await.is_ok());
    }

    #[tokio::test]
    async fn disabled_guard_admits_everything() {
        let mut l = limits(1);
        l.enabled = false;
        let g = AdmissionGuard::new(l);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..10 {
            assert!(g.check(ip).await.is_ok());
        }
        assert_eq!(g.tracked_ips(), 0);
    }
}
