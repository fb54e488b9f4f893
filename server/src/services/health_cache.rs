// server/src/services/health_cache.rs

//! Remembers recent health of external services and opens a circuit after
//! repeated failures so callers go straight to their fallback.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
struct Entry {
  healthy: bool,
  checked_at: Instant,
  consecutive_failures: u32,
  open_until: Option<Instant>,
}

pub struct HealthCache {
  ttl: Duration,
  failure_threshold: u32,
  cooldown: Duration,
  entries: Mutex<HashMap<String, Entry>>,
}

impl HealthCache {
  pub fn new(ttl: Duration, failure_threshold: u32, cooldown: Duration) -> Self {
    Self {
      ttl,
      failure_threshold: failure_threshold.max(1),
      cooldown,
      entries: Mutex::new(HashMap::new()),
    }
  }

  /// Health recorded within the TTL, if any.
  pub fn cached(&self, service: &str) -> Option<bool> {
    let entries = self.entries.lock();
    entries
      .get(service)
      .filter(|e| e.checked_at.elapsed() < self.ttl)
      .map(|e| e.healthy)
  }

  pub fn is_open(&self, service: &str) -> bool {
    let entries = self.entries.lock();
    entries
      .get(service)
      .and_then(|e| e.open_until)
      .is_some_and(|until| Instant::now() < until)
  }

  pub fn record_success(&self, service: &str) {
    let mut entries = self.entries.lock();
    let was_open = entries.get(service).is_some_and(|e| e.open_until.is_some());
    entries.insert(
      service.to_string(),
      Entry {
        healthy: true,
        checked_at: Instant::now(),
        consecutive_failures: 0,
        open_until: None,
      },
    );
    if was_open {
      info!(service, "Service recovered; circuit closed.");
    }
  }

  pub fn record_failure(&self, service: &str) {
    let mut entries = self.entries.lock();
    let now = Instant::now();
    let entry = entries.entry(service.to_string()).or_insert(Entry {
      healthy: false,
      checked_at: now,
      consecutive_failures: 0,
      open_until: None,
    });
    entry.healthy = false;
    entry.checked_at = now;
    entry.consecutive_failures += 1;
    if entry.consecutive_failures >= self.failure_threshold {
      entry.open_until = Some(now + self.cooldown);
      warn!(
        service,
        failures = entry.consecutive_failures,
        cooldown = ?self.cooldown,
        "Circuit opened."
      );
    }
  }
}

impl Default for HealthCache {
  fn default() -> Self {
    Self::new(Duration::from_secs(60), 3, Duration::from_secs(120))
  }
}
