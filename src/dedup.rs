//! In-memory guard against starting a second job-creation sequence for a
//! target that is already believed to be in flight.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Map from target identity to the time its last sequence started.
#[derive(Debug)]
pub struct DedupGuard {
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Default for DedupGuard {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl DedupGuard {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` when a sequence for `target` started less than one TTL
    /// ago. Otherwise stamps `target` with the current time and returns
    /// `false`; check and stamp happen under one lock.
    pub fn should_skip(&self, target: &str) -> bool {
        self.should_skip_at(target, Utc::now())
    }

    pub fn should_skip_at(&self, target: &str, now: DateTime<Utc>) -> bool {
        let mut entries = self.lock();
        if let Some(started) = entries.get(target) {
            if now - *started < self.ttl {
                debug!(target_id = target, started = %started, "already in flight, skipping");
                return true;
            }
        }
        entries.insert(target.to_string(), now);
        false
    }

    /// Forget `target` so a later legitimate attempt is not blocked.
    pub fn clear(&self, target: &str) {
        self.lock().remove(target);
    }

    /// Drop every entry older than the TTL.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, started| now - *started < self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
