// Result cache — keyed, TTL-bound, FIFO-bounded report store.
//
// Eviction order lives in an explicit VecDeque so it never depends on map
// iteration order. Expiry is checked lazily on get: an expired entry is
// removed on access and treated as a miss, so no background sweep is
// needed for correctness.
//
// All mutation happens under one async-aware lock; get-then-set races
// between two callers computing the same key can duplicate work but never
// produce inconsistent state.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::report::ThreatReport;

/// Stable fingerprint for a cache/identity key: `prefix:<sha256[..16]>`.
pub fn cache_key(prefix: &str, payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    format!("{prefix}:{}", &hex::encode(digest)[..16])
}

struct CacheEntry {
    report: ThreatReport,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}

pub struct ReportCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order for FIFO eviction. Re-setting an existing key keeps
    /// its original position.
    order: VecDeque<String>,
}

impl ReportCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Look up a report. A hit returns a copy with `cached` flipped to
    /// true; the stored original is never handed out mutably.
    pub async fn get(&self, key: &str) -> Option<ThreatReport> {
        let mut inner = self.inner.lock().await;

        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => entry.is_expired(),
        };
        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        let entry = inner.entries.get(key).expect("checked above");
        let mut report = entry.report.clone();
        report.cached = true;
        Some(report)
    }

    pub async fn set(&self, key: &str, report: ThreatReport, ttl: Duration) {
        let mut inner = self.inner.lock().await;

        if !inner.entries.contains_key(key) {
            inner.order.push_back(key.to_string());
        }
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                report,
                created_at: Instant::now(),
                ttl,
            },
        );

        while inner.entries.len() > self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.entries.clear();
        inner.order.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
