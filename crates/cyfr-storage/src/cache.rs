//! Process-local TTL cache and its sweeper.
//!
//! Values are stored as JSON so one map serves every subsystem (policies,
//! component configs, sessions). Last-writer-wins on racing inserts is
//! acceptable: cached values are reads-from-of-record, never the record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Sweep interval for the background expiry pass.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Cache keys, one variant per cached read path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Host policy for a typed component reference.
    Policy(String),
    /// Component config entries for a typed reference.
    ComponentConfig(String),
    /// Session row by token.
    Session(String),
    /// Anything else; namespaced by the caller.
    Custom(String),
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// The process-wide TTL map.
#[derive(Default)]
pub struct Cache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live entry, purging it on read when expired.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let hit = match self.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => None,
            None => return None,
        };
        if hit.is_none() {
            trace!(?key, "purging expired cache entry on read");
            self.entries.remove(key);
        }
        hit
    }

    /// Insert with the default TTL.
    pub fn put(&self, key: CacheKey, value: Value) {
        self.put_with_ttl(key, value, DEFAULT_TTL);
    }

    /// Insert with a caller-chosen TTL.
    pub fn put_with_ttl(&self, key: CacheKey, value: Value, ttl: Duration) {
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Drop one entry.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.remove(key);
    }

    /// Enumerate live entries whose key satisfies `pred`.
    #[must_use]
    pub fn match_keys(&self, pred: impl Fn(&CacheKey) -> bool) -> Vec<(CacheKey, Value)> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| entry.expires_at > now && pred(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value.clone()))
            .collect()
    }

    /// Drop every entry whose key satisfies `pred`; returns the count.
    pub fn delete_match(&self, pred: impl Fn(&CacheKey) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pred(key));
        before.saturating_sub(self.entries.len())
    }

    /// Remove every expired entry; returns the count removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "cache sweep");
        }
        removed
    }

    /// Number of entries, live or not yet swept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Spawn the long-lived sweeper task.
///
/// Runs an expiry pass every 60 seconds until the handle is aborted (at
/// shutdown). A sweep never fails; a panic here cannot reach request
/// handling because the task is detached.
pub fn spawn_sweeper(cache: Arc<Cache>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            cache.sweep();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_get() {
        let cache = Cache::new();
        let key = CacheKey::Policy("c:local.fetch:1.0.0".to_string());
        cache.put(key.clone(), json!({"timeout": "3m"}));
        assert_eq!(cache.get(&key).unwrap()["timeout"], "3m");
    }

    #[test]
    fn test_expired_entry_purged_on_read() {
        let cache = Cache::new();
        let key = CacheKey::Session("tok".to_string());
        cache.put_with_ttl(key.clone(), json!(1), Duration::ZERO);
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate() {
        let cache = Cache::new();
        let key = CacheKey::Custom("k".to_string());
        cache.put(key.clone(), json!(true));
        cache.invalidate(&key);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_match_and_delete_match() {
        let cache = Cache::new();
        cache.put(CacheKey::Policy("a".to_string()), json!(1));
        cache.put(CacheKey::Policy("b".to_string()), json!(2));
        cache.put(CacheKey::Session("s".to_string()), json!(3));

        let policies = cache.match_keys(|k| matches!(k, CacheKey::Policy(_)));
        assert_eq!(policies.len(), 2);

        let removed = cache.delete_match(|k| matches!(k, CacheKey::Policy(_)));
        assert_eq!(removed, 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_sweep_removes_all_expired() {
        let cache = Cache::new();
        cache.put_with_ttl(CacheKey::Custom("old".to_string()), json!(1), Duration::ZERO);
        cache.put(CacheKey::Custom("live".to_string()), json!(2));

        let removed = cache.sweep();
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CacheKey::Custom("live".to_string())).is_some());
    }
}
