//! The cache-through policy store.

use std::sync::Arc;

use cyfr_core::ComponentRef;
use cyfr_storage::{Cache, CacheKey, Database};
use serde_json::json;
use tracing::debug;

use crate::error::PolicyResult;
use crate::policy::HostPolicy;

/// A policy load result: the effective policy plus whether a stored row
/// backs it (the execution kernel fails catalysts fast when it does not).
#[derive(Debug, Clone)]
pub struct StoredPolicy {
    /// The effective policy.
    pub policy: HostPolicy,
    /// Whether the policy came from a stored row rather than defaults.
    pub stored: bool,
}

/// Loads, persists, and invalidates host policies.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    db: Database,
    cache: Arc<Cache>,
}

impl PolicyStore {
    /// Create a store over the shared database and cache.
    #[must_use]
    pub fn new(db: Database, cache: Arc<Cache>) -> Self {
        Self { db, cache }
    }

    fn cache_key(reference: &ComponentRef) -> CacheKey {
        CacheKey::Policy(reference.to_string())
    }

    /// Load the effective policy for a typed reference, consulting the
    /// cache first and writing through on miss.
    ///
    /// # Errors
    ///
    /// Returns an error for untyped references, bad stored maps, or
    /// database failures.
    pub fn load(&self, reference: &ComponentRef) -> PolicyResult<StoredPolicy> {
        let component_type = reference.require_type()?;
        let key = Self::cache_key(reference);

        if let Some(hit) = self.cache.get(&key) {
            let stored = hit["stored"].as_bool().unwrap_or(false);
            let policy = HostPolicy::from_map(&hit["policy"], component_type)?;
            return Ok(StoredPolicy { policy, stored });
        }

        let row: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT policy FROM policies WHERE reference = ?1",
                [reference.to_string()],
                |r| r.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;

        let (policy, stored) = match row {
            Some(raw) => {
                let map: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(cyfr_storage::StorageError::Serialization)?;
                (HostPolicy::from_map(&map, component_type)?, true)
            },
            None => (HostPolicy::default_for(component_type), false),
        };

        self.cache
            .put(key, json!({"stored": stored, "policy": policy.to_map()}));
        Ok(StoredPolicy { policy, stored })
    }

    /// Upsert the policy for a typed reference and invalidate its cache
    /// entry.
    ///
    /// # Errors
    ///
    /// Returns an error for untyped references or database failures.
    pub fn upsert(&self, reference: &ComponentRef, policy: &HostPolicy) -> PolicyResult<()> {
        let component_type = reference.require_type()?;
        let now = chrono::Utc::now().to_rfc3339();
        let raw = policy.to_map().to_string();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO policies (reference, component_type, policy, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(reference)
                 DO UPDATE SET policy = excluded.policy, updated_at = excluded.updated_at",
                rusqlite::params![
                    reference.to_string(),
                    component_type.as_str(),
                    raw,
                    now,
                ],
            )
        })?;
        self.cache.invalidate(&Self::cache_key(reference));
        debug!(reference = %reference, "policy upserted");
        Ok(())
    }

    /// Delete a stored policy; the reference falls back to defaults.
    ///
    /// Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn delete(&self, reference: &ComponentRef) -> PolicyResult<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM policies WHERE reference = ?1",
                [reference.to_string()],
            )
        })?;
        self.cache.invalidate(&Self::cache_key(reference));
        Ok(removed > 0)
    }

    /// List every stored policy reference.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn list(&self) -> PolicyResult<Vec<String>> {
        let refs = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT reference FROM policies ORDER BY reference")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<Result<Vec<String>, _>>()
        })?;
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::ComponentType;

    fn store() -> PolicyStore {
        PolicyStore::new(Database::in_memory().unwrap(), Arc::new(Cache::new()))
    }

    fn reference() -> ComponentRef {
        ComponentRef::parse("c:local.fetch:1.0.0").unwrap()
    }

    #[test]
    fn test_missing_policy_yields_typed_default() {
        let loaded = store().load(&reference()).unwrap();
        assert!(!loaded.stored);
        assert_eq!(
            loaded.policy,
            HostPolicy::default_for(ComponentType::Catalyst)
        );
    }

    #[test]
    fn test_upsert_then_load() {
        let store = store();
        let reference = reference();
        let mut policy = HostPolicy::default_for(ComponentType::Catalyst);
        policy.allowed_domains = vec!["api.stripe.com".to_string()];

        store.upsert(&reference, &policy).unwrap();
        let loaded = store.load(&reference).unwrap();
        assert!(loaded.stored);
        assert_eq!(loaded.policy.allowed_domains, vec!["api.stripe.com"]);
    }

    #[test]
    fn test_upsert_invalidates_cache() {
        let store = store();
        let reference = reference();

        // Prime the cache with the default.
        assert!(!store.load(&reference).unwrap().stored);

        let mut policy = HostPolicy::default_for(ComponentType::Catalyst);
        policy.allowed_domains = vec!["api.stripe.com".to_string()];
        store.upsert(&reference, &policy).unwrap();

        let loaded = store.load(&reference).unwrap();
        assert!(loaded.stored);
        assert!(loaded.policy.allows_domain("api.stripe.com"));
    }

    #[test]
    fn test_delete_falls_back_to_default() {
        let store = store();
        let reference = reference();
        store
            .upsert(&reference, &HostPolicy::default_for(ComponentType::Catalyst))
            .unwrap();
        assert!(store.delete(&reference).unwrap());
        assert!(!store.load(&reference).unwrap().stored);
        assert!(!store.delete(&reference).unwrap());
    }

    #[test]
    fn test_untyped_reference_rejected() {
        let reference = ComponentRef::parse("math:1.0.0").unwrap();
        assert!(store().load(&reference).is_err());
    }
}
