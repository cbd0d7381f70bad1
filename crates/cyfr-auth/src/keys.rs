//! Typed API keys.
//!
//! The key's type is encoded in its raw prefix (`cyfr_pk_`, `cyfr_sk_`,
//! `cyfr_ak_`); storage holds only the SHA-256 hash plus a short display
//! prefix. Validation order: prefix, hash lookup, revocation, IP
//! allow-list.

use std::net::IpAddr;

use cyfr_core::Context;
use cyfr_crypto::{generate_token, sha256_hex};
use cyfr_storage::Database;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Characters of the raw key kept for display.
const KEY_PREFIX_DISPLAY_LEN: usize = 12;

/// API key type, prefix-encoded in the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    /// Read-mostly surface.
    Public,
    /// Full tool surface for one user.
    Secret,
    /// Administrative surface (policies, keys, audit).
    Admin,
}

impl KeyType {
    /// The raw-key prefix for this type.
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Public => "cyfr_pk_",
            Self::Secret => "cyfr_sk_",
            Self::Admin => "cyfr_ak_",
        }
    }

    /// Detect the type from a raw key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownKeyPrefix`] for anything else.
    pub fn from_raw(raw: &str) -> AuthResult<Self> {
        if raw.starts_with(Self::Public.prefix()) {
            Ok(Self::Public)
        } else if raw.starts_with(Self::Secret.prefix()) {
            Ok(Self::Secret)
        } else if raw.starts_with(Self::Admin.prefix()) {
            Ok(Self::Admin)
        } else {
            Err(AuthError::UnknownKeyPrefix)
        }
    }

    /// The stored form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Secret => "secret",
            Self::Admin => "admin",
        }
    }

    /// Inverse of [`KeyType::as_str`]; unknown input falls back to
    /// `public`, the least privileged type.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "secret" => Self::Secret,
            "admin" => Self::Admin,
            _ => Self::Public,
        }
    }
}

/// A stored API key. The raw value exists only in the creation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// Row id, `key_<uuid7>`.
    pub id: String,
    /// Human label.
    pub name: String,
    /// SHA-256 of the raw key; never serialized outward.
    #[serde(skip_serializing)]
    pub key_hash: String,
    /// First characters of the raw key, for display.
    pub key_prefix: String,
    /// Key type.
    pub key_type: KeyType,
    /// Permission tokens this key grants.
    pub scope: Vec<String>,
    /// Optional request budget, stored in `N/window` form.
    pub rate_limit: Option<String>,
    /// Exact IPs or CIDR blocks allowed to use this key.
    pub ip_allowlist: Option<Vec<String>>,
    /// Whether the key has been revoked.
    pub revoked: bool,
    /// When the key was last rotated.
    pub rotated_at: Option<String>,
    /// Owning user.
    pub user_id: String,
    /// Creation time.
    pub created_at: String,
}

/// CRUD plus validation over the `api_keys` table.
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    db: Database,
}

impl ApiKeyStore {
    /// Create a store over the shared database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a key. The second tuple element is the raw value, shown
    /// exactly once; only its hash is stored.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn create(
        &self,
        ctx: &Context,
        name: &str,
        key_type: KeyType,
        scope: Vec<String>,
        ip_allowlist: Option<Vec<String>>,
        rate_limit: Option<String>,
    ) -> AuthResult<(ApiKeyRecord, String)> {
        let raw = generate_token(key_type.prefix());
        let record = ApiKeyRecord {
            id: format!("key_{}", Uuid::now_v7().simple()),
            name: name.to_string(),
            key_hash: sha256_hex(&raw),
            key_prefix: raw[..KEY_PREFIX_DISPLAY_LEN].to_string(),
            key_type,
            scope,
            rate_limit,
            ip_allowlist,
            revoked: false,
            rotated_at: None,
            user_id: ctx.user_id.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO api_keys
                 (id, name, key_hash, key_prefix, key_type, scope, rate_limit,
                  ip_allowlist, revoked, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?10)",
                rusqlite::params![
                    record.id,
                    record.name,
                    record.key_hash,
                    record.key_prefix,
                    record.key_type.as_str(),
                    serde_json::to_string(&record.scope).unwrap_or_else(|_| "[]".into()),
                    record.rate_limit,
                    record
                        .ip_allowlist
                        .as_ref()
                        .map(|l| serde_json::to_string(l).unwrap_or_else(|_| "[]".into())),
                    record.user_id,
                    record.created_at,
                ],
            )
        })?;
        debug!(key_id = %record.id, key_type = key_type.as_str(), "api key created");
        Ok((record, raw))
    }

    /// Validate a raw key, optionally against the caller's IP.
    ///
    /// # Errors
    ///
    /// Follows the gate order: [`AuthError::UnknownKeyPrefix`], then
    /// [`AuthError::InvalidKey`] on hash miss, [`AuthError::KeyRevoked`],
    /// then [`AuthError::IpNotAllowed`] when an allow-list exists and a
    /// client IP was supplied.
    pub fn validate(&self, raw: &str, client_ip: Option<IpAddr>) -> AuthResult<ApiKeyRecord> {
        KeyType::from_raw(raw)?;
        let hash = sha256_hex(raw);
        let record = self
            .lookup_by_hash(&hash)?
            .ok_or(AuthError::InvalidKey)?;
        if record.revoked {
            return Err(AuthError::KeyRevoked);
        }
        if let (Some(allowlist), Some(ip)) = (&record.ip_allowlist, client_ip)
            && !ip_allowed(allowlist, ip)
        {
            warn!(key_id = %record.id, %ip, "api key used from disallowed IP");
            return Err(AuthError::IpNotAllowed(ip.to_string()));
        }
        Ok(record)
    }

    /// Rotate a key: a fresh raw value replaces the stored hash and
    /// prefix atomically; type and scope are preserved and the prior raw
    /// value stops validating immediately.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyNotFound`] for unknown or foreign ids.
    pub fn rotate(&self, ctx: &Context, key_id: &str) -> AuthResult<(ApiKeyRecord, String)> {
        let record = self
            .get(ctx, key_id)?
            .ok_or_else(|| AuthError::KeyNotFound(key_id.to_string()))?;
        let raw = generate_token(record.key_type.prefix());
        let hash = sha256_hex(&raw);
        let prefix = raw[..KEY_PREFIX_DISPLAY_LEN].to_string();
        let rotated_at = chrono::Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE api_keys SET key_hash = ?1, key_prefix = ?2, rotated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![hash, prefix, rotated_at, key_id],
            )
        })?;
        let record = ApiKeyRecord {
            key_hash: hash,
            key_prefix: prefix,
            rotated_at: Some(rotated_at),
            ..record
        };
        debug!(key_id, "api key rotated");
        Ok((record, raw))
    }

    /// Revoke a key.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyNotFound`] for unknown or foreign ids.
    pub fn revoke(&self, ctx: &Context, key_id: &str) -> AuthResult<()> {
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE api_keys SET revoked = 1 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![key_id, ctx.user_id],
            )
        })?;
        if changed == 0 {
            return Err(AuthError::KeyNotFound(key_id.to_string()));
        }
        Ok(())
    }

    /// List the caller's keys (hashes stay private).
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn list(&self, ctx: &Context) -> AuthResult<Vec<ApiKeyRecord>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, key_hash, key_prefix, key_type, scope, rate_limit,
                        ip_allowlist, revoked, rotated_at, user_id, created_at
                 FROM api_keys WHERE user_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map([&ctx.user_id], row_to_record)?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows)
    }

    /// Fetch one of the caller's keys by id.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn get(&self, ctx: &Context, key_id: &str) -> AuthResult<Option<ApiKeyRecord>> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, key_hash, key_prefix, key_type, scope, rate_limit,
                        ip_allowlist, revoked, rotated_at, user_id, created_at
                 FROM api_keys WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![key_id, ctx.user_id],
                row_to_record,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;
        Ok(row)
    }

    fn lookup_by_hash(&self, hash: &str) -> AuthResult<Option<ApiKeyRecord>> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, key_hash, key_prefix, key_type, scope, rate_limit,
                        ip_allowlist, revoked, rotated_at, user_id, created_at
                 FROM api_keys WHERE key_hash = ?1",
                [hash],
                row_to_record,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })?;
        Ok(row)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApiKeyRecord> {
    let scope_raw: String = row.get(5)?;
    let allowlist_raw: Option<String> = row.get(7)?;
    Ok(ApiKeyRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        key_hash: row.get(2)?,
        key_prefix: row.get(3)?,
        key_type: KeyType::from_str_lossy(&row.get::<_, String>(4)?),
        scope: serde_json::from_str(&scope_raw).unwrap_or_default(),
        rate_limit: row.get(6)?,
        ip_allowlist: allowlist_raw.and_then(|raw| serde_json::from_str(&raw).ok()),
        revoked: row.get::<_, i64>(8)? != 0,
        rotated_at: row.get(9)?,
        user_id: row.get(10)?,
        created_at: row.get(11)?,
    })
}

/// Exact-IP or CIDR membership, IPv4 and IPv6.
fn ip_allowed(allowlist: &[String], ip: IpAddr) -> bool {
    allowlist.iter().any(|entry| {
        if let Ok(exact) = entry.parse::<IpAddr>() {
            return exact == ip;
        }
        if let Ok(net) = entry.parse::<IpNet>() {
            return net.contains(&ip);
        }
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::RequestId;

    fn ctx() -> Context {
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = "alice".to_string();
        ctx
    }

    fn store() -> ApiKeyStore {
        ApiKeyStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_create_returns_raw_once() {
        let store = store();
        let (record, raw) = store
            .create(&ctx(), "ci", KeyType::Public, vec!["execution".into()], None, None)
            .unwrap();
        assert!(raw.starts_with("cyfr_pk_"));
        assert_eq!(record.key_prefix, &raw[..12]);
        // The stored record carries only the hash.
        assert_eq!(record.key_hash, sha256_hex(&raw));
        assert_ne!(record.key_hash, raw);
    }

    #[test]
    fn test_validate_happy_path() {
        let store = store();
        let (created, raw) = store
            .create(&ctx(), "ci", KeyType::Secret, vec![], None, None)
            .unwrap();
        let validated = store.validate(&raw, None).unwrap();
        assert_eq!(validated.id, created.id);
        assert_eq!(validated.key_type, KeyType::Secret);
    }

    #[test]
    fn test_validate_rejects_unknown_prefix() {
        assert!(matches!(
            store().validate("sk-not-a-cyfr-key", None),
            Err(AuthError::UnknownKeyPrefix)
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_key() {
        assert!(matches!(
            store().validate("cyfr_pk_00000000000000000000000000000000000000000", None),
            Err(AuthError::InvalidKey)
        ));
    }

    #[test]
    fn test_validate_rejects_revoked() {
        let store = store();
        let ctx = ctx();
        let (record, raw) = store
            .create(&ctx, "ci", KeyType::Public, vec![], None, None)
            .unwrap();
        store.revoke(&ctx, &record.id).unwrap();
        assert!(matches!(
            store.validate(&raw, None),
            Err(AuthError::KeyRevoked)
        ));
    }

    #[test]
    fn test_ip_allowlist_exact_and_cidr() {
        let store = store();
        let allowlist = vec!["10.0.0.1".to_string(), "192.168.0.0/24".to_string()];
        let (_, raw) = store
            .create(&ctx(), "ci", KeyType::Public, vec![], Some(allowlist), None)
            .unwrap();

        assert!(store.validate(&raw, Some("10.0.0.1".parse().unwrap())).is_ok());
        assert!(store.validate(&raw, Some("192.168.0.77".parse().unwrap())).is_ok());
        assert!(matches!(
            store.validate(&raw, Some("172.16.0.1".parse().unwrap())),
            Err(AuthError::IpNotAllowed(_))
        ));
        // No client IP supplied: the allow-list is not consulted.
        assert!(store.validate(&raw, None).is_ok());
    }

    #[test]
    fn test_ip_allowlist_ipv6_cidr() {
        let store = store();
        let (_, raw) = store
            .create(
                &ctx(),
                "ci",
                KeyType::Public,
                vec![],
                Some(vec!["2001:db8::/32".to_string()]),
                None,
            )
            .unwrap();
        assert!(store.validate(&raw, Some("2001:db8::1".parse().unwrap())).is_ok());
        assert!(store.validate(&raw, Some("2001:db9::1".parse().unwrap())).is_err());
    }

    #[test]
    fn test_rotation_swaps_hash_and_keeps_type() {
        let store = store();
        let ctx = ctx();
        let (record, old_raw) = store
            .create(&ctx, "ci", KeyType::Admin, vec!["*".into()], None, None)
            .unwrap();

        let (rotated, new_raw) = store.rotate(&ctx, &record.id).unwrap();
        assert_eq!(rotated.key_type, KeyType::Admin);
        assert_eq!(rotated.scope, record.scope);
        assert!(rotated.rotated_at.is_some());
        assert!(new_raw.starts_with("cyfr_ak_"));

        // The prior raw value stops validating immediately.
        assert!(matches!(
            store.validate(&old_raw, None),
            Err(AuthError::InvalidKey)
        ));
        assert!(store.validate(&new_raw, None).is_ok());
    }

    #[test]
    fn test_list_is_per_user() {
        let store = store();
        let alice = ctx();
        let mut bob = ctx();
        bob.user_id = "bob".to_string();

        store.create(&alice, "a", KeyType::Public, vec![], None, None).unwrap();
        store.create(&bob, "b", KeyType::Public, vec![], None, None).unwrap();

        assert_eq!(store.list(&alice).unwrap().len(), 1);
        assert_eq!(store.list(&bob).unwrap().len(), 1);
    }
}
