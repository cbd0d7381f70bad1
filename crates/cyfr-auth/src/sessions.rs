//! TTL-refreshing sessions.
//!
//! The sessions table is the record; a `DashMap` mirror serves hot reads.
//! Termination inserts into `revoked_sessions` so a stale mirror (or a
//! future replica) cannot re-hydrate a dead session. Refreshes are
//! best-effort and spawned off the request path.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cyfr_storage::Database;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};

/// A server-side session bound to an opaque bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The opaque token (also the row id).
    pub id: String,
    /// Authenticated user.
    pub user_id: String,
    /// Email, when the auth provider supplied one.
    pub email: Option<String>,
    /// Auth provider name (`oauth`, `dev`, ...).
    pub provider: Option<String>,
    /// Permission tokens attached at login.
    pub permissions: Vec<String>,
    /// Expiry instant; refreshed on activity.
    pub expires_at: DateTime<Utc>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Whether the TTL has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Session creation, lookup, refresh, and termination.
#[derive(Debug)]
pub struct SessionStore {
    db: Database,
    mirror: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store with the configured session TTL.
    #[must_use]
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self {
            db,
            mirror: DashMap::new(),
            ttl,
        }
    }

    /// The configured session lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session; the returned id is the bearer token.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn create(
        &self,
        user_id: &str,
        email: Option<String>,
        provider: Option<String>,
        permissions: Vec<String>,
    ) -> AuthResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: cyfr_crypto::generate_token(""),
            user_id: user_id.to_string(),
            email,
            provider,
            permissions,
            expires_at: now + chrono::Duration::from_std(self.ttl).unwrap_or_default(),
            created_at: now,
        };
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions
                 (id, user_id, email, provider, permissions, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    session.id,
                    session.user_id,
                    session.email,
                    session.provider,
                    serde_json::to_string(&session.permissions)
                        .unwrap_or_else(|_| "[]".into()),
                    session.expires_at.to_rfc3339(),
                    session.created_at.to_rfc3339(),
                ],
            )
        })?;
        self.mirror.insert(session.id.clone(), session.clone());
        debug!(user_id, "session created");
        Ok(session)
    }

    /// Resolve a token: mirror first, database hydration on miss.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionRevoked`] for terminated sessions,
    /// [`AuthError::SessionExpired`] past TTL, and
    /// [`AuthError::SessionNotFound`] otherwise.
    pub fn get(&self, token: &str) -> AuthResult<Session> {
        if self.is_revoked(token)? {
            self.mirror.remove(token);
            return Err(AuthError::SessionRevoked);
        }

        if let Some(hit) = self.mirror.get(token) {
            let session = hit.clone();
            drop(hit);
            if session.is_expired() {
                self.mirror.remove(token);
                return Err(AuthError::SessionExpired);
            }
            return Ok(session);
        }

        // Mirror miss: hydrate from the table (server restart path).
        let session = self
            .load_row(token)?
            .ok_or(AuthError::SessionNotFound)?;
        if session.is_expired() {
            return Err(AuthError::SessionExpired);
        }
        self.mirror.insert(token.to_string(), session.clone());
        Ok(session)
    }

    /// Extend a session's TTL from now. Activity-based: called on every
    /// authenticated request via [`SessionStore::spawn_refresh`].
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn refresh(&self, token: &str) -> AuthResult<DateTime<Utc>> {
        let expires_at = Utc::now() + chrono::Duration::from_std(self.ttl).unwrap_or_default();
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE sessions SET expires_at = ?1 WHERE id = ?2",
                rusqlite::params![expires_at.to_rfc3339(), token],
            )
        })?;
        if let Some(mut entry) = self.mirror.get_mut(token) {
            entry.expires_at = expires_at;
        }
        Ok(expires_at)
    }

    /// Spawn a best-effort refresh off the request path. Failures are
    /// logged and swallowed; the request has already been served.
    pub fn spawn_refresh(self: &Arc<Self>, token: String) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = store.refresh(&token) {
                warn!(error = %e, "session refresh failed");
            }
        });
    }

    /// Terminate a session: revoked-set insert plus mirror and row
    /// removal. Returns [`AuthError::SessionNotFound`] if the token never
    /// existed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn terminate(&self, token: &str) -> AuthResult<()> {
        let existed = self.mirror.remove(token).is_some() || self.load_row(token)?.is_some();
        if !existed {
            return Err(AuthError::SessionNotFound);
        }
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO revoked_sessions (session_id, revoked_at)
                 VALUES (?1, ?2)",
                rusqlite::params![token, Utc::now().to_rfc3339()],
            )?;
            conn.execute("DELETE FROM sessions WHERE id = ?1", [token])
        })?;
        debug!("session terminated");
        Ok(())
    }

    fn is_revoked(&self, token: &str) -> AuthResult<bool> {
        let revoked = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM revoked_sessions WHERE session_id = ?1)",
                [token],
                |row| row.get(0),
            )
        })?;
        Ok(revoked)
    }

    fn load_row(&self, token: &str) -> AuthResult<Option<Session>> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT id, user_id, email, provider, permissions, expires_at, created_at
                 FROM sessions WHERE id = ?1",
                [token],
                |row| {
                    let permissions_raw: String = row.get(4)?;
                    let expires_raw: String = row.get(5)?;
                    let created_raw: String = row.get(6)?;
                    Ok(Session {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        email: row.get(2)?,
                        provider: row.get(3)?,
                        permissions: serde_json::from_str(&permissions_raw).unwrap_or_default(),
                        expires_at: DateTime::parse_from_rfc3339(&expires_raw)
                            .map(|t| t.with_timezone(&Utc))
                            .unwrap_or_default(),
                        created_at: DateTime::parse_from_rfc3339(&created_raw)
                            .map(|t| t.with_timezone(&Utc))
                            .unwrap_or_default(),
                    })
                },
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

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SessionStore {
        SessionStore::new(Database::in_memory().unwrap(), Duration::from_secs(3600))
    }

    #[test]
    fn test_create_and_get() {
        let store = store();
        let session = store
            .create("alice", Some("alice@example.com".into()), None, vec![])
            .unwrap();
        assert!(session.id.len() >= 22, "token must carry >=128 bits");

        let fetched = store.get(&session.id).unwrap();
        assert_eq!(fetched.user_id, "alice");
    }

    #[test]
    fn test_get_unknown_token() {
        assert!(matches!(
            store().get("no-such-token"),
            Err(AuthError::SessionNotFound)
        ));
    }

    #[test]
    fn test_hydration_after_mirror_loss() {
        let store = store();
        let session = store.create("alice", None, None, vec![]).unwrap();
        // Simulate a restart: the mirror is empty, the row survives.
        store.mirror.clear();
        let fetched = store.get(&session.id).unwrap();
        assert_eq!(fetched.user_id, "alice");
    }

    #[test]
    fn test_refresh_extends_expiry() {
        let store = store();
        let session = store.create("alice", None, None, vec![]).unwrap();
        let before = Utc::now();
        let expires_at = store.refresh(&session.id).unwrap();
        let ttl = chrono::Duration::from_std(store.ttl()).unwrap();
        assert!(expires_at >= before + ttl - chrono::Duration::seconds(2));
        assert_eq!(store.get(&session.id).unwrap().expires_at, expires_at);
    }

    #[test]
    fn test_expired_session_rejected() {
        let store = SessionStore::new(Database::in_memory().unwrap(), Duration::ZERO);
        let session = store.create("alice", None, None, vec![]).unwrap();
        assert!(matches!(
            store.get(&session.id),
            Err(AuthError::SessionExpired)
        ));
    }

    #[test]
    fn test_terminate_blocks_rehydration() {
        let store = store();
        let session = store.create("alice", None, None, vec![]).unwrap();
        store.terminate(&session.id).unwrap();

        assert!(matches!(
            store.get(&session.id),
            Err(AuthError::SessionRevoked)
        ));
        // A second terminate finds nothing.
        assert!(matches!(
            store.terminate(&session.id),
            Err(AuthError::SessionNotFound)
        ));
    }
}
