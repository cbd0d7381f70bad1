//! Durable permission grants.
//!
//! Session permissions come from the login flow; these rows are the
//! durable grants an administrator manages through the `permission` tool.

use cyfr_storage::Database;

use crate::error::AuthResult;

/// Grant/revoke/list over the `permissions` table.
#[derive(Debug, Clone)]
pub struct PermissionStore {
    db: Database,
}

impl PermissionStore {
    /// Create a store over the shared database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Grant `permission` to `user_id`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn grant(&self, user_id: &str, permission: &str, granted_by: &str) -> AuthResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO permissions (user_id, permission, granted_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    user_id,
                    permission,
                    granted_by,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
        })?;
        Ok(())
    }

    /// Revoke a grant. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn revoke(&self, user_id: &str, permission: &str) -> AuthResult<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM permissions WHERE user_id = ?1 AND permission = ?2",
                rusqlite::params![user_id, permission],
            )
        })?;
        Ok(removed > 0)
    }

    /// List a user's durable permissions.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn list(&self, user_id: &str) -> AuthResult<Vec<String>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT permission FROM permissions WHERE user_id = ?1 ORDER BY permission",
            )?;
            let rows = stmt.query_map([user_id], |row| row.get(0))?;
            rows.collect::<Result<Vec<String>, _>>()
        })?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grant_revoke_list() {
        let store = PermissionStore::new(Database::in_memory().unwrap());
        store.grant("alice", "execution", "admin").unwrap();
        store.grant("alice", "secret", "admin").unwrap();
        // Idempotent.
        store.grant("alice", "execution", "admin").unwrap();

        assert_eq!(store.list("alice").unwrap(), vec!["execution", "secret"]);
        assert!(store.revoke("alice", "secret").unwrap());
        assert!(!store.revoke("alice", "secret").unwrap());
        assert_eq!(store.list("alice").unwrap(), vec!["execution"]);
    }
}
