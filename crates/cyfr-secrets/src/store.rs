//! The encrypted secret store and grant relation.

use std::sync::Arc;

use cyfr_core::{ComponentRef, Context};
use cyfr_crypto::SecretBox;
use cyfr_storage::Database;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::{SecretError, SecretResult};

/// Secret visibility scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretScope {
    /// Owned by one user.
    Personal,
    /// Shared across an organization.
    Org,
}

impl SecretScope {
    /// Parse the wire form.
    pub fn parse(s: &str) -> SecretResult<Self> {
        match s {
            "personal" => Ok(Self::Personal),
            "org" => Ok(Self::Org),
            other => Err(SecretError::UnknownScope(other.to_string())),
        }
    }

    /// The wire form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Org => "org",
        }
    }

    /// The owner column value for this scope: the user id for personal
    /// secrets, the organization id for org secrets.
    fn owner(self, ctx: &Context) -> String {
        match self {
            Self::Personal => ctx.user_id.clone(),
            Self::Org => ctx.org_id.clone().unwrap_or_default(),
        }
    }
}

/// Encrypted secret rows plus the `(secret, component)` grant relation.
#[derive(Debug, Clone)]
pub struct SecretStore {
    db: Database,
    secret_box: Arc<SecretBox>,
}

impl SecretStore {
    /// Create a store sealing with the given box.
    #[must_use]
    pub fn new(db: Database, secret_box: Arc<SecretBox>) -> Self {
        Self { db, secret_box }
    }

    /// Set or rotate a secret. Rotation replaces the ciphertext in place.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing or the row write fails.
    pub fn set(
        &self,
        ctx: &Context,
        name: &str,
        value: &str,
        scope: SecretScope,
    ) -> SecretResult<()> {
        let ciphertext = self.secret_box.seal_str(value)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO secrets (scope, org_id, name, ciphertext, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(scope, org_id, name)
                 DO UPDATE SET ciphertext = excluded.ciphertext, updated_at = excluded.updated_at",
                rusqlite::params![scope.as_str(), scope.owner(ctx), name, ciphertext, now],
            )
        })?;
        debug!(name, scope = scope.as_str(), "secret set");
        Ok(())
    }

    /// Decrypt and return a secret value.
    ///
    /// Server-side only: the tool surface never exposes this to clients;
    /// the one caller is the execution kernel's preload stage.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NotFound`] when no row matches and a crypto
    /// error when the ciphertext cannot be opened.
    pub fn get(&self, ctx: &Context, name: &str, scope: SecretScope) -> SecretResult<String> {
        let mut ciphertext: Vec<u8> = self
            .db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT ciphertext FROM secrets
                     WHERE scope = ?1 AND org_id = ?2 AND name = ?3",
                    rusqlite::params![scope.as_str(), scope.owner(ctx), name],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
            })?
            .ok_or_else(|| SecretError::NotFound(name.to_string()))?;
        let value = self.secret_box.open_str(&ciphertext);
        ciphertext.zeroize();
        Ok(value?)
    }

    /// Delete a secret. Grants pointing at it are removed with it; they
    /// never extend a secret's lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NotFound`] when no row matches.
    pub fn delete(&self, ctx: &Context, name: &str, scope: SecretScope) -> SecretResult<()> {
        let owner = scope.owner(ctx);
        let removed = self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM secrets WHERE scope = ?1 AND org_id = ?2 AND name = ?3",
                rusqlite::params![scope.as_str(), owner, name],
            )?;
            conn.execute(
                "DELETE FROM secret_grants
                 WHERE scope = ?1 AND org_id = ?2 AND secret_name = ?3",
                rusqlite::params![scope.as_str(), owner, name],
            )?;
            Ok(removed)
        })?;
        if removed == 0 {
            return Err(SecretError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// List secret names in a scope. Values are never listed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn list(&self, ctx: &Context, scope: SecretScope) -> SecretResult<Vec<String>> {
        let names = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM secrets WHERE scope = ?1 AND org_id = ?2 ORDER BY name",
            )?;
            let rows =
                stmt.query_map(rusqlite::params![scope.as_str(), scope.owner(ctx)], |row| {
                    row.get(0)
                })?;
            rows.collect::<Result<Vec<String>, _>>()
        })?;
        Ok(names)
    }

    /// Grant a component the right to read a secret at execution time.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NotFound`] when the secret does not exist
    /// and a reference error for untyped component refs.
    pub fn grant(
        &self,
        ctx: &Context,
        secret_name: &str,
        component_ref: &ComponentRef,
        scope: SecretScope,
    ) -> SecretResult<()> {
        component_ref.require_type()?;
        // The grant must point at a live secret.
        let exists: bool = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM secrets
                 WHERE scope = ?1 AND org_id = ?2 AND name = ?3)",
                rusqlite::params![scope.as_str(), scope.owner(ctx), secret_name],
                |row| row.get(0),
            )
        })?;
        if !exists {
            return Err(SecretError::NotFound(secret_name.to_string()));
        }
        let now = chrono::Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO secret_grants
                 (secret_name, component_ref, scope, org_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    secret_name,
                    component_ref.to_string(),
                    scope.as_str(),
                    scope.owner(ctx),
                    now,
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
    pub fn revoke(
        &self,
        ctx: &Context,
        secret_name: &str,
        component_ref: &ComponentRef,
        scope: SecretScope,
    ) -> SecretResult<bool> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM secret_grants
                 WHERE secret_name = ?1 AND component_ref = ?2 AND scope = ?3 AND org_id = ?4",
                rusqlite::params![
                    secret_name,
                    component_ref.to_string(),
                    scope.as_str(),
                    scope.owner(ctx),
                ],
            )
        })?;
        Ok(removed > 0)
    }

    /// Secret names granted to a component under the caller's scopes.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn grants_for(
        &self,
        ctx: &Context,
        component_ref: &ComponentRef,
    ) -> SecretResult<Vec<(String, SecretScope)>> {
        let personal_owner = SecretScope::Personal.owner(ctx);
        let org_owner = SecretScope::Org.owner(ctx);
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT secret_name, scope FROM secret_grants
                 WHERE component_ref = ?1
                   AND ((scope = 'personal' AND org_id = ?2)
                     OR (scope = 'org' AND org_id = ?3))
                 ORDER BY secret_name",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![component_ref.to_string(), personal_owner, org_owner],
                |row| {
                    let name: String = row.get(0)?;
                    let scope: String = row.get(1)?;
                    Ok((name, scope))
                },
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        rows.into_iter()
            .map(|(name, scope)| Ok((name, SecretScope::parse(&scope)?)))
            .collect()
    }

    /// Resolve every granted secret for a component into plaintext.
    ///
    /// This is the execution-preload path: the returned values go into
    /// the sandbox capability handle and to the masker, nowhere else.
    ///
    /// # Errors
    ///
    /// Returns an error when a granted secret fails to decrypt; a grant
    /// whose secret row has vanished is skipped.
    pub fn resolve_granted(
        &self,
        ctx: &Context,
        component_ref: &ComponentRef,
    ) -> SecretResult<Vec<(String, String)>> {
        let mut resolved = Vec::new();
        for (name, scope) in self.grants_for(ctx, component_ref)? {
            match self.get(ctx, &name, scope) {
                Ok(value) => resolved.push((name, value)),
                Err(SecretError::NotFound(_)) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(resolved)
    }
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

    fn store() -> SecretStore {
        let secret_box = SecretBox::new("test-key-base", 16).unwrap();
        SecretStore::new(Database::in_memory().unwrap(), Arc::new(secret_box))
    }

    fn component() -> ComponentRef {
        ComponentRef::parse("r:local.echo:1.0.0").unwrap()
    }

    #[test]
    fn test_set_get_roundtrip() {
        let store = store();
        let ctx = ctx();
        store
            .set(&ctx, "SK", "sk-abcdefghijkl", SecretScope::Personal)
            .unwrap();
        assert_eq!(
            store.get(&ctx, "SK", SecretScope::Personal).unwrap(),
            "sk-abcdefghijkl"
        );
    }

    #[test]
    fn test_rotation_replaces_in_place() {
        let store = store();
        let ctx = ctx();
        store.set(&ctx, "SK", "old", SecretScope::Personal).unwrap();
        store.set(&ctx, "SK", "newer-value", SecretScope::Personal).unwrap();
        assert_eq!(
            store.get(&ctx, "SK", SecretScope::Personal).unwrap(),
            "newer-value"
        );
        assert_eq!(store.list(&ctx, SecretScope::Personal).unwrap().len(), 1);
    }

    #[test]
    fn test_personal_secrets_are_per_user() {
        let store = store();
        let alice = ctx();
        let mut bob = ctx();
        bob.user_id = "bob".to_string();

        store
            .set(&alice, "SK", "alice-value", SecretScope::Personal)
            .unwrap();
        assert!(matches!(
            store.get(&bob, "SK", SecretScope::Personal),
            Err(SecretError::NotFound(_))
        ));
    }

    #[test]
    fn test_grant_requires_existing_secret() {
        let store = store();
        let ctx = ctx();
        assert!(matches!(
            store.grant(&ctx, "MISSING", &component(), SecretScope::Personal),
            Err(SecretError::NotFound(_))
        ));
    }

    #[test]
    fn test_grant_resolve_revoke() {
        let store = store();
        let ctx = ctx();
        store
            .set(&ctx, "SK", "sk-abcdefghijkl", SecretScope::Personal)
            .unwrap();
        store
            .grant(&ctx, "SK", &component(), SecretScope::Personal)
            .unwrap();

        let resolved = store.resolve_granted(&ctx, &component()).unwrap();
        assert_eq!(
            resolved,
            vec![("SK".to_string(), "sk-abcdefghijkl".to_string())]
        );

        assert!(store
            .revoke(&ctx, "SK", &component(), SecretScope::Personal)
            .unwrap());
        assert!(store.resolve_granted(&ctx, &component()).unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_grants() {
        let store = store();
        let ctx = ctx();
        store.set(&ctx, "SK", "value", SecretScope::Personal).unwrap();
        store
            .grant(&ctx, "SK", &component(), SecretScope::Personal)
            .unwrap();
        store.delete(&ctx, "SK", SecretScope::Personal).unwrap();
        assert!(store.grants_for(&ctx, &component()).unwrap().is_empty());
    }

    #[test]
    fn test_grant_rejects_untyped_ref() {
        let store = store();
        let ctx = ctx();
        store.set(&ctx, "SK", "value", SecretScope::Personal).unwrap();
        let untyped = ComponentRef::parse("echo:1.0.0").unwrap();
        assert!(store
            .grant(&ctx, "SK", &untyped, SecretScope::Personal)
            .is_err());
    }
}
