//! Ordered schema migrations.
//!
//! Each step is a table creation, a column addition, or a data backfill.
//! Steps are applied transactionally and recorded in `schema_migrations`;
//! re-running is a no-op.
//!
//! Two backfills carry real semantics and must stay reproducible:
//! - `normalize_references` rewrites legacy reference forms
//!   (`local:name:version`, bare `name:version`) into canonical
//!   `namespace.name:version` across every table holding a component
//!   reference, deleting rows that would collide with an
//!   already-canonical sibling (delete-before-update).
//! - `prefix_reference_types` prepends the owning component type to
//!   policy references, resolves grant/config types by joining against
//!   `components`, and deletes rows whose reference no longer matches any
//!   component.

use cyfr_core::ComponentRef;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::error::{StorageError, StorageResult};

enum MigrationKind {
    CreateTable(&'static str),
    AddColumn(&'static str),
    Backfill(fn(&Connection) -> rusqlite::Result<()>),
}

struct Migration {
    version: u32,
    name: &'static str,
    kind: MigrationKind,
}

fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create_components",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS components (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    version TEXT NOT NULL,
                    component_type TEXT NOT NULL,
                    publisher TEXT NOT NULL,
                    org_id TEXT NOT NULL DEFAULT '',
                    digest TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    exports TEXT NOT NULL DEFAULT '[]',
                    description TEXT,
                    tags TEXT NOT NULL DEFAULT '[]',
                    category TEXT,
                    license TEXT,
                    source TEXT NOT NULL DEFAULT 'published',
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (publisher, name, version, component_type, org_id)
                );
                CREATE INDEX IF NOT EXISTS idx_components_name ON components (name);
                CREATE INDEX IF NOT EXISTS idx_components_source ON components (source);",
            ),
        },
        Migration {
            version: 2,
            name: "create_policies",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS policies (
                    reference TEXT PRIMARY KEY,
                    component_type TEXT,
                    policy TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );",
            ),
        },
        Migration {
            version: 3,
            name: "create_secrets",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS secrets (
                    scope TEXT NOT NULL,
                    org_id TEXT NOT NULL DEFAULT '',
                    name TEXT NOT NULL,
                    ciphertext BLOB NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (scope, org_id, name)
                );",
            ),
        },
        Migration {
            version: 4,
            name: "create_secret_grants",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS secret_grants (
                    secret_name TEXT NOT NULL,
                    component_ref TEXT NOT NULL,
                    scope TEXT NOT NULL,
                    org_id TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL,
                    UNIQUE (secret_name, component_ref, scope, org_id)
                );",
            ),
        },
        Migration {
            version: 5,
            name: "create_component_configs",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS component_configs (
                    component_ref TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    UNIQUE (component_ref, key)
                );",
            ),
        },
        Migration {
            version: 6,
            name: "create_sessions",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS sessions (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    email TEXT,
                    provider TEXT,
                    permissions TEXT NOT NULL DEFAULT '[]',
                    expires_at TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions (user_id);",
            ),
        },
        Migration {
            version: 7,
            name: "create_revoked_sessions",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS revoked_sessions (
                    session_id TEXT PRIMARY KEY,
                    revoked_at TEXT NOT NULL
                );",
            ),
        },
        Migration {
            version: 8,
            name: "create_api_keys",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS api_keys (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    key_hash TEXT NOT NULL UNIQUE,
                    key_prefix TEXT NOT NULL,
                    key_type TEXT NOT NULL,
                    scope TEXT NOT NULL DEFAULT '[]',
                    rate_limit TEXT,
                    ip_allowlist TEXT,
                    revoked INTEGER NOT NULL DEFAULT 0,
                    user_id TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );",
            ),
        },
        Migration {
            version: 9,
            name: "create_permissions",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS permissions (
                    user_id TEXT NOT NULL,
                    permission TEXT NOT NULL,
                    granted_by TEXT,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, permission)
                );",
            ),
        },
        Migration {
            version: 10,
            name: "create_mcp_logs",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS mcp_logs (
                    request_id TEXT PRIMARY KEY,
                    tool TEXT,
                    action TEXT,
                    method TEXT,
                    status TEXT NOT NULL,
                    duration_ms INTEGER,
                    user_id TEXT,
                    session_id TEXT,
                    input TEXT,
                    output TEXT,
                    error TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_mcp_logs_created ON mcp_logs (created_at);",
            ),
        },
        Migration {
            version: 11,
            name: "create_policy_logs",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS policy_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    reference TEXT NOT NULL,
                    component_type TEXT,
                    execution_id TEXT,
                    user_id TEXT,
                    policy TEXT NOT NULL,
                    decision TEXT NOT NULL,
                    reason TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_policy_logs_exec ON policy_logs (execution_id);",
            ),
        },
        Migration {
            version: 12,
            name: "create_audit_events",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS audit_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_type TEXT NOT NULL,
                    user_id TEXT,
                    session_id TEXT,
                    request_id TEXT,
                    data TEXT NOT NULL DEFAULT '{}',
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_events_user ON audit_events (user_id);",
            ),
        },
        Migration {
            version: 13,
            name: "create_executions",
            kind: MigrationKind::CreateTable(
                "CREATE TABLE IF NOT EXISTS executions (
                    id TEXT PRIMARY KEY,
                    request_id TEXT,
                    parent_execution_id TEXT,
                    reference TEXT NOT NULL,
                    input_hash TEXT,
                    user_id TEXT NOT NULL,
                    component_type TEXT,
                    component_digest TEXT,
                    started_at TEXT NOT NULL,
                    completed_at TEXT,
                    duration_ms INTEGER,
                    status TEXT NOT NULL,
                    error_message TEXT,
                    input TEXT,
                    output TEXT,
                    wasi_trace TEXT,
                    host_policy TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_executions_user ON executions (user_id, started_at);",
            ),
        },
        Migration {
            version: 14,
            name: "add_api_key_rotated_at",
            kind: MigrationKind::AddColumn("ALTER TABLE api_keys ADD COLUMN rotated_at TEXT;"),
        },
        Migration {
            version: 15,
            name: "normalize_references",
            kind: MigrationKind::Backfill(normalize_references),
        },
        Migration {
            version: 16,
            name: "prefix_reference_types",
            kind: MigrationKind::Backfill(prefix_reference_types),
        },
    ]
}

/// Apply pending migrations up to `max_version`; returns how many ran.
pub(crate) fn apply(conn: &Connection, max_version: u32) -> StorageResult<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )?;

    let mut applied = 0usize;
    for migration in migrations() {
        if migration.version > max_version {
            break;
        }
        let done: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = ?1)",
            [migration.version],
            |row| row.get(0),
        )?;
        if done {
            continue;
        }

        let run = || -> rusqlite::Result<()> {
            conn.execute_batch("BEGIN")?;
            let result = match &migration.kind {
                MigrationKind::CreateTable(sql) | MigrationKind::AddColumn(sql) => {
                    conn.execute_batch(sql)
                },
                MigrationKind::Backfill(f) => f(conn),
            };
            match result {
                Ok(()) => {
                    conn.execute(
                        "INSERT INTO schema_migrations (version, name, applied_at)
                         VALUES (?1, ?2, ?3)",
                        rusqlite::params![
                            migration.version,
                            migration.name,
                            chrono::Utc::now().to_rfc3339(),
                        ],
                    )?;
                    conn.execute_batch("COMMIT")
                },
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(e)
                },
            }
        };

        run().map_err(|source| StorageError::Migration {
            version: migration.version,
            name: migration.name,
            source,
        })?;
        info!(version = migration.version, name = migration.name, "applied migration");
        applied += 1;
    }
    Ok(applied)
}

/// Tables that hold a component reference, with whether the reference
/// participates in a uniqueness constraint (collisions deleted) or is
/// plain history (always rewritten).
const REFERENCE_COLUMNS: &[(&str, &str, bool)] = &[
    ("policies", "reference", true),
    ("secret_grants", "component_ref", true),
    ("component_configs", "component_ref", true),
    ("policy_logs", "reference", false),
    ("executions", "reference", false),
];

fn normalize_references(conn: &Connection) -> rusqlite::Result<()> {
    for &(table, column, unique) in REFERENCE_COLUMNS {
        let mut stmt =
            conn.prepare(&format!("SELECT rowid, {column} FROM {table}"))?;
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        for (rowid, stored) in rows {
            let Ok(parsed) = ComponentRef::parse(&stored) else {
                warn!(table, reference = %stored, "dropping unparseable reference row");
                conn.execute(&format!("DELETE FROM {table} WHERE rowid = ?1"), [rowid])?;
                continue;
            };
            // Preserve an existing type prefix; only the untyped tail is
            // normalized here.
            let canonical = match parsed.component_type {
                Some(ty) => format!("{ty}:{}", parsed.untyped()),
                None => parsed.untyped(),
            };
            if canonical == stored {
                continue;
            }
            if unique {
                let collides: bool = conn.query_row(
                    &format!(
                        "SELECT EXISTS(SELECT 1 FROM {table} WHERE {column} = ?1 AND rowid != ?2)"
                    ),
                    rusqlite::params![canonical, rowid],
                    |row| row.get(0),
                )?;
                if collides {
                    // Delete-before-update: the canonical sibling wins.
                    conn.execute(&format!("DELETE FROM {table} WHERE rowid = ?1"), [rowid])?;
                    continue;
                }
            }
            conn.execute(
                &format!("UPDATE {table} SET {column} = ?1 WHERE rowid = ?2"),
                rusqlite::params![canonical, rowid],
            )?;
        }
    }
    Ok(())
}

fn prefix_reference_types(conn: &Connection) -> rusqlite::Result<()> {
    // policies and policy_logs carry their own component_type column.
    for table in ["policies", "policy_logs"] {
        let mut stmt = conn.prepare(&format!(
            "SELECT rowid, reference, component_type FROM {table}"
        ))?;
        let rows: Vec<(i64, String, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<_, _>>()?;

        for (rowid, stored, type_col) in rows {
            let Ok(parsed) = ComponentRef::parse(&stored) else {
                continue;
            };
            if parsed.component_type.is_some() {
                continue;
            }
            let Some(ty) = type_col else {
                warn!(table, reference = %stored, "dropping untyped reference with no type column");
                conn.execute(&format!("DELETE FROM {table} WHERE rowid = ?1"), [rowid])?;
                continue;
            };
            conn.execute(
                &format!("UPDATE {table} SET reference = ?1 WHERE rowid = ?2"),
                rusqlite::params![format!("{ty}:{}", parsed.untyped()), rowid],
            )?;
        }
    }

    // secret_grants and component_configs resolve the type by joining
    // against components; orphans are deleted.
    for (table, column) in [
        ("secret_grants", "component_ref"),
        ("component_configs", "component_ref"),
    ] {
        let mut stmt = conn.prepare(&format!("SELECT rowid, {column} FROM {table}"))?;
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        for (rowid, stored) in rows {
            let Ok(parsed) = ComponentRef::parse(&stored) else {
                conn.execute(&format!("DELETE FROM {table} WHERE rowid = ?1"), [rowid])?;
                continue;
            };
            if parsed.component_type.is_some() {
                continue;
            }
            let found: Option<String> = conn
                .query_row(
                    "SELECT component_type FROM components
                     WHERE publisher = ?1 AND name = ?2 AND version = ?3
                     ORDER BY created_at DESC LIMIT 1",
                    rusqlite::params![parsed.namespace, parsed.name, parsed.version],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })?;
            match found {
                Some(ty) => {
                    conn.execute(
                        &format!("UPDATE {table} SET {column} = ?1 WHERE rowid = ?2"),
                        rusqlite::params![format!("{ty}:{}", parsed.untyped()), rowid],
                    )?;
                },
                None => {
                    warn!(table, reference = %stored, "dropping reference with no matching component");
                    conn.execute(&format!("DELETE FROM {table} WHERE rowid = ?1"), [rowid])?;
                },
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    #[test]
    fn test_all_tables_exist_after_migrate() {
        let db = Database::in_memory().unwrap();
        for table in [
            "components",
            "policies",
            "secrets",
            "secret_grants",
            "component_configs",
            "sessions",
            "revoked_sessions",
            "api_keys",
            "permissions",
            "mcp_logs",
            "policy_logs",
            "audit_events",
            "executions",
        ] {
            let exists: bool = db
                .with_conn(|c| {
                    c.query_row(
                        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?1)",
                        [table],
                        |row| row.get(0),
                    )
                })
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }

    #[test]
    fn test_normalize_references_rewrites_legacy_forms() {
        let db = Database::in_memory_unmigrated().unwrap();
        db.migrate_to(14).unwrap();

        db.with_conn(|c| {
            c.execute(
                "INSERT INTO policies (reference, component_type, policy, created_at, updated_at)
                 VALUES ('local:math:1.0.0', 'reagent', '{}', '', '')",
                [],
            )?;
            c.execute(
                "INSERT INTO policies (reference, component_type, policy, created_at, updated_at)
                 VALUES ('echo:2.0.0', 'reagent', '{}', '', '')",
                [],
            )
        })
        .unwrap();

        db.migrate_to(15).unwrap();

        let refs: Vec<String> = db
            .with_conn(|c| {
                let mut stmt = c.prepare("SELECT reference FROM policies ORDER BY reference")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .unwrap();
        assert_eq!(refs, vec!["local.echo:2.0.0", "local.math:1.0.0"]);
    }

    #[test]
    fn test_normalize_references_deletes_colliding_legacy_row() {
        let db = Database::in_memory_unmigrated().unwrap();
        db.migrate_to(14).unwrap();

        db.with_conn(|c| {
            // Canonical sibling already present; the legacy spelling of the
            // same reference must be deleted, not rewritten onto it.
            c.execute(
                "INSERT INTO policies (reference, component_type, policy, created_at, updated_at)
                 VALUES ('local.math:1.0.0', 'reagent', '{\"keep\":true}', '', '')",
                [],
            )?;
            c.execute(
                "INSERT INTO policies (reference, component_type, policy, created_at, updated_at)
                 VALUES ('local:math:1.0.0', 'reagent', '{\"keep\":false}', '', '')",
                [],
            )
        })
        .unwrap();

        db.migrate_to(15).unwrap();

        let (count, policy): (i64, String) = db
            .with_conn(|c| {
                let count =
                    c.query_row("SELECT COUNT(*) FROM policies", [], |row| row.get(0))?;
                let policy = c.query_row(
                    "SELECT policy FROM policies WHERE reference = 'local.math:1.0.0'",
                    [],
                    |row| row.get(0),
                )?;
                Ok((count, policy))
            })
            .unwrap();
        assert_eq!(count, 1);
        assert!(policy.contains("true"));
    }

    #[test]
    fn test_prefix_types_joins_components_and_drops_orphans() {
        let db = Database::in_memory_unmigrated().unwrap();
        db.migrate_to(15).unwrap();

        db.with_conn(|c| {
            c.execute(
                "INSERT INTO components
                 (id, name, version, component_type, publisher, digest, size, created_at, updated_at)
                 VALUES ('comp_1', 'math', '1.0.0', 'reagent', 'local', 'sha256:00', 8, '', '')",
                [],
            )?;
            c.execute(
                "INSERT INTO secret_grants (secret_name, component_ref, scope, created_at)
                 VALUES ('SK', 'local.math:1.0.0', 'personal', '')",
                [],
            )?;
            c.execute(
                "INSERT INTO secret_grants (secret_name, component_ref, scope, created_at)
                 VALUES ('SK', 'local.ghost:9.9.9', 'personal', '')",
                [],
            )
        })
        .unwrap();

        db.migrate_to(16).unwrap();

        let refs: Vec<String> = db
            .with_conn(|c| {
                let mut stmt = c.prepare("SELECT component_ref FROM secret_grants")?;
                let rows = stmt.query_map([], |row| row.get(0))?;
                rows.collect()
            })
            .unwrap();
        assert_eq!(refs, vec!["reagent:local.math:1.0.0"]);
    }
}
