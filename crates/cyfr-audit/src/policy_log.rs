//! The policy consultation log.
//!
//! Every consultation, allow or deny, leaves one row carrying the full
//! policy snapshot so an audit can reconstruct exactly what was enforced.

use cyfr_core::{Context, ExecutionId};
use cyfr_storage::Database;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Outcome of a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// The operation was allowed.
    Allow,
    /// The operation was denied.
    Deny,
}

impl PolicyDecision {
    fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

/// One `policy_logs` row.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyLogEntry {
    /// Row id.
    pub id: i64,
    /// Component reference consulted.
    pub reference: String,
    /// Its type.
    pub component_type: Option<String>,
    /// Execution this consultation belonged to, when applicable.
    pub execution_id: Option<String>,
    /// Caller.
    pub user_id: Option<String>,
    /// Full policy snapshot at consultation time.
    pub policy: Value,
    /// Allow or deny.
    pub decision: String,
    /// Optional denial reason (`domain_not_allowed`, ...).
    pub reason: Option<String>,
    /// Insert time.
    pub created_at: String,
}

/// Writes and queries over `policy_logs`. All writes are best-effort.
#[derive(Debug, Clone)]
pub struct PolicyLog {
    db: Database,
}

impl PolicyLog {
    /// Create a log over the shared database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record one consultation. Never fails the caller.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        ctx: &Context,
        reference: &str,
        component_type: Option<&str>,
        execution_id: Option<&ExecutionId>,
        policy_snapshot: &Value,
        decision: PolicyDecision,
        reason: Option<&str>,
    ) {
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO policy_logs
                 (reference, component_type, execution_id, user_id, policy, decision,
                  reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    reference,
                    component_type,
                    execution_id.map(ExecutionId::as_str),
                    ctx.user_id,
                    policy_snapshot.to_string(),
                    decision.as_str(),
                    reason,
                    chrono::Utc::now().to_rfc3339(),
                ],
            )
        });
        if let Err(e) = result {
            warn!(error = %e, reference, "policy log insert failed");
        }
    }

    /// Fetch one row by id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<PolicyLogEntry> {
        self.db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT id, reference, component_type, execution_id, user_id, policy,
                            decision, reason, created_at
                     FROM policy_logs WHERE id = ?1",
                    [id],
                    row_to_entry,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
            })
            .ok()
            .flatten()
    }

    /// Rows for an execution, oldest first.
    #[must_use]
    pub fn for_execution(&self, execution_id: &ExecutionId) -> Vec<PolicyLogEntry> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, reference, component_type, execution_id, user_id, policy,
                            decision, reason, created_at
                     FROM policy_logs WHERE execution_id = ?1 ORDER BY id",
                )?;
                let rows = stmt.query_map([execution_id.as_str()], row_to_entry)?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .unwrap_or_default()
    }

    /// Most recent rows for a user, newest first.
    #[must_use]
    pub fn list(&self, ctx: &Context, limit: u32) -> Vec<PolicyLogEntry> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, reference, component_type, execution_id, user_id, policy,
                            decision, reason, created_at
                     FROM policy_logs WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![ctx.user_id, i64::from(limit)],
                    row_to_entry,
                )?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .unwrap_or_default()
    }

    /// Delete one row (internal retention surface). Returns whether a row
    /// was removed.
    pub fn delete(&self, id: i64) -> bool {
        self.db
            .with_conn(|conn| conn.execute("DELETE FROM policy_logs WHERE id = ?1", [id]))
            .map(|n| n > 0)
            .unwrap_or(false)
    }
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<PolicyLogEntry> {
    let policy_raw: String = row.get(5)?;
    Ok(PolicyLogEntry {
        id: row.get(0)?,
        reference: row.get(1)?,
        component_type: row.get(2)?,
        execution_id: row.get(3)?,
        user_id: row.get(4)?,
        policy: serde_json::from_str(&policy_raw).unwrap_or(Value::Null),
        decision: row.get(6)?,
        reason: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::RequestId;
    use serde_json::json;

    fn fixtures() -> (PolicyLog, Context) {
        let log = PolicyLog::new(Database::in_memory().unwrap());
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = "alice".to_string();
        (log, ctx)
    }

    #[test]
    fn test_record_allow_and_deny() {
        let (log, ctx) = fixtures();
        let execution_id = ExecutionId::new();
        let snapshot = json!({"allowed_domains": ["api.stripe.com"]});

        log.record(
            &ctx,
            "c:local.fetch:1.0.0",
            Some("catalyst"),
            Some(&execution_id),
            &snapshot,
            PolicyDecision::Allow,
            None,
        );
        log.record(
            &ctx,
            "c:local.fetch:1.0.0",
            Some("catalyst"),
            Some(&execution_id),
            &snapshot,
            PolicyDecision::Deny,
            Some("domain_not_allowed"),
        );

        let rows = log.for_execution(&execution_id);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].decision, "allow");
        assert_eq!(rows[1].decision, "deny");
        assert_eq!(rows[1].reason.as_deref(), Some("domain_not_allowed"));
        assert_eq!(rows[0].policy, snapshot);
    }

    #[test]
    fn test_list_and_delete() {
        let (log, ctx) = fixtures();
        log.record(
            &ctx,
            "r:local.math:1.0.0",
            Some("reagent"),
            None,
            &json!({}),
            PolicyDecision::Allow,
            None,
        );
        let rows = log.list(&ctx, 10);
        assert_eq!(rows.len(), 1);
        assert!(log.delete(rows[0].id));
        assert!(!log.delete(rows[0].id));
    }
}
