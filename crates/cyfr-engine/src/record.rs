//! Execution records.
//!
//! The record is inserted with `status=running` before the sandbox ever
//! starts and mutated exactly once into a terminal state. `duration_ms`
//! is non-null iff `completed_at` is.

use chrono::{DateTime, Utc};
use cyfr_core::{Context, ExecutionId};
use cyfr_storage::Database;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Lifecycle state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Sandbox entered (or about to be entered).
    Running,
    /// Guest returned normally.
    Completed,
    /// Trap, timeout, fuel exhaustion, or host failure.
    Failed,
    /// Explicitly cancelled while running.
    Cancelled,
}

impl ExecutionStatus {
    /// The stored form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Inverse of [`ExecutionStatus::as_str`]; unknown reads as failed.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            _ => Self::Failed,
        }
    }
}

/// One `executions` row.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    /// Row id, `exec_<uuid7>`.
    pub id: String,
    /// Originating request.
    pub request_id: Option<String>,
    /// Parent execution for formula-composed calls.
    pub parent_execution_id: Option<String>,
    /// Display form of the execution reference.
    pub reference: String,
    /// SHA-256 of the input payload.
    pub input_hash: Option<String>,
    /// Caller.
    pub user_id: String,
    /// Component type.
    pub component_type: Option<String>,
    /// Content digest of the artifact actually run.
    pub component_digest: Option<String>,
    /// Insert time.
    pub started_at: DateTime<Utc>,
    /// Terminal-transition time.
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at`, in milliseconds.
    pub duration_ms: Option<i64>,
    /// Lifecycle state.
    pub status: ExecutionStatus,
    /// Failure detail.
    pub error_message: Option<String>,
    /// Input payload.
    pub input: Option<Value>,
    /// Masked output payload.
    pub output: Option<Value>,
    /// Host-import trace captured during the run.
    pub wasi_trace: Option<Value>,
    /// Policy snapshot enforced for this run.
    pub host_policy: Option<Value>,
}

/// Insert/finalize/query over `executions`.
#[derive(Debug, Clone)]
pub struct ExecutionStore {
    db: Database,
}

impl ExecutionStore {
    /// Create a store over the shared database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a `running` row. Must precede sandbox entry.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn insert_running(&self, record: &ExecutionRecord) -> EngineResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO executions
                 (id, request_id, parent_execution_id, reference, input_hash, user_id,
                  component_type, component_digest, started_at, status, input, host_policy)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'running', ?10, ?11)",
                rusqlite::params![
                    record.id,
                    record.request_id,
                    record.parent_execution_id,
                    record.reference,
                    record.input_hash,
                    record.user_id,
                    record.component_type,
                    record.component_digest,
                    record.started_at.to_rfc3339(),
                    record.input.as_ref().map(ToString::to_string),
                    record.host_policy.as_ref().map(ToString::to_string),
                ],
            )
        })?;
        Ok(())
    }

    /// Transition a row into a terminal state exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] if no `running` row matched (it
    /// was already finalized or never inserted).
    pub fn finalize(
        &self,
        execution_id: &ExecutionId,
        status: ExecutionStatus,
        output: Option<&Value>,
        error_message: Option<&str>,
        wasi_trace: Option<&Value>,
    ) -> EngineResult<ExecutionRecord> {
        let existing = self
            .get(execution_id)?
            .ok_or_else(|| EngineError::NotFound(execution_id.to_string()))?;
        let completed_at = Utc::now();
        let duration_ms = (completed_at - existing.started_at).num_milliseconds().max(0);
        let changed = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE executions
                 SET status = ?1, completed_at = ?2, error_message = ?3, output = ?4,
                     wasi_trace = ?5, duration_ms = ?6
                 WHERE id = ?7 AND status = 'running'",
                rusqlite::params![
                    status.as_str(),
                    completed_at.to_rfc3339(),
                    error_message,
                    output.map(ToString::to_string),
                    wasi_trace.map(ToString::to_string),
                    duration_ms,
                    execution_id.as_str(),
                ],
            )
        })?;
        if changed == 0 {
            return Err(EngineError::NotFound(execution_id.to_string()));
        }
        self.get(execution_id)?
            .ok_or_else(|| EngineError::NotFound(execution_id.to_string()))
    }

    /// Fetch one record.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn get(&self, execution_id: &ExecutionId) -> EngineResult<Option<ExecutionRecord>> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM executions WHERE id = ?1",
                [execution_id.as_str()],
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

    /// A user's most recent executions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn list(&self, ctx: &Context, limit: u32) -> EngineResult<Vec<ExecutionRecord>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM executions WHERE user_id = ?1
                 ORDER BY started_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![ctx.user_id, i64::from(limit)],
                row_to_record,
            )?;
            rows.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows)
    }

    /// Delete the tail past the newest `keep` records for a user.
    /// Returns how many rows were removed.
    ///
    /// # Errors
    ///
    /// Returns an error on database failures.
    pub fn prune_tail(&self, ctx: &Context, keep: u32) -> EngineResult<usize> {
        let removed = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM executions WHERE user_id = ?1 AND id NOT IN (
                     SELECT id FROM executions WHERE user_id = ?1
                     ORDER BY started_at DESC LIMIT ?2)",
                rusqlite::params![ctx.user_id, i64::from(keep)],
            )
        })?;
        Ok(removed)
    }
}

fn parse_time(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    })
}

fn parse_json_col(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRecord> {
    let status_raw: String = row.get("status")?;
    Ok(ExecutionRecord {
        id: row.get("id")?,
        request_id: row.get("request_id")?,
        parent_execution_id: row.get("parent_execution_id")?,
        reference: row.get("reference")?,
        input_hash: row.get("input_hash")?,
        user_id: row.get("user_id")?,
        component_type: row.get("component_type")?,
        component_digest: row.get("component_digest")?,
        started_at: parse_time(row.get("started_at")?).unwrap_or_default(),
        completed_at: parse_time(row.get("completed_at")?),
        duration_ms: row.get("duration_ms")?,
        status: ExecutionStatus::from_str_lossy(&status_raw),
        error_message: row.get("error_message")?,
        input: parse_json_col(row.get("input")?),
        output: parse_json_col(row.get("output")?),
        wasi_trace: parse_json_col(row.get("wasi_trace")?),
        host_policy: parse_json_col(row.get("host_policy")?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::RequestId;
    use serde_json::json;

    fn ctx() -> Context {
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = "alice".to_string();
        ctx
    }

    fn running_record(ctx: &Context) -> ExecutionRecord {
        ExecutionRecord {
            id: ExecutionId::new().to_string(),
            request_id: Some(ctx.request_id.to_string()),
            parent_execution_id: None,
            reference: "r:local.math:1.0.0".to_string(),
            input_hash: None,
            user_id: ctx.user_id.clone(),
            component_type: Some("reagent".to_string()),
            component_digest: Some("sha256:00".to_string()),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            status: ExecutionStatus::Running,
            error_message: None,
            input: Some(json!({"a": 5})),
            output: None,
            wasi_trace: None,
            host_policy: Some(json!({"timeout": "1m"})),
        }
    }

    #[test]
    fn test_insert_then_finalize_invariants() {
        let store = ExecutionStore::new(Database::in_memory().unwrap());
        let ctx = ctx();
        let record = running_record(&ctx);
        store.insert_running(&record).unwrap();

        let execution_id = ExecutionId::from_string(record.id.clone());
        let fetched = store.get(&execution_id).unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Running);
        assert!(fetched.completed_at.is_none());
        assert!(fetched.duration_ms.is_none());

        let finalized = store
            .finalize(
                &execution_id,
                ExecutionStatus::Completed,
                Some(&json!({"result": 15})),
                None,
                None,
            )
            .unwrap();
        assert_eq!(finalized.status, ExecutionStatus::Completed);
        let completed_at = finalized.completed_at.unwrap();
        let duration = finalized.duration_ms.unwrap();
        assert!(duration >= 0);
        // duration_ms tracks completed_at - started_at within a millisecond.
        let wall = (completed_at - finalized.started_at).num_milliseconds();
        assert!((duration - wall).abs() <= 1, "duration {duration} vs wall {wall}");
    }

    #[test]
    fn test_finalize_is_once_only() {
        let store = ExecutionStore::new(Database::in_memory().unwrap());
        let ctx = ctx();
        let record = running_record(&ctx);
        store.insert_running(&record).unwrap();
        let execution_id = ExecutionId::from_string(record.id);

        store
            .finalize(&execution_id, ExecutionStatus::Failed, None, Some("trap"), None)
            .unwrap();
        assert!(matches!(
            store.finalize(&execution_id, ExecutionStatus::Completed, None, None, None),
            Err(EngineError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_and_prune_tail() {
        let store = ExecutionStore::new(Database::in_memory().unwrap());
        let ctx = ctx();
        for _ in 0..5 {
            store.insert_running(&running_record(&ctx)).unwrap();
        }
        assert_eq!(store.list(&ctx, 10).unwrap().len(), 5);

        let removed = store.prune_tail(&ctx, 2).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.list(&ctx, 10).unwrap().len(), 2);
    }
}
