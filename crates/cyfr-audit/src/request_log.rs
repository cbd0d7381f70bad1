//! The MCP request log.

use cyfr_core::{Context, RequestId};
use cyfr_storage::{Database, StorageAdapter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Request lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Row inserted, handler still running.
    Pending,
    /// Handler returned a result.
    Success,
    /// Handler returned an error.
    Error,
}

impl RequestStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// One `mcp_logs` row.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogEntry {
    /// Correlation id.
    pub request_id: String,
    /// Tool name, when the request was a `tools/call`.
    pub tool: Option<String>,
    /// Action inside the tool call.
    pub action: Option<String>,
    /// JSON-RPC method.
    pub method: Option<String>,
    /// Lifecycle state.
    pub status: String,
    /// Handler duration, set on completion.
    pub duration_ms: Option<i64>,
    /// Caller.
    pub user_id: Option<String>,
    /// Session, when session-authenticated.
    pub session_id: Option<String>,
    /// Request payload.
    pub input: Option<Value>,
    /// Response payload.
    pub output: Option<Value>,
    /// Error payload.
    pub error: Option<Value>,
    /// Insert time.
    pub created_at: String,
}

/// Writes and queries over `mcp_logs`. All writes are best-effort.
#[derive(Debug, Clone)]
pub struct RequestLog {
    db: Database,
    adapter: StorageAdapter,
}

impl RequestLog {
    /// Create a log over the shared database and adapter.
    #[must_use]
    pub fn new(db: Database, adapter: StorageAdapter) -> Self {
        Self { db, adapter }
    }

    /// Record the start of a request. Never fails the caller.
    pub fn started(
        &self,
        ctx: &Context,
        method: Option<&str>,
        tool: Option<&str>,
        action: Option<&str>,
        input: &Value,
    ) {
        let now = chrono::Utc::now().to_rfc3339();
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO mcp_logs
                 (request_id, tool, action, method, status, user_id, session_id,
                  input, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    ctx.request_id.as_str(),
                    tool,
                    action,
                    method,
                    ctx.user_id,
                    ctx.session_id,
                    input.to_string(),
                    now,
                ],
            )
        });
        if let Err(e) = result {
            warn!(error = %e, "request log insert failed");
        }
    }

    /// Record a successful completion. Never fails the caller.
    pub async fn completed(&self, ctx: &Context, output: &Value, duration_ms: i64) {
        self.finish(ctx, RequestStatus::Success, Some(output), None, duration_ms)
            .await;
    }

    /// Record a failure. Never fails the caller.
    pub async fn failed(&self, ctx: &Context, error: &Value, duration_ms: i64) {
        self.finish(ctx, RequestStatus::Error, None, Some(error), duration_ms)
            .await;
    }

    async fn finish(
        &self,
        ctx: &Context,
        status: RequestStatus,
        output: Option<&Value>,
        error: Option<&Value>,
        duration_ms: i64,
    ) {
        let now = chrono::Utc::now().to_rfc3339();
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE mcp_logs
                 SET status = ?1, output = ?2, error = ?3, duration_ms = ?4, updated_at = ?5
                 WHERE request_id = ?6",
                rusqlite::params![
                    status.as_str(),
                    output.map(ToString::to_string),
                    error.map(ToString::to_string),
                    duration_ms,
                    now,
                    ctx.request_id.as_str(),
                ],
            )
        });
        if let Err(e) = result {
            warn!(error = %e, "request log update failed");
        }

        // Inline payload mirror for fast single-request forensics.
        if let Some(entry) = self.get(&ctx.request_id) {
            let segments = ["mcp_logs", &format!("{}.json", ctx.request_id)];
            let body = serde_json::to_vec_pretty(&entry).unwrap_or_default();
            if let Err(e) = self.adapter.put(ctx, &segments, &body).await {
                warn!(error = %e, "request log mirror failed");
            }
        }
    }

    /// Fetch one request row. Read failures surface as `None` (the log is
    /// never load-bearing).
    #[must_use]
    pub fn get(&self, request_id: &RequestId) -> Option<RequestLogEntry> {
        self.db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT request_id, tool, action, method, status, duration_ms,
                            user_id, session_id, input, output, error, created_at
                     FROM mcp_logs WHERE request_id = ?1",
                    [request_id.as_str()],
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

    /// Most recent rows for a user, newest first.
    #[must_use]
    pub fn list(&self, ctx: &Context, limit: u32) -> Vec<RequestLogEntry> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT request_id, tool, action, method, status, duration_ms,
                            user_id, session_id, input, output, error, created_at
                     FROM mcp_logs WHERE user_id = ?1
                     ORDER BY created_at DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![ctx.user_id, i64::from(limit)],
                    row_to_entry,
                )?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .unwrap_or_default()
    }
}

fn parse_json_col(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<RequestLogEntry> {
    Ok(RequestLogEntry {
        request_id: row.get(0)?,
        tool: row.get(1)?,
        action: row.get(2)?,
        method: row.get(3)?,
        status: row.get(4)?,
        duration_ms: row.get(5)?,
        user_id: row.get(6)?,
        session_id: row.get(7)?,
        input: parse_json_col(row.get(8)?),
        output: parse_json_col(row.get(9)?),
        error: parse_json_col(row.get(10)?),
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixtures() -> (RequestLog, Context, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = RequestLog::new(
            Database::in_memory().unwrap(),
            StorageAdapter::new(dir.path()),
        );
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = "alice".to_string();
        (log, ctx, dir)
    }

    #[tokio::test]
    async fn test_started_then_completed() {
        let (log, ctx, dir) = fixtures();
        log.started(
            &ctx,
            Some("tools/call"),
            Some("execution"),
            Some("list"),
            &json!({"limit": 5}),
        );

        let entry = log.get(&ctx.request_id).unwrap();
        assert_eq!(entry.status, "pending");
        assert_eq!(entry.tool.as_deref(), Some("execution"));

        log.completed(&ctx, &json!({"executions": []}), 12).await;
        let entry = log.get(&ctx.request_id).unwrap();
        assert_eq!(entry.status, "success");
        assert_eq!(entry.duration_ms, Some(12));

        // The inline mirror exists under the global prefix.
        let mirror = dir
            .path()
            .join("mcp_logs")
            .join(format!("{}.json", ctx.request_id));
        assert!(mirror.exists());
    }

    #[tokio::test]
    async fn test_failed_records_error_payload() {
        let (log, ctx, _dir) = fixtures();
        log.started(&ctx, Some("tools/call"), Some("execution"), Some("run"), &json!({}));
        log.failed(&ctx, &json!({"code": -33100, "message": "trap"}), 40)
            .await;

        let entry = log.get(&ctx.request_id).unwrap();
        assert_eq!(entry.status, "error");
        assert_eq!(entry.error.unwrap()["code"], -33100);
    }

    #[tokio::test]
    async fn test_list_is_per_user_and_bounded() {
        let (log, ctx, _dir) = fixtures();
        for _ in 0..3 {
            let mut fresh = ctx.clone();
            fresh.request_id = RequestId::new();
            log.started(&fresh, Some("tools/list"), None, None, &json!({}));
        }
        assert_eq!(log.list(&ctx, 2).len(), 2);
        assert_eq!(log.list(&ctx, 10).len(), 3);
    }
}
