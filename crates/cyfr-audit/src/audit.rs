//! Security audit events.
//!
//! Rows index the event for querying; a per-user date-keyed JSONL file
//! written through the storage adapter is the tamper-evident copy. The
//! two writes are independent and each best-effort.

use cyfr_core::Context;
use cyfr_storage::{Database, StorageAdapter};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// One audit event row.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Row id.
    pub id: i64,
    /// Event type (`login`, `key_created`, `policy_changed`, ...).
    pub event_type: String,
    /// Acting user.
    pub user_id: Option<String>,
    /// Session, when session-authenticated.
    pub session_id: Option<String>,
    /// Request correlation id.
    pub request_id: Option<String>,
    /// Event payload.
    pub data: Value,
    /// Insert time.
    pub created_at: String,
}

/// Writes and queries over `audit_events` plus the JSONL mirror.
#[derive(Debug, Clone)]
pub struct AuditLog {
    db: Database,
    adapter: StorageAdapter,
}

impl AuditLog {
    /// Create a log over the shared database and adapter.
    #[must_use]
    pub fn new(db: Database, adapter: StorageAdapter) -> Self {
        Self { db, adapter }
    }

    /// Record an event. Never fails the caller.
    pub async fn record(&self, ctx: &Context, event_type: &str, data: Value) {
        let created_at = chrono::Utc::now();
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_events
                 (event_type, user_id, session_id, request_id, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    event_type,
                    ctx.user_id,
                    ctx.session_id,
                    ctx.request_id.as_str(),
                    data.to_string(),
                    created_at.to_rfc3339(),
                ],
            )
        });
        if let Err(e) = result {
            warn!(error = %e, event_type, "audit event insert failed");
        }

        // Tamper-evident JSONL append, one line per event.
        let line = serde_json::json!({
            "event_type": event_type,
            "user_id": ctx.user_id,
            "session_id": ctx.session_id,
            "request_id": ctx.request_id.as_str(),
            "data": data,
            "at": created_at.to_rfc3339(),
        });
        let mut body = line.to_string();
        body.push('\n');
        let file = format!("{}.jsonl", created_at.format("%Y-%m-%d"));
        if let Err(e) = self.adapter.append(ctx, &["audit", &file], body.as_bytes()).await {
            warn!(error = %e, event_type, "audit jsonl append failed");
        }
    }

    /// Fetch one event by row id.
    #[must_use]
    pub fn get(&self, id: i64) -> Option<AuditEvent> {
        self.db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT id, event_type, user_id, session_id, request_id, data, created_at
                     FROM audit_events WHERE id = ?1",
                    [id],
                    row_to_event,
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

    /// Most recent events for a user, newest first.
    #[must_use]
    pub fn list(&self, ctx: &Context, limit: u32) -> Vec<AuditEvent> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, event_type, user_id, session_id, request_id, data, created_at
                     FROM audit_events WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(
                    rusqlite::params![ctx.user_id, i64::from(limit)],
                    row_to_event,
                )?;
                rows.collect::<Result<Vec<_>, _>>()
            })
            .unwrap_or_default()
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let data_raw: String = row.get(5)?;
    Ok(AuditEvent {
        id: row.get(0)?,
        event_type: row.get(1)?,
        user_id: row.get(2)?,
        session_id: row.get(3)?,
        request_id: row.get(4)?,
        data: serde_json::from_str(&data_raw).unwrap_or(Value::Null),
        created_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::RequestId;
    use serde_json::json;

    fn fixtures() -> (AuditLog, Context, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(
            Database::in_memory().unwrap(),
            StorageAdapter::new(dir.path()),
        );
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = "alice".to_string();
        (log, ctx, dir)
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let (log, ctx, _dir) = fixtures();
        log.record(&ctx, "login", json!({"provider": "dev"})).await;
        log.record(&ctx, "key_created", json!({"key_type": "public"}))
            .await;

        let events = log.list(&ctx, 10);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "key_created");
        assert_eq!(events[1].event_type, "login");
        assert_eq!(events[1].data["provider"], "dev");

        let fetched = log.get(events[0].id).unwrap();
        assert_eq!(fetched.event_type, "key_created");
    }

    #[tokio::test]
    async fn test_jsonl_append_is_order_preserving() {
        let (log, ctx, dir) = fixtures();
        log.record(&ctx, "first", json!({})).await;
        log.record(&ctx, "second", json!({})).await;

        let date = chrono::Utc::now().format("%Y-%m-%d");
        let path = dir
            .path()
            .join("users/alice/audit")
            .join(format!("{date}.jsonl"));
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"first\""));
        assert!(lines[1].contains("\"second\""));
    }
}
