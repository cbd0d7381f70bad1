//! The `storage` tool: user-scoped file surface.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{Context, ToolError, ToolResult};
use cyfr_storage::{StorageAdapter, StorageError};
use serde_json::{Value, json};

use super::{action, descriptor, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Read/write/list/delete files in the caller's storage tree, plus the
/// execution-record retention pass.
pub struct StorageTool {
    services: Arc<Services>,
}

fn split_path(path: &str) -> ToolResult<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(ToolError::invalid_params("empty path"));
    }
    if StorageAdapter::is_global_prefix(segments[0]) {
        return Err(ToolError::forbidden(format!(
            "path prefix {:?} is reserved",
            segments[0]
        )));
    }
    Ok(segments)
}

fn storage_error(e: StorageError) -> ToolError {
    match e {
        StorageError::NotFound(p) => ToolError::not_found(format!("not found: {p}")),
        StorageError::InvalidSegment(s) => {
            ToolError::invalid_params(format!("invalid path segment {s:?}"))
        },
        other => ToolError::internal(other.to_string()),
    }
}

impl StorageTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn read(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let segments = split_path(str_arg(args, "path")?)?;
        let bytes = self
            .services
            .adapter
            .get(ctx, &segments)
            .await
            .map_err(storage_error)?;
        Ok(json!({"data": String::from_utf8_lossy(&bytes).into_owned()}))
    }

    async fn write(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let segments = split_path(str_arg(args, "path")?)?;
        let data = str_arg(args, "data")?;
        self.services
            .adapter
            .put(ctx, &segments, data.as_bytes())
            .await
            .map_err(storage_error)?;
        Ok(json!({"ok": true, "bytes": data.len()}))
    }

    async fn list(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let segments = split_path(str_arg(args, "path")?)?;
        let entries = self
            .services
            .adapter
            .list(ctx, &segments)
            .await
            .map_err(storage_error)?;
        Ok(json!({"entries": entries}))
    }

    async fn delete(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let segments = split_path(str_arg(args, "path")?)?;
        self.services
            .adapter
            .delete(ctx, &segments)
            .await
            .map_err(storage_error)?;
        Ok(json!({"ok": true}))
    }

    /// Retention: keep the newest N execution records (and their
    /// artifact directories) for the caller, delete the tail.
    async fn retention(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let keep = args
            .get("keep")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(100);

        let kept: Vec<String> = self
            .services
            .kernel
            .executions()
            .list(ctx, keep)
            .map_err(|e| ToolError::internal(e.to_string()))?
            .into_iter()
            .map(|r| r.id)
            .collect();
        let removed = self
            .services
            .kernel
            .executions()
            .prune_tail(ctx, keep)
            .map_err(|e| ToolError::internal(e.to_string()))?;

        // Sweep artifact directories whose record is gone.
        let mut swept = 0usize;
        let dirs = self
            .services
            .adapter
            .list(ctx, &["executions"])
            .await
            .map_err(storage_error)?;
        for dir in dirs {
            if !kept.iter().any(|id| *id == dir) {
                let outcome = self
                    .services
                    .adapter
                    .delete_tree(ctx, &["executions", &dir])
                    .await
                    .map_err(storage_error)?;
                if matches!(outcome, cyfr_storage::adapter::DeleteTreeOutcome::Removed) {
                    swept += 1;
                }
            }
        }
        Ok(json!({"pruned_records": removed, "swept_dirs": swept, "kept": kept.len()}))
    }
}

#[async_trait]
impl ToolHandler for StorageTool {
    fn name(&self) -> &'static str {
        "storage"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "storage",
            "Read and write files in the caller's storage tree",
            &["list", "read", "write", "delete", "retention"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "read" => self.read(ctx, &args).await,
            "write" => self.write(ctx, &args).await,
            "list" => self.list(ctx, &args).await,
            "delete" => self.delete(ctx, &args).await,
            "retention" => self.retention(ctx, &args).await,
            other => Err(unknown_action("storage", other)),
        }
    }
}
