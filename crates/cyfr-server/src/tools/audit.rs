//! The `audit` tool: read the audit event trail.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{Context, ToolError, ToolResult};
use serde_json::{Value, json};

use super::{action, descriptor, limit_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// List and fetch audit events.
pub struct AuditTool {
    services: Arc<Services>,
}

impl AuditTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ToolHandler for AuditTool {
    fn name(&self) -> &'static str {
        "audit"
    }

    fn descriptor(&self) -> Value {
        descriptor("audit", "Read the audit event trail", &["list", "get"])
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "list" => {
                let events = self.services.audit.list(ctx, limit_arg(&args, 50));
                Ok(json!({"events": events}))
            },
            "get" => {
                let id = args
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ToolError::invalid_params("missing required argument: id"))?;
                let event = self
                    .services
                    .audit
                    .get(id)
                    .ok_or_else(|| ToolError::not_found(format!("no audit event {id}")))?;
                if event.user_id.as_deref() != Some(ctx.user_id.as_str())
                    && !ctx.has_permission("*")
                {
                    return Err(ToolError::forbidden("audit event belongs to another user"));
                }
                Ok(json!({"event": event}))
            },
            other => Err(unknown_action("audit", other)),
        }
    }
}
