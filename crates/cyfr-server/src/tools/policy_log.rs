//! The `policy_log` tool.
//!
//! Internal surface: the server's own components write consultations
//! through it, and administrators query them. End users never call it.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_audit::PolicyDecision;
use cyfr_core::{Context, ExecutionId, ToolError, ToolResult};
use serde_json::{Value, json};

use super::{action, descriptor, limit_arg, opt_str, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Write and query policy consultations.
pub struct PolicyLogTool {
    services: Arc<Services>,
}

impl PolicyLogTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn require_admin(ctx: &Context) -> ToolResult<()> {
        if ctx.has_permission("*") || ctx.has_permission("policy_log") {
            Ok(())
        } else {
            Err(ToolError::forbidden("policy_log is an internal surface"))
        }
    }
}

#[async_trait]
impl ToolHandler for PolicyLogTool {
    fn name(&self) -> &'static str {
        "policy_log"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "policy_log",
            "Internal policy-consultation log",
            &["log", "get", "list", "delete"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        Self::require_admin(ctx)?;
        match action(&args)? {
            "log" => {
                let reference = str_arg(&args, "reference")?;
                let decision = match str_arg(&args, "decision")? {
                    "allow" => PolicyDecision::Allow,
                    "deny" => PolicyDecision::Deny,
                    other => {
                        return Err(ToolError::invalid_params(format!(
                            "decision must be allow|deny, got {other:?}"
                        )));
                    },
                };
                let execution_id = opt_str(&args, "execution_id").map(ExecutionId::from_string);
                self.services.policy_log.record(
                    ctx,
                    reference,
                    opt_str(&args, "component_type"),
                    execution_id.as_ref(),
                    args.get("policy").unwrap_or(&Value::Null),
                    decision,
                    opt_str(&args, "reason"),
                );
                Ok(json!({"ok": true}))
            },
            "get" => {
                let id = args
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ToolError::invalid_params("missing required argument: id"))?;
                let entry = self
                    .services
                    .policy_log
                    .get(id)
                    .ok_or_else(|| ToolError::not_found(format!("no policy log entry {id}")))?;
                Ok(json!({"entry": entry}))
            },
            "list" => {
                let entries = self.services.policy_log.list(ctx, limit_arg(&args, 50));
                Ok(json!({"entries": entries}))
            },
            "delete" => {
                let id = args
                    .get("id")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ToolError::invalid_params("missing required argument: id"))?;
                Ok(json!({"removed": self.services.policy_log.delete(id)}))
            },
            other => Err(unknown_action("policy_log", other)),
        }
    }
}
