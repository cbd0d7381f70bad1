//! The `execution` tool: run, list, logs, cancel.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{ComponentType, Context, ExecutionId, ToolError, ToolResult};
use cyfr_engine::{Reference, RunOptions};
use serde_json::{Value, json};

use super::{action, descriptor, limit_arg, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Runs components and reads execution records.
pub struct ExecutionTool {
    services: Arc<Services>,
}

impl ExecutionTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    async fn run(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let reference_arg = args
            .get("reference")
            .ok_or_else(|| ToolError::invalid_params("missing required argument: reference"))?;
        let reference = Reference::from_value(reference_arg)
            .map_err(|e| ToolError::new(e.error_code(), e.to_string()))?;
        let input = args.get("input").cloned().unwrap_or_else(|| json!({}));

        let mut opts = RunOptions::default();
        if let Some(entry) = args.get("entry_point").and_then(Value::as_str) {
            opts.entry_point = Some(entry.to_string());
        }
        if let Some(type_name) = args.get("type").and_then(Value::as_str) {
            opts.component_type = Some(
                ComponentType::parse(type_name)
                    .map_err(|e| ToolError::invalid_params(e.to_string()))?,
            );
        }
        if let Some(fuel) = args.get("fuel_limit").and_then(Value::as_u64) {
            opts.fuel_limit = Some(fuel);
        }

        let outcome = self
            .services
            .kernel
            .run(ctx, reference, input, opts)
            .await
            .map_err(|e| ToolError::new(e.error_code(), e.to_string()))?;
        Ok(json!({
            "execution_id": outcome.execution_id,
            "status": outcome.status.as_str(),
            "output": outcome.output,
            "duration_ms": outcome.duration_ms,
        }))
    }

    fn list(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let records = self
            .services
            .kernel
            .executions()
            .list(ctx, limit_arg(args, 50))
            .map_err(|e| ToolError::internal(e.to_string()))?;
        Ok(json!({"executions": records}))
    }

    fn logs(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let execution_id = ExecutionId::from_string(str_arg(args, "execution_id")?);
        let record = self
            .services
            .kernel
            .executions()
            .get(&execution_id)
            .map_err(|e| ToolError::internal(e.to_string()))?
            .ok_or_else(|| ToolError::not_found(format!("no execution {execution_id}")))?;
        if record.user_id != ctx.user_id && !ctx.has_permission("*") {
            return Err(ToolError::forbidden("execution belongs to another user"));
        }
        let policy_logs = self.services.policy_log.for_execution(&execution_id);
        Ok(json!({"execution": record, "policy_logs": policy_logs}))
    }

    fn cancel(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let execution_id = ExecutionId::from_string(str_arg(args, "execution_id")?);
        self.services
            .kernel
            .cancel(ctx, &execution_id)
            .map_err(|e| ToolError::new(e.error_code(), e.to_string()))?;
        Ok(json!({"execution_id": execution_id.as_str(), "status": "cancelled"}))
    }
}

#[async_trait]
impl ToolHandler for ExecutionTool {
    fn name(&self) -> &'static str {
        "execution"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "execution",
            "Run WASM components in the sandbox and inspect execution records",
            &["run", "list", "logs", "cancel"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "run" => self.run(ctx, &args).await,
            "list" => self.list(ctx, &args),
            "logs" => self.logs(ctx, &args),
            "cancel" => self.cancel(ctx, &args),
            other => Err(unknown_action("execution", other)),
        }
    }
}
