//! The `policy` tool: host-policy administration.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{ComponentRef, Context, ToolError, ToolResult};
use cyfr_policy::HostPolicy;
use serde_json::{Value, json};

use super::{action, descriptor, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Get, set, delete, and list host policies.
pub struct PolicyTool {
    services: Arc<Services>,
}

impl PolicyTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn reference(args: &Value) -> ToolResult<ComponentRef> {
        ComponentRef::normalize(str_arg(args, "reference")?)
            .map_err(|e| ToolError::invalid_params(e.to_string()))
    }

    fn require_admin(ctx: &Context) -> ToolResult<()> {
        if ctx.has_permission("*") || ctx.has_permission("policy") {
            Ok(())
        } else {
            Err(ToolError::forbidden("policy administration requires the policy scope"))
        }
    }
}

#[async_trait]
impl ToolHandler for PolicyTool {
    fn name(&self) -> &'static str {
        "policy"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "policy",
            "Administer per-component host policies",
            &["get", "set", "delete", "list"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "get" => {
                let reference = Self::reference(&args)?;
                let loaded = self
                    .services
                    .policies
                    .load(&reference)
                    .map_err(|e| ToolError::invalid_params(e.to_string()))?;
                Ok(json!({
                    "reference": reference.to_string(),
                    "stored": loaded.stored,
                    "policy": loaded.policy.to_map(),
                }))
            },
            "set" => {
                Self::require_admin(ctx)?;
                let reference = Self::reference(&args)?;
                let component_type = reference
                    .require_type()
                    .map_err(|e| ToolError::invalid_params(e.to_string()))?;
                let map = args
                    .get("policy")
                    .ok_or_else(|| ToolError::invalid_params("missing required argument: policy"))?;
                let policy = HostPolicy::from_map(map, component_type)
                    .map_err(|e| ToolError::invalid_params(e.to_string()))?;
                self.services
                    .policies
                    .upsert(&reference, &policy)
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                self.services
                    .audit
                    .record(ctx, "policy_changed", json!({
                        "reference": reference.to_string(),
                    }))
                    .await;
                Ok(json!({"ok": true, "reference": reference.to_string()}))
            },
            "delete" => {
                Self::require_admin(ctx)?;
                let reference = Self::reference(&args)?;
                let removed = self
                    .services
                    .policies
                    .delete(&reference)
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                self.services
                    .audit
                    .record(ctx, "policy_deleted", json!({
                        "reference": reference.to_string(),
                    }))
                    .await;
                Ok(json!({"removed": removed}))
            },
            "list" => {
                let references = self
                    .services
                    .policies
                    .list()
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                Ok(json!({"references": references}))
            },
            other => Err(unknown_action("policy", other)),
        }
    }
}
