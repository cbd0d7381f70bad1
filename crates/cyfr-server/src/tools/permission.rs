//! The `permission` tool: durable grants.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{Context, ToolError, ToolResult};
use serde_json::{Value, json};

use super::{action, descriptor, opt_str, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Grant, revoke, and list permission tokens.
pub struct PermissionTool {
    services: Arc<Services>,
}

impl PermissionTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn require_admin(ctx: &Context) -> ToolResult<()> {
        if ctx.has_permission("*") || ctx.has_permission("permission") {
            Ok(())
        } else {
            Err(ToolError::forbidden("permission administration requires the permission scope"))
        }
    }
}

#[async_trait]
impl ToolHandler for PermissionTool {
    fn name(&self) -> &'static str {
        "permission"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "permission",
            "Administer durable permission grants",
            &["grant", "revoke", "list"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "grant" => {
                Self::require_admin(ctx)?;
                let user_id = str_arg(&args, "user_id")?;
                let permission = str_arg(&args, "permission")?;
                self.services
                    .permissions
                    .grant(user_id, permission, &ctx.user_id)
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                self.services
                    .audit
                    .record(ctx, "permission_granted", json!({
                        "user_id": user_id, "permission": permission,
                    }))
                    .await;
                Ok(json!({"ok": true}))
            },
            "revoke" => {
                Self::require_admin(ctx)?;
                let user_id = str_arg(&args, "user_id")?;
                let permission = str_arg(&args, "permission")?;
                let removed = self
                    .services
                    .permissions
                    .revoke(user_id, permission)
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                self.services
                    .audit
                    .record(ctx, "permission_revoked", json!({
                        "user_id": user_id, "permission": permission,
                    }))
                    .await;
                Ok(json!({"removed": removed}))
            },
            "list" => {
                let user_id = opt_str(&args, "user_id").unwrap_or(&ctx.user_id);
                if user_id != ctx.user_id {
                    Self::require_admin(ctx)?;
                }
                let permissions = self
                    .services
                    .permissions
                    .list(user_id)
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                Ok(json!({"user_id": user_id, "permissions": permissions}))
            },
            other => Err(unknown_action("permission", other)),
        }
    }
}
