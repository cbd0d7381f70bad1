//! The `session` tool: whoami, logout, device flow.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{Context, ErrorCode, ToolError, ToolResult};
use serde_json::{Value, json};

use super::{action, descriptor, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Session self-service.
pub struct SessionTool {
    services: Arc<Services>,
}

impl SessionTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn whoami(&self, ctx: &Context) -> Value {
        json!({
            "user_id": ctx.user_id,
            "org_id": ctx.org_id,
            "auth_method": ctx.auth_method,
            "permissions": ctx.permissions,
            "session_id": ctx.session_id,
        })
    }

    async fn logout(&self, ctx: &Context) -> ToolResult<Value> {
        let Some(token) = &ctx.session_id else {
            return Err(ToolError::new(
                ErrorCode::SessionRequired,
                "logout requires a session",
            ));
        };
        self.services
            .sessions
            .terminate(token)
            .map_err(|e| ToolError::new(e.error_code(), e.to_string()))?;
        self.services.sse.remove(token);
        self.services
            .audit
            .record(ctx, "logout", json!({}))
            .await;
        Ok(json!({"ok": true}))
    }
}

#[async_trait]
impl ToolHandler for SessionTool {
    fn name(&self) -> &'static str {
        "session"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "session",
            "Session self-service: identity, logout, device login flow",
            &["whoami", "logout", "device_init", "device_poll"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "whoami" => Ok(self.whoami(ctx)),
            "logout" => self.logout(ctx).await,
            // Interactive login rides on an external OAuth/OIDC provider;
            // without one installed the flow is simply not available.
            "device_init" | "device_poll" => Err(ToolError::invalid_params(
                "not_configured: no interactive auth provider is installed",
            )),
            other => Err(unknown_action("session", other)),
        }
    }
}
