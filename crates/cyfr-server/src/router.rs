//! The tool registry and router.
//!
//! Tools register by name; each handler dispatches on the `action`
//! string inside its arguments. The router also implements
//! [`ToolDispatcher`], which is how formulas re-enter the surface and
//! how subsystems call each other without structural cycles.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{Context, ErrorCode, ToolDispatcher, ToolError, ToolResult};
use serde_json::{Value, json};
use tracing::debug;

use crate::state::Services;
use crate::tools;

/// One named tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The tool's registry name.
    fn name(&self) -> &'static str;

    /// Descriptor for `tools/list`: description plus JSON-schema input.
    fn descriptor(&self) -> Value;

    /// Handle one call; `args["action"]` selects the operation.
    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value>;
}

/// Name-keyed registry of tool handlers.
pub struct ToolRouter {
    handlers: HashMap<&'static str, Arc<dyn ToolHandler>>,
}

impl ToolRouter {
    /// An empty router.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The production tool set over the shared services.
    #[must_use]
    pub fn with_default_tools(services: Arc<Services>) -> Self {
        let mut router = Self::new();
        for handler in tools::default_tools(&services) {
            router.register(handler);
        }
        router
    }

    /// Register a handler under its name. Last registration wins.
    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    /// Descriptors for `tools/list`, sorted by name.
    #[must_use]
    pub fn descriptors(&self) -> Vec<Value> {
        let mut names: Vec<&&str> = self.handlers.keys().collect();
        names.sort_unstable();
        names
            .into_iter()
            .filter_map(|name| self.handlers.get(*name).map(|h| h.descriptor()))
            .collect()
    }

    /// Resource templates for `resources/list`.
    #[must_use]
    pub fn resources(&self) -> Vec<Value> {
        vec![
            json!({
                "uriTemplate": "cyfr://components/{reference}",
                "name": "component",
                "description": "Component record and metadata by reference",
            }),
            json!({
                "uriTemplate": "cyfr://executions/{execution_id}",
                "name": "execution",
                "description": "Execution record by id",
            }),
        ]
    }

    /// Observability label for a tool: which internal plane serves it.
    /// Never used for authorization.
    #[must_use]
    pub fn routed_to(tool: &str) -> &'static str {
        match tool {
            "execution" => "opus",
            "build" => "locus",
            "component" | "guide" => "compendium",
            "storage" => "arca",
            "session" | "permission" | "secret" | "key" | "audit" | "policy" | "policy_log" => {
                "sanctum"
            },
            _ => "emissary",
        }
    }

    /// Dispatch one call.
    ///
    /// # Errors
    ///
    /// `method_not_found` for unknown tools, plus whatever the handler
    /// returns.
    pub async fn handle(&self, tool: &str, ctx: &Context, args: Value) -> ToolResult<Value> {
        let handler = self.handlers.get(tool).ok_or_else(|| {
            ToolError::new(ErrorCode::MethodNotFound, format!("unknown tool: {tool}"))
        })?;
        // API-key callers carry an explicit scope; it must name the tool.
        if ctx.auth_method == cyfr_core::AuthMethod::ApiKey && !ctx.has_permission(tool) {
            return Err(ToolError::forbidden(format!(
                "API key scope does not include {tool}"
            )));
        }
        debug!(tool, routed_to = Self::routed_to(tool), "dispatch");
        handler.handle(ctx, args).await
    }
}

impl Default for ToolRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRouter")
            .field("tools", &self.handlers.len())
            .finish()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRouter {
    async fn handle(&self, tool: &str, ctx: &Context, args: Value) -> ToolResult<Value> {
        Self::handle(self, tool, ctx, args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn descriptor(&self) -> Value {
            json!({"name": "echo"})
        }

        async fn handle(&self, _ctx: &Context, args: Value) -> ToolResult<Value> {
            Ok(args)
        }
    }

    #[tokio::test]
    async fn test_dispatch_and_unknown_tool() {
        let mut router = ToolRouter::new();
        router.register(Arc::new(EchoTool));
        let ctx = Context::system();

        let out = router.handle("echo", &ctx, json!({"x": 1})).await.unwrap();
        assert_eq!(out["x"], 1);

        let err = router.handle("nope", &ctx, json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
    }

    #[tokio::test]
    async fn test_api_key_scope_enforced() {
        let mut router = ToolRouter::new();
        router.register(Arc::new(EchoTool));
        let mut ctx = Context::system();
        ctx.auth_method = cyfr_core::AuthMethod::ApiKey;
        ctx.permissions = vec!["execution".to_string()];

        let err = router.handle("echo", &ctx, json!({})).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientPermissions);

        ctx.permissions.push("echo".to_string());
        assert!(router.handle("echo", &ctx, json!({})).await.is_ok());
    }

    #[test]
    fn test_routed_to_labels() {
        assert_eq!(ToolRouter::routed_to("execution"), "opus");
        assert_eq!(ToolRouter::routed_to("component"), "compendium");
        assert_eq!(ToolRouter::routed_to("secret"), "sanctum");
        assert_eq!(ToolRouter::routed_to("system"), "emissary");
    }
}
