//! The `secret` tool.
//!
//! Plaintext values never cross this surface: `get` returns metadata,
//! `resolve_granted` returns the *names* a component may read. Actual
//! values surface only inside the sandbox via the execution kernel's
//! preload stage.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{ComponentRef, Context, ToolError, ToolResult};
use cyfr_secrets::{SecretError, SecretScope};
use serde_json::{Value, json};

use super::{action, descriptor, opt_str, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

fn secret_error(e: SecretError) -> ToolError {
    match e {
        SecretError::NotFound(name) => ToolError::not_found(format!("secret not found: {name}")),
        SecretError::UnknownScope(_) | SecretError::Reference(_) => {
            ToolError::invalid_params(e.to_string())
        },
        other => ToolError::internal(other.to_string()),
    }
}

/// Secret lifecycle and grants.
pub struct SecretTool {
    services: Arc<Services>,
}

impl SecretTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn scope(args: &Value) -> ToolResult<SecretScope> {
        SecretScope::parse(opt_str(args, "scope").unwrap_or("personal"))
            .map_err(secret_error)
    }

    fn component_ref(args: &Value) -> ToolResult<ComponentRef> {
        ComponentRef::normalize(str_arg(args, "component_ref")?)
            .map_err(|e| ToolError::invalid_params(e.to_string()))
    }
}

#[async_trait]
impl ToolHandler for SecretTool {
    fn name(&self) -> &'static str {
        "secret"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "secret",
            "Store encrypted secrets and grant components read access",
            &["set", "get", "list", "delete", "grant", "revoke", "resolve_granted"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        let scope = Self::scope(&args)?;
        match action(&args)? {
            "set" => {
                let name = str_arg(&args, "name")?;
                let value = str_arg(&args, "value")?;
                self.services
                    .secrets
                    .set(ctx, name, value, scope)
                    .map_err(secret_error)?;
                self.services
                    .audit
                    .record(ctx, "secret_set", json!({
                        "name": name, "scope": scope.as_str(),
                    }))
                    .await;
                Ok(json!({"ok": true, "name": name}))
            },
            "get" => {
                // Metadata only; the plaintext never crosses the surface.
                let name = str_arg(&args, "name")?;
                let names = self.services.secrets.list(ctx, scope).map_err(secret_error)?;
                if !names.iter().any(|n| n == name) {
                    return Err(ToolError::not_found(format!("secret not found: {name}")));
                }
                Ok(json!({"name": name, "scope": scope.as_str(), "exists": true}))
            },
            "list" => {
                let names = self.services.secrets.list(ctx, scope).map_err(secret_error)?;
                Ok(json!({"scope": scope.as_str(), "secrets": names}))
            },
            "delete" => {
                let name = str_arg(&args, "name")?;
                self.services
                    .secrets
                    .delete(ctx, name, scope)
                    .map_err(secret_error)?;
                self.services
                    .audit
                    .record(ctx, "secret_deleted", json!({
                        "name": name, "scope": scope.as_str(),
                    }))
                    .await;
                Ok(json!({"ok": true}))
            },
            "grant" => {
                let name = str_arg(&args, "name")?;
                let component_ref = Self::component_ref(&args)?;
                self.services
                    .secrets
                    .grant(ctx, name, &component_ref, scope)
                    .map_err(secret_error)?;
                self.services
                    .audit
                    .record(ctx, "secret_granted", json!({
                        "name": name, "component_ref": component_ref.to_string(),
                    }))
                    .await;
                Ok(json!({"ok": true}))
            },
            "revoke" => {
                let name = str_arg(&args, "name")?;
                let component_ref = Self::component_ref(&args)?;
                let removed = self
                    .services
                    .secrets
                    .revoke(ctx, name, &component_ref, scope)
                    .map_err(secret_error)?;
                self.services
                    .audit
                    .record(ctx, "secret_revoked", json!({
                        "name": name, "component_ref": component_ref.to_string(),
                    }))
                    .await;
                Ok(json!({"removed": removed}))
            },
            "resolve_granted" => {
                let component_ref = Self::component_ref(&args)?;
                let grants = self
                    .services
                    .secrets
                    .grants_for(ctx, &component_ref)
                    .map_err(secret_error)?;
                let names: Vec<Value> = grants
                    .into_iter()
                    .map(|(name, scope)| json!({"name": name, "scope": scope.as_str()}))
                    .collect();
                Ok(json!({"component_ref": component_ref.to_string(), "grants": names}))
            },
            other => Err(unknown_action("secret", other)),
        }
    }
}
