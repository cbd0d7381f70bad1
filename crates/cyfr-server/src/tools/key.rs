//! The `key` tool: API key lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_auth::KeyType;
use cyfr_core::{Context, ToolError, ToolResult};
use serde_json::{Value, json};

use super::{action, descriptor, opt_str, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Create, list, rotate, and revoke API keys.
pub struct KeyTool {
    services: Arc<Services>,
}

impl KeyTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

fn key_type(args: &Value) -> ToolResult<KeyType> {
    match opt_str(args, "type").unwrap_or("public") {
        "public" => Ok(KeyType::Public),
        "secret" => Ok(KeyType::Secret),
        "admin" => Ok(KeyType::Admin),
        other => Err(ToolError::invalid_params(format!(
            "unknown key type {other:?} (public|secret|admin)"
        ))),
    }
}

#[async_trait]
impl ToolHandler for KeyTool {
    fn name(&self) -> &'static str {
        "key"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "key",
            "API key lifecycle; the raw key appears once in the create response",
            &["create", "list", "rotate", "revoke"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "create" => {
                let name = str_arg(&args, "name")?;
                let scope: Vec<String> = args
                    .get("scope")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(ToString::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                let ip_allowlist: Option<Vec<String>> = args
                    .get("ip_allowlist")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(ToString::to_string)
                            .collect()
                    });
                let rate_limit = opt_str(&args, "rate_limit").map(ToString::to_string);
                if let Some(raw) = &rate_limit {
                    cyfr_core::parse_rate_limit(raw)
                        .map_err(|e| ToolError::invalid_params(e.to_string()))?;
                }

                let (record, raw_key) = self
                    .services
                    .keys
                    .create(ctx, name, key_type(&args)?, scope, ip_allowlist, rate_limit)
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                self.services
                    .audit
                    .record(ctx, "key_created", json!({
                        "key_id": record.id.clone(), "key_type": record.key_type,
                    }))
                    .await;
                // The raw key appears here and nowhere else, ever.
                Ok(json!({"key": record, "raw_key": raw_key}))
            },
            "list" => {
                let keys = self
                    .services
                    .keys
                    .list(ctx)
                    .map_err(|e| ToolError::internal(e.to_string()))?;
                Ok(json!({"keys": keys}))
            },
            "rotate" => {
                let key_id = str_arg(&args, "key_id")?;
                let (record, raw_key) = self
                    .services
                    .keys
                    .rotate(ctx, key_id)
                    .map_err(|e| ToolError::new(e.error_code(), e.to_string()))?;
                self.services
                    .audit
                    .record(ctx, "key_rotated", json!({"key_id": record.id.clone()}))
                    .await;
                Ok(json!({"key": record, "raw_key": raw_key}))
            },
            "revoke" => {
                let key_id = str_arg(&args, "key_id")?;
                self.services
                    .keys
                    .revoke(ctx, key_id)
                    .map_err(|e| ToolError::new(e.error_code(), e.to_string()))?;
                self.services
                    .audit
                    .record(ctx, "key_revoked", json!({"key_id": key_id}))
                    .await;
                Ok(json!({"ok": true}))
            },
            other => Err(unknown_action("key", other)),
        }
    }
}
