//! The `component` tool: registry surface.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use cyfr_core::{ComponentRef, ComponentType, Context, ToolError, ToolResult};
use cyfr_registry::{PublishAttrs, RegistryError, SearchFilter};
use serde_json::{Value, json};

use super::{action, descriptor, opt_str, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

fn registry_error(e: &RegistryError) -> ToolError {
    match e {
        RegistryError::NotFound(_) | RegistryError::BlobNotFound(_) => {
            ToolError::not_found(e.to_string())
        },
        RegistryError::Storage(_) => ToolError::internal(e.to_string()),
        _ => ToolError::invalid_params(e.to_string()),
    }
}

fn decode_wasm_base64(args: &Value) -> ToolResult<Vec<u8>> {
    let raw = str_arg(args, "wasm_base64")?;
    base64::engine::general_purpose::STANDARD
        .decode(raw)
        .map_err(|e| ToolError::invalid_params(format!("wasm_base64 is not valid base64: {e}")))
}

/// Publish, search, inspect, and retrieve components.
pub struct ComponentTool {
    services: Arc<Services>,
}

impl ComponentTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn parse_ref(args: &Value) -> ToolResult<ComponentRef> {
        let raw = str_arg(args, "reference")?;
        ComponentRef::normalize(raw).map_err(|e| ToolError::invalid_params(e.to_string()))
    }

    async fn publish(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let bytes = decode_wasm_base64(args)?;
        let component_type = match opt_str(args, "type") {
            Some(name) => Some(
                ComponentType::parse(name)
                    .map_err(|e| ToolError::invalid_params(e.to_string()))?,
            ),
            None => None,
        };
        let attrs = PublishAttrs {
            name: str_arg(args, "name")?.to_string(),
            version: str_arg(args, "version")?.to_string(),
            component_type,
            publisher: opt_str(args, "publisher").map(ToString::to_string),
            description: opt_str(args, "description").map(ToString::to_string),
            tags: args
                .get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            category: opt_str(args, "category").map(ToString::to_string),
            license: opt_str(args, "license").map(ToString::to_string),
        };
        let record = self
            .services
            .registry
            .publish_bytes(ctx, &bytes, attrs)
            .await
            .map_err(|e| registry_error(&e))?;
        self.services
            .audit
            .record(ctx, "component_published", json!({
                "reference": record.reference().to_string(),
                "digest": record.digest.clone(),
            }))
            .await;
        Ok(json!({"component": record}))
    }

    async fn register(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let path = PathBuf::from(str_arg(args, "path")?);
        let force = args.get("force").and_then(Value::as_bool).unwrap_or(false);
        let (outcome, record) = self
            .services
            .registry
            .register_from_directory(ctx, &path, force)
            .await
            .map_err(|e| registry_error(&e))?;
        Ok(json!({
            "outcome": match outcome {
                cyfr_registry::RegisterOutcome::Registered => "registered",
                cyfr_registry::RegisterOutcome::Unchanged => "unchanged",
            },
            "component": record,
        }))
    }

    fn search(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let filter: SearchFilter = serde_json::from_value(args.clone())
            .map_err(|e| ToolError::invalid_params(format!("bad search filter: {e}")))?;
        let records = self
            .services
            .registry
            .search(ctx, &filter)
            .map_err(|e| registry_error(&e))?;
        Ok(json!({"components": records}))
    }

    fn resolve(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let reference = Self::parse_ref(args)?;
        let record = self
            .services
            .registry
            .get(ctx, &reference)
            .map_err(|e| registry_error(&e))?;
        Ok(json!({"component": record}))
    }

    fn inspect(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let reference = Self::parse_ref(args)?;
        let record = self
            .services
            .registry
            .get(ctx, &reference)
            .map_err(|e| registry_error(&e))?;
        let blob_path = record.blob_segments().join("/");
        Ok(json!({
            "exports": record.exports.clone(),
            "blob_path": blob_path,
            "component": record,
        }))
    }

    async fn pull(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let reference = Self::parse_ref(args)?;
        let record = self
            .services
            .registry
            .get(ctx, &reference)
            .map_err(|e| registry_error(&e))?;
        let bytes = self
            .services
            .registry
            .get_blob(ctx, &record.digest)
            .await
            .map_err(|e| registry_error(&e))?;
        Ok(json!({
            "component": record,
            "wasm_base64": base64::engine::general_purpose::STANDARD.encode(bytes),
        }))
    }

    async fn get_blob(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let digest = str_arg(args, "digest")?;
        let bytes = self
            .services
            .registry
            .get_blob(ctx, digest)
            .await
            .map_err(|e| registry_error(&e))?;
        Ok(json!({
            "digest": digest,
            "size": bytes.len(),
            "wasm_base64": base64::engine::general_purpose::STANDARD.encode(bytes),
        }))
    }

    fn categories(&self, ctx: &Context) -> ToolResult<Value> {
        let categories = self
            .services
            .registry
            .categories(ctx)
            .map_err(|e| registry_error(&e))?;
        let entries: Vec<Value> = categories
            .into_iter()
            .map(|(name, count)| json!({"category": name, "count": count}))
            .collect();
        Ok(json!({"categories": entries}))
    }

    async fn delete(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let reference = Self::parse_ref(args)?;
        self.services
            .registry
            .delete(ctx, &reference)
            .await
            .map_err(|e| registry_error(&e))?;
        self.services
            .audit
            .record(ctx, "component_deleted", json!({
                "reference": reference.to_string(),
            }))
            .await;
        Ok(json!({"deleted": reference.to_string()}))
    }
}

#[async_trait]
impl ToolHandler for ComponentTool {
    fn name(&self) -> &'static str {
        "component"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "component",
            "Search, inspect, publish, and retrieve WASM components",
            &[
                "search", "inspect", "pull", "publish", "register", "resolve", "categories",
                "get_blob", "delete",
            ],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "search" => self.search(ctx, &args),
            "inspect" => self.inspect(ctx, &args),
            "pull" => self.pull(ctx, &args).await,
            "publish" => self.publish(ctx, &args).await,
            "register" => self.register(ctx, &args).await,
            "resolve" => self.resolve(ctx, &args),
            "categories" => self.categories(ctx),
            "get_blob" => self.get_blob(ctx, &args).await,
            "delete" => self.delete(ctx, &args).await,
            other => Err(unknown_action("component", other)),
        }
    }
}
