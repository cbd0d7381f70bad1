//! The `guide` tool: built-in topics and component READMEs.

use std::sync::Arc;

use async_trait::async_trait;
use cyfr_core::{ComponentRef, Context, ToolError, ToolResult};
use serde_json::{Value, json};

use super::{action, descriptor, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

const TOPICS: &[(&str, &str)] = &[
    (
        "getting-started",
        "Initialize a session with the `initialize` method, then call \
         `tools/call` with a tool name and an `action` argument. Publish a \
         component with `component.publish` and run it with `execution.run`.",
    ),
    (
        "references",
        "Components are addressed as `type:namespace.name:version` where \
         type is catalyst, reagent, or formula (shorthands c|r|f). \
         `latest` resolves to the most recently published version.",
    ),
    (
        "policies",
        "Catalysts need a stored host policy before they can reach the \
         network; the default policy denies all egress. Use `policy.set` \
         with allowed_domains, allowed_methods, timeout, and size caps.",
    ),
];

/// Serve documentation.
pub struct GuideTool {
    services: Arc<Services>,
}

impl GuideTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl ToolHandler for GuideTool {
    fn name(&self) -> &'static str {
        "guide"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "guide",
            "Built-in guides and component READMEs",
            &["list", "get", "readme"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "list" => {
                let topics: Vec<&str> = TOPICS.iter().map(|(name, _)| *name).collect();
                Ok(json!({"guides": topics}))
            },
            "get" => {
                let name = str_arg(&args, "name")?;
                let body = TOPICS
                    .iter()
                    .find(|(topic, _)| *topic == name)
                    .map(|(_, body)| *body)
                    .ok_or_else(|| ToolError::not_found(format!("no guide {name:?}")))?;
                Ok(json!({"name": name, "body": body}))
            },
            "readme" => {
                let reference = ComponentRef::normalize(str_arg(&args, "reference")?)
                    .map_err(|e| ToolError::invalid_params(e.to_string()))?;
                let record = self
                    .services
                    .registry
                    .get(ctx, &reference)
                    .map_err(|e| ToolError::not_found(e.to_string()))?;
                let mut segments = record.blob_segments().to_vec();
                if let Some(last) = segments.last_mut() {
                    *last = "README.md".to_string();
                }
                let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
                match self.services.adapter.get(ctx, &segment_refs).await {
                    Ok(bytes) => Ok(json!({
                        "reference": reference.to_string(),
                        "readme": String::from_utf8_lossy(&bytes).into_owned(),
                    })),
                    Err(_) => Err(ToolError::not_found(format!(
                        "no README for {reference}"
                    ))),
                }
            },
            other => Err(unknown_action("guide", other)),
        }
    }
}
