//! The canonical tool set.

use std::sync::Arc;

use cyfr_core::{ToolError, ToolResult};
use serde_json::{Value, json};

use crate::router::ToolHandler;
use crate::state::Services;

pub mod audit;
pub mod build;
pub mod component;
pub mod execution;
pub mod guide;
pub mod key;
pub mod permission;
pub mod policy;
pub mod policy_log;
pub mod secret;
pub mod session;
pub mod storage;

/// Every production tool over the shared services.
#[must_use]
pub fn default_tools(services: &Arc<Services>) -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(execution::ExecutionTool::new(Arc::clone(services))),
        Arc::new(component::ComponentTool::new(Arc::clone(services))),
        Arc::new(storage::StorageTool::new(Arc::clone(services))),
        Arc::new(session::SessionTool::new(Arc::clone(services))),
        Arc::new(permission::PermissionTool::new(Arc::clone(services))),
        Arc::new(secret::SecretTool::new(Arc::clone(services))),
        Arc::new(key::KeyTool::new(Arc::clone(services))),
        Arc::new(audit::AuditTool::new(Arc::clone(services))),
        Arc::new(policy::PolicyTool::new(Arc::clone(services))),
        Arc::new(policy_log::PolicyLogTool::new(Arc::clone(services))),
        Arc::new(guide::GuideTool::new(Arc::clone(services))),
        Arc::new(build::BuildTool::new(Arc::clone(services))),
    ]
}

/// The `action` argument every tool dispatches on.
pub(crate) fn action(args: &Value) -> ToolResult<&str> {
    args.get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_params("missing required argument: action"))
}

/// A required string argument.
pub(crate) fn str_arg<'a>(args: &'a Value, key: &str) -> ToolResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_params(format!("missing required argument: {key}")))
}

/// An optional string argument.
pub(crate) fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

/// An optional bounded limit argument.
pub(crate) fn limit_arg(args: &Value, default: u32) -> u32 {
    args.get("limit")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(default)
        .min(500)
}

/// Shared descriptor shape: every tool takes an `action` plus
/// action-specific arguments.
pub(crate) fn descriptor(name: &str, description: &str, actions: &[&str]) -> Value {
    json!({
        "name": name,
        "description": description,
        "inputSchema": {
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": actions},
            },
            "required": ["action"],
            "additionalProperties": true,
        },
    })
}

/// Unknown-action error shared by every tool.
pub(crate) fn unknown_action(tool: &str, action: &str) -> ToolError {
    ToolError::invalid_params(format!("unknown {tool} action: {action}"))
}
