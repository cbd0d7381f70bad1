//! The uniform tool-dispatch seam.
//!
//! Subsystems never import each other's handlers directly; cross-subsystem
//! calls (a formula re-entering the router, the indexer touching the
//! registry tool) go through [`ToolDispatcher`]. The transport's router is
//! the one production implementation.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::Context;
use crate::error::ErrorCode;

/// A structured handler error: a code from the closed table plus a
/// human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ToolError {
    /// Wire error code.
    pub code: ErrorCode,
    /// Human-readable detail, safe to show to the caller.
    pub message: String,
}

impl ToolError {
    /// Build an error from a code and message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `invalid_params` shorthand.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// `internal_error` shorthand.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// `component_not_found` shorthand.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ComponentNotFound, message)
    }

    /// `insufficient_permissions` shorthand.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InsufficientPermissions, message)
    }
}

/// Result type for tool handlers.
pub type ToolResult<T> = Result<T, ToolError>;

/// Name-addressed dispatch into the tool surface.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Dispatch `args` to `tool` under `ctx` and return its JSON result.
    async fn handle(&self, tool: &str, ctx: &Context, args: Value) -> ToolResult<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_display() {
        let err = ToolError::not_found("no such component: r:local.math:1.0.0");
        assert_eq!(
            err.to_string(),
            "component_not_found: no such component: r:local.math:1.0.0"
        );
    }
}
