//! The per-request context threaded through every subsystem.

use serde::{Deserialize, Serialize};

use crate::id::{ExecutionId, RequestId};

/// How the caller authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// A bearer `cyfr_*` API key.
    ApiKey,
    /// An `MCP-Session-Id` session token.
    Session,
    /// No credentials; only `initialize` is reachable like this.
    None,
}

/// Per-request value carrying identity, permissions, and correlation ids.
///
/// Constructed once by the transport's authentication gate and passed by
/// reference into every tool handler and subsystem call. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Owning user. `system` for unauthenticated bootstrap paths.
    pub user_id: String,
    /// Owning organization, when org-scoped.
    pub org_id: Option<String>,
    /// Permission tokens granted to the caller.
    pub permissions: Vec<String>,
    /// How the caller authenticated.
    pub auth_method: AuthMethod,
    /// Correlation id for this request, propagated into every log row.
    pub request_id: RequestId,
    /// Session backing this request, when session-authenticated.
    pub session_id: Option<String>,
    /// Set when this request is a formula re-entering the router.
    pub parent_execution_id: Option<ExecutionId>,
}

impl Context {
    /// Context for a caller that presented no credentials.
    #[must_use]
    pub fn unauthenticated(request_id: RequestId) -> Self {
        Self {
            user_id: "anonymous".to_string(),
            org_id: None,
            permissions: Vec::new(),
            auth_method: AuthMethod::None,
            request_id,
            session_id: None,
            parent_execution_id: None,
        }
    }

    /// Context for internal server paths (indexer, sweeper, migrations).
    #[must_use]
    pub fn system() -> Self {
        Self {
            user_id: "system".to_string(),
            org_id: None,
            permissions: vec!["*".to_string()],
            auth_method: AuthMethod::None,
            request_id: RequestId::new(),
            session_id: None,
            parent_execution_id: None,
        }
    }

    /// Whether the caller holds `permission` (or the `*` wildcard).
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == "*" || p == permission)
    }

    /// A child context for a formula re-entering the router.
    ///
    /// Identity and permissions are inherited; the parent execution id is
    /// recorded so nested executions correlate.
    #[must_use]
    pub fn child_for_execution(&self, execution_id: ExecutionId) -> Self {
        Self {
            parent_execution_id: Some(execution_id),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_wildcard() {
        let ctx = Context::system();
        assert!(ctx.has_permission("execution"));
        assert!(ctx.has_permission("anything"));
    }

    #[test]
    fn test_permission_exact() {
        let mut ctx = Context::unauthenticated(RequestId::new());
        assert!(!ctx.has_permission("execution"));
        ctx.permissions.push("execution".to_string());
        assert!(ctx.has_permission("execution"));
        assert!(!ctx.has_permission("secret"));
    }

    #[test]
    fn test_child_context_links_parent() {
        let ctx = Context::system();
        let exec = ExecutionId::new();
        let child = ctx.child_for_execution(exec.clone());
        assert_eq!(child.parent_execution_id, Some(exec));
        assert_eq!(child.user_id, ctx.user_id);
    }
}
