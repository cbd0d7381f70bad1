//! Error types shared across the runtime.

use thiserror::Error;

/// Errors produced while parsing component references.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefError {
    /// Input was empty or whitespace-only.
    #[error("component reference is empty")]
    Empty,

    /// Unknown component type prefix.
    #[error("unknown component type: {0}")]
    UnknownType(String),

    /// Version segment did not match `N.N.N` or `latest`.
    #[error("invalid version {version:?} in reference {input:?}")]
    InvalidVersion {
        /// The offending version segment.
        version: String,
        /// The full input being parsed.
        input: String,
    },

    /// Namespace contained a dot or was empty.
    #[error("invalid namespace {namespace:?} in reference {input:?}")]
    InvalidNamespace {
        /// The offending namespace segment.
        namespace: String,
        /// The full input being parsed.
        input: String,
    },

    /// Name segment was empty.
    #[error("missing component name in reference {0:?}")]
    MissingName(String),

    /// The grammar could not be matched at all.
    #[error("unparseable component reference {0:?}")]
    Unparseable(String),

    /// `normalize` was asked for a reference without an explicit type.
    #[error("reference {0:?} has no component type; normalized references require one")]
    MissingType(String),
}

/// Result type for reference parsing.
pub type RefResult<T> = Result<T, RefError>;

/// The closed table of JSON-RPC error codes spoken on the wire.
///
/// Handlers return these through [`crate::ToolError`]; the transport maps
/// them onto JSON-RPC `error.code` values without inventing new codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed JSON-RPC envelope.
    InvalidRequest,
    /// Unknown method.
    MethodNotFound,
    /// Missing or badly typed argument.
    InvalidParams,
    /// Server-side failure that is not the caller's fault.
    InternalError,
    /// No credentials supplied where some were required.
    AuthRequired,
    /// API key or token failed validation.
    AuthInvalid,
    /// Credentials were valid once but have expired.
    AuthExpired,
    /// Scope or IP allow-list denied the operation.
    InsufficientPermissions,
    /// Guest trap or host error during execution.
    ExecutionFailed,
    /// Wall-clock or fuel limit reached during execution.
    ExecutionTimeout,
    /// Component resolution failed.
    ComponentNotFound,
    /// Non-initialize request arrived without a session.
    SessionRequired,
    /// Session ID is unknown or terminated.
    SessionExpired,
}

impl ErrorCode {
    /// The numeric JSON-RPC `error.code`.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::AuthRequired => -33001,
            Self::AuthInvalid => -33002,
            Self::AuthExpired => -33003,
            Self::InsufficientPermissions => -33004,
            Self::ExecutionFailed => -33100,
            Self::ExecutionTimeout => -33101,
            Self::ComponentNotFound => -33200,
            Self::SessionRequired => -33301,
            Self::SessionExpired => -33302,
        }
    }

    /// Stable snake_case name used in log rows and error payloads.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::MethodNotFound => "method_not_found",
            Self::InvalidParams => "invalid_params",
            Self::InternalError => "internal_error",
            Self::AuthRequired => "auth_required",
            Self::AuthInvalid => "auth_invalid",
            Self::AuthExpired => "auth_expired",
            Self::InsufficientPermissions => "insufficient_permissions",
            Self::ExecutionFailed => "execution_failed",
            Self::ExecutionTimeout => "execution_timeout",
            Self::ComponentNotFound => "component_not_found",
            Self::SessionRequired => "session_required",
            Self::SessionExpired => "session_expired",
        }
    }

    /// The HTTP status the transport pairs with this code.
    #[must_use]
    pub fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest | Self::InvalidParams | Self::SessionRequired => 400,
            Self::AuthRequired | Self::AuthInvalid | Self::AuthExpired => 401,
            Self::InsufficientPermissions => 403,
            Self::MethodNotFound | Self::ComponentNotFound | Self::SessionExpired => 404,
            Self::InternalError | Self::ExecutionFailed => 500,
            Self::ExecutionTimeout => 504,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_table() {
        assert_eq!(ErrorCode::InvalidRequest.code(), -32600);
        assert_eq!(ErrorCode::AuthRequired.code(), -33001);
        assert_eq!(ErrorCode::AuthInvalid.code(), -33002);
        assert_eq!(ErrorCode::InsufficientPermissions.code(), -33004);
        assert_eq!(ErrorCode::ExecutionFailed.code(), -33100);
        assert_eq!(ErrorCode::ExecutionTimeout.code(), -33101);
        assert_eq!(ErrorCode::ComponentNotFound.code(), -33200);
        assert_eq!(ErrorCode::SessionRequired.code(), -33301);
        assert_eq!(ErrorCode::SessionExpired.code(), -33302);
    }

    #[test]
    fn test_http_pairing() {
        assert_eq!(ErrorCode::AuthInvalid.http_status(), 401);
        assert_eq!(ErrorCode::SessionExpired.http_status(), 404);
        assert_eq!(ErrorCode::SessionRequired.http_status(), 400);
    }
}
