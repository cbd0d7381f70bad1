//! The authentication gate.
//!
//! Order is fixed: a `cyfr_`-prefixed bearer value is an API key and
//! must validate (including the client IP); otherwise a session header
//! is resolved (memory first, table hydration on miss); otherwise the
//! request proceeds unauthenticated and the session gate decides whether
//! `initialize` is in flight.

use std::net::IpAddr;

use axum::http::HeaderMap;
use cyfr_auth::AuthError;
use cyfr_core::{AuthMethod, Context, ErrorCode, RequestId};
use tracing::debug;

use crate::state::Services;

/// Session header name.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// What the gate decided.
pub struct GateOutcome {
    /// The per-request context.
    pub ctx: Context,
    /// Session token backing the context, when session-authenticated.
    pub session_token: Option<String>,
}

/// A gate rejection: HTTP status plus wire error code and message.
pub struct GateRejection {
    /// HTTP status to respond with.
    pub status: u16,
    /// Wire error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

fn reject(code: ErrorCode, message: impl Into<String>) -> GateRejection {
    GateRejection {
        status: code.http_status(),
        code,
        message: message.into(),
    }
}

/// Client IP: first `X-Forwarded-For` entry, else the socket remote.
#[must_use]
pub fn client_ip(headers: &HeaderMap, remote: Option<IpAddr>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or(remote)
}

/// Run the gate for one request.
///
/// # Errors
///
/// Returns a [`GateRejection`] for invalid API keys and for dead
/// sessions on non-`initialize` methods.
pub fn authenticate(
    services: &Services,
    headers: &HeaderMap,
    remote: Option<IpAddr>,
    method: Option<&str>,
    request_id: RequestId,
) -> Result<GateOutcome, GateRejection> {
    // 1. Bearer API key.
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    if let Some(token) = bearer
        && token.starts_with("cyfr_")
    {
        let ip = client_ip(headers, remote);
        return match services.keys.validate(token, ip) {
            Ok(record) => {
                debug!(key_id = %record.id, "api key authenticated");
                Ok(GateOutcome {
                    ctx: Context {
                        user_id: record.user_id,
                        org_id: None,
                        permissions: record.scope,
                        auth_method: AuthMethod::ApiKey,
                        request_id,
                        session_id: None,
                        parent_execution_id: None,
                    },
                    session_token: None,
                })
            },
            Err(e) => Err(reject(e.error_code(), e.to_string())),
        };
    }

    // 2. Session header.
    if let Some(token) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        match services.sessions.get(token) {
            Ok(session) => {
                // Activity-based TTL: refresh off the request path.
                services.sessions.spawn_refresh(token.to_string());
                return Ok(GateOutcome {
                    ctx: Context {
                        user_id: session.user_id,
                        org_id: None,
                        permissions: session.permissions,
                        auth_method: AuthMethod::Session,
                        request_id,
                        session_id: Some(token.to_string()),
                        parent_execution_id: None,
                    },
                    session_token: Some(token.to_string()),
                });
            },
            Err(
                AuthError::SessionNotFound
                | AuthError::SessionRevoked
                | AuthError::SessionExpired,
            ) if method == Some("initialize") =>
            {
                // Re-initialization after a restart: fall through
                // unauthenticated; the pipeline will mint a new session.
            },
            Err(e) => return Err(reject(e.error_code(), e.to_string())),
        }
    }

    // 3. No credentials (or a dead session on initialize).
    Ok(GateOutcome {
        ctx: Context::unauthenticated(request_id),
        session_token: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.1.2.3, 172.16.0.1".parse().unwrap());
        let remote: IpAddr = "127.0.0.1".parse().unwrap();
        assert_eq!(
            client_ip(&headers, Some(remote)),
            Some("10.1.2.3".parse().unwrap())
        );
        assert_eq!(client_ip(&HeaderMap::new(), Some(remote)), Some(remote));
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
