//! Cyfr Server - the MCP transport.
//!
//! One axum application exposes the whole governance plane:
//! `POST /mcp` (JSON-RPC 2.0, single or batch), `DELETE /mcp` (session
//! termination), `GET /mcp/sse` (server-sent events with resumption),
//! and `GET /api/health`.
//!
//! Every request runs the same pipeline: authentication gate, session
//! gate, JSON-RPC decode, tool dispatch through the router, request-log
//! bookkeeping, and SSE fan-out of the response.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod auth_gate;
pub mod config;
pub mod http;
pub mod jsonrpc;
pub mod router;
pub mod sse;
pub mod state;
pub mod tools;

pub use config::ServerConfig;
pub use http::build_app;
pub use router::{ToolHandler, ToolRouter};
pub use sse::SseHub;
pub use state::{AppState, Services};

/// The negotiated MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2025-11-25";
