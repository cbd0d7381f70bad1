//! Cyfr Audit - the three append-only logs.
//!
//! - [`RequestLog`]: one row per MCP request (`started` then
//!   `completed`/`failed`), payloads inline, mirrored to
//!   `mcp_logs/<request_id>.json`.
//! - [`PolicyLog`]: one row per policy consultation, allow or deny, with
//!   the full policy snapshot.
//! - [`AuditLog`]: security-relevant events, also appended to a per-user
//!   date-keyed JSONL file for tamper evidence.
//!
//! Every write here is best-effort: failures are logged at `warn!` and
//! swallowed, never surfaced to the request that produced them.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod audit;
pub mod policy_log;
pub mod request_log;

pub use audit::{AuditEvent, AuditLog};
pub use policy_log::{PolicyDecision, PolicyLog, PolicyLogEntry};
pub use request_log::{RequestLog, RequestLogEntry, RequestStatus};
