//! Cyfr Core - Foundation types for the Cyfr component runtime.
//!
//! This crate provides:
//! - Component references and their legacy-tolerant parser
//! - Component type classification (catalyst, reagent, formula)
//! - Typed identifiers with stable prefixes
//! - The per-request [`Context`] threaded through every subsystem
//! - Resource-limit parsing (durations, byte sizes, rate limits)
//! - The closed JSON-RPC error-code table
//! - The [`ToolDispatcher`] seam used for cross-subsystem calls

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod context;
pub mod dispatch;
pub mod error;
pub mod id;
pub mod limits;
pub mod prelude;
pub mod reference;

pub use context::{AuthMethod, Context};
pub use dispatch::{ToolDispatcher, ToolError, ToolResult};
pub use error::{ErrorCode, RefError, RefResult};
pub use id::{ExecutionId, RequestId, component_id};
pub use limits::{RateLimit, parse_byte_size, parse_duration, parse_rate_limit};
pub use reference::{ComponentRef, ComponentType};
