//! Convenience re-exports for downstream crates.
//!
//! ```rust
//! use cyfr_core::prelude::*;
//! ```

pub use crate::context::{AuthMethod, Context};
pub use crate::dispatch::{ToolDispatcher, ToolError, ToolResult};
pub use crate::error::{ErrorCode, RefError, RefResult};
pub use crate::id::{ExecutionId, RequestId, component_id};
pub use crate::limits::{
    LimitError, LimitResult, RateLimit, parse_byte_size, parse_duration, parse_rate_limit,
};
pub use crate::reference::{ComponentRef, ComponentType};
