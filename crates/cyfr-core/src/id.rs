//! Typed identifiers with stable prefixes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::reference::ComponentType;

/// Per-request correlation id, `req_<uuid7>`.
///
/// UUIDv7 keeps ids time-sortable so log rows for one process read in
/// arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh request id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("req_{}", Uuid::now_v7().simple()))
    }

    /// Wrap an id received on the wire.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution record id, `exec_<uuid7>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Generate a fresh execution id.
    #[must_use]
    pub fn new() -> Self {
        Self(format!("exec_{}", Uuid::now_v7().simple()))
    }

    /// Wrap a stored id.
    #[must_use]
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable component row id: `comp_` + first 16 hex characters of the
/// SHA-256 of `publisher:name:version:type`.
#[must_use]
pub fn component_id(
    publisher: &str,
    name: &str,
    version: &str,
    component_type: ComponentType,
) -> String {
    let material = format!("{publisher}:{name}:{version}:{}", component_type.as_str());
    let digest = Sha256::digest(material.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("comp_{}", &hex[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_prefix() {
        let id = RequestId::new();
        assert!(id.as_str().starts_with("req_"));
        assert!(id.as_str().len() > 10);
    }

    #[test]
    fn test_execution_id_prefix() {
        let id = ExecutionId::new();
        assert!(id.as_str().starts_with("exec_"));
    }

    #[test]
    fn test_component_id_stable() {
        let a = component_id("local", "math", "1.0.0", ComponentType::Reagent);
        let b = component_id("local", "math", "1.0.0", ComponentType::Reagent);
        assert_eq!(a, b);
        assert!(a.starts_with("comp_"));
        assert_eq!(a.len(), 5 + 16);
    }

    #[test]
    fn test_component_id_varies_by_type() {
        let a = component_id("local", "math", "1.0.0", ComponentType::Reagent);
        let b = component_id("local", "math", "1.0.0", ComponentType::Formula);
        assert_ne!(a, b);
    }
}
