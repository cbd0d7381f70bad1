//! Execution references.
//!
//! The `execution.run` argument names its artifact one of four ways; the
//! kinds are a closed sum and resolution pattern-matches on it.

use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Where the artifact for one invocation comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    /// A path under the canonical components layout on the local disk.
    Local(String),
    /// A typed registry reference (`r:local.math:1.0.0`).
    Registry(String),
    /// A path in the caller's own storage.
    Arca(String),
    /// An OCI reference, resolved by the optional pull side-car.
    Oci(String),
}

impl Reference {
    /// Parse the wire shape: `{"registry": "..."}`, `{"local": "..."}`,
    /// `{"arca": "..."}`, `{"oci": "..."}`, or a bare string (treated as
    /// a registry reference).
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidReference`] for anything else.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        if let Some(s) = value.as_str() {
            return Ok(Self::Registry(s.to_string()));
        }
        let Some(obj) = value.as_object() else {
            return Err(EngineError::InvalidReference(value.to_string()));
        };
        let mut kinds = obj.iter().filter_map(|(k, v)| {
            let s = v.as_str()?;
            match k.as_str() {
                "local" => Some(Self::Local(s.to_string())),
                "registry" => Some(Self::Registry(s.to_string())),
                "arca" => Some(Self::Arca(s.to_string())),
                "oci" => Some(Self::Oci(s.to_string())),
                _ => None,
            }
        });
        let first = kinds
            .next()
            .ok_or_else(|| EngineError::InvalidReference(value.to_string()))?;
        if kinds.next().is_some() {
            return Err(EngineError::InvalidReference(
                "reference names more than one kind".to_string(),
            ));
        }
        Ok(first)
    }

    /// A stable display string for records and logs.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Local(p) => format!("local:{p}"),
            Self::Registry(r) => r.clone(),
            Self::Arca(p) => format!("arca:{p}"),
            Self::Oci(r) => format!("oci:{r}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_each_kind() {
        assert_eq!(
            Reference::from_value(&json!({"registry": "r:local.math:1.0.0"})).unwrap(),
            Reference::Registry("r:local.math:1.0.0".to_string())
        );
        assert_eq!(
            Reference::from_value(&json!({"local": "components/reagents/local/m/1.0.0"}))
                .unwrap(),
            Reference::Local("components/reagents/local/m/1.0.0".to_string())
        );
        assert_eq!(
            Reference::from_value(&json!({"arca": "modules/m.wasm"})).unwrap(),
            Reference::Arca("modules/m.wasm".to_string())
        );
        assert_eq!(
            Reference::from_value(&json!({"oci": "ghcr.io/acme/m:1.0.0"})).unwrap(),
            Reference::Oci("ghcr.io/acme/m:1.0.0".to_string())
        );
    }

    #[test]
    fn test_bare_string_is_registry() {
        assert_eq!(
            Reference::from_value(&json!("r:local.math:1.0.0")).unwrap(),
            Reference::Registry("r:local.math:1.0.0".to_string())
        );
    }

    #[test]
    fn test_rejects_ambiguous_and_unknown() {
        assert!(Reference::from_value(&json!({"registry": "a", "local": "b"})).is_err());
        assert!(Reference::from_value(&json!({"mystery": "a"})).is_err());
        assert!(Reference::from_value(&json!(42)).is_err());
    }
}
