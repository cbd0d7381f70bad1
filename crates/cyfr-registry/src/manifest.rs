//! The component manifest file.
//!
//! A filesystem component directory may carry a `component.toml` next to
//! its `.wasm` artifact; fields present there win over what the directory
//! layout implies.

use serde::Deserialize;

use crate::error::{RegistryError, RegistryResult};

/// Manifest file name inside a component directory.
pub const MANIFEST_FILE: &str = "component.toml";

/// Parsed `component.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComponentManifest {
    /// Component name.
    pub name: Option<String>,
    /// Version.
    pub version: Option<String>,
    /// Type name (`catalyst` / `reagent` / `formula`).
    #[serde(rename = "type")]
    pub component_type: Option<String>,
    /// Free-text description.
    pub description: Option<String>,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Category label.
    pub category: Option<String>,
    /// License identifier.
    pub license: Option<String>,
}

impl ComponentManifest {
    /// Parse manifest TOML.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidManifest`] on malformed TOML.
    pub fn parse(raw: &str) -> RegistryResult<Self> {
        toml::from_str(raw).map_err(|e| RegistryError::InvalidManifest(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let manifest = ComponentManifest::parse(
            r#"
            name = "fetch"
            version = "1.2.0"
            type = "catalyst"
            description = "HTTP fetcher"
            tags = ["http", "net"]
            category = "network"
            license = "MIT"
            "#,
        )
        .unwrap();
        assert_eq!(manifest.name.as_deref(), Some("fetch"));
        assert_eq!(manifest.component_type.as_deref(), Some("catalyst"));
        assert_eq!(manifest.tags, vec!["http", "net"]);
    }

    #[test]
    fn test_parse_empty_manifest() {
        let manifest = ComponentManifest::parse("").unwrap();
        assert!(manifest.name.is_none());
        assert!(manifest.tags.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            ComponentManifest::parse("name = ["),
            Err(RegistryError::InvalidManifest(_))
        ));
    }
}
