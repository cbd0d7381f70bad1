//! Component references.
//!
//! The canonical grammar is `type:namespace.name:version` where `type` is
//! one of `catalyst`, `reagent`, `formula` (or the shorthands `c`, `r`,
//! `f`), `namespace` contains no dots, and `version` is three dotted
//! numeric segments or the literal `latest`.
//!
//! [`ComponentRef::parse`] additionally accepts the legacy forms that
//! predate typed references (`namespace.name:version`, `name:version`,
//! bare `name`, `publisher:name:version`), because stored rows written
//! before the normalization migration still surface them.
//! [`ComponentRef::normalize`] refuses anything without an explicit type.

use serde::{Deserialize, Serialize};

use crate::error::{RefError, RefResult};

/// Classification of a component by its allowed host-import set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    /// I/O-capable: may be granted HTTP egress.
    Catalyst,
    /// Pure computation: no egress, no tool calls.
    Reagent,
    /// Composition: may re-enter the tool router.
    Formula,
}

impl ComponentType {
    /// Parse a type name or single-letter shorthand.
    pub fn parse(s: &str) -> RefResult<Self> {
        match s {
            "catalyst" | "c" => Ok(Self::Catalyst),
            "reagent" | "r" => Ok(Self::Reagent),
            "formula" | "f" => Ok(Self::Formula),
            other => Err(RefError::UnknownType(other.to_string())),
        }
    }

    /// Whether `s` names a type (full or shorthand).
    #[must_use]
    pub fn is_type_token(s: &str) -> bool {
        matches!(s, "catalyst" | "reagent" | "formula" | "c" | "r" | "f")
    }

    /// The full lowercase type name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Catalyst => "catalyst",
            Self::Reagent => "reagent",
            Self::Formula => "formula",
        }
    }

    /// Plural directory segment used in the component storage layout.
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Catalyst => "catalysts",
            Self::Reagent => "reagents",
            Self::Formula => "formulas",
        }
    }

    /// Inverse of [`ComponentType::plural`].
    pub fn from_plural(s: &str) -> RefResult<Self> {
        match s {
            "catalysts" => Ok(Self::Catalyst),
            "reagents" => Ok(Self::Reagent),
            "formulas" => Ok(Self::Formula),
            other => Err(RefError::UnknownType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ComponentType {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A parsed component reference.
///
/// Equality is by all four fields after shorthand expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Component type, absent only on legacy references.
    pub component_type: Option<ComponentType>,
    /// Publisher namespace (`local`, `agent`, or a registry identity).
    pub namespace: String,
    /// Component name.
    pub name: String,
    /// Three dotted numeric segments, or `latest`.
    pub version: String,
}

/// Whether `version` is three dotted numeric segments or `latest`.
fn is_valid_version(version: &str) -> bool {
    if version == "latest" {
        return true;
    }
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

impl ComponentRef {
    /// Build a fully typed reference.
    #[must_use]
    pub fn new(
        component_type: ComponentType,
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            component_type: Some(component_type),
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    /// Parse a reference, accepting legacy untyped forms.
    ///
    /// # Errors
    ///
    /// Returns a descriptive [`RefError`] when the grammar cannot be
    /// matched (empty input, bad version segment, dotted namespace).
    pub fn parse(input: &str) -> RefResult<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(RefError::Empty);
        }
        Self::parse_inner(trimmed, None, input)
    }

    fn parse_inner(
        s: &str,
        component_type: Option<ComponentType>,
        original: &str,
    ) -> RefResult<Self> {
        // Typed prefix: strip it and recurse with the remainder.
        if component_type.is_none()
            && let Some((head, rest)) = s.split_once(':')
            && !head.contains('.')
            && ComponentType::is_type_token(head)
        {
            let ty = ComponentType::parse(head)?;
            return Self::parse_inner(rest, Some(ty), original);
        }

        let colon_parts: Vec<&str> = s.split(':').collect();

        // Legacy `publisher:name:version` (no dot in the publisher).
        if colon_parts.len() == 3 && !colon_parts[0].contains('.') {
            return Self::assemble(
                component_type,
                colon_parts[0],
                colon_parts[1],
                colon_parts[2],
                original,
            );
        }

        // Dotted namespace before the first colon: `namespace.name[:version]`.
        let before_colon = colon_parts[0];
        if let Some((namespace, rest)) = before_colon.split_once('.') {
            let (name, version) = match colon_parts.len() {
                1 => (rest, "latest"),
                2 => (rest, colon_parts[1]),
                _ => return Err(RefError::Unparseable(original.to_string())),
            };
            return Self::assemble(component_type, namespace, name, version, original);
        }

        match colon_parts.len() {
            // Legacy `name:version`, namespace defaults to `local`.
            2 => Self::assemble(component_type, "local", colon_parts[0], colon_parts[1], original),
            // Bare `name`, version defaults to `latest`.
            1 => Self::assemble(component_type, "local", colon_parts[0], "latest", original),
            _ => Err(RefError::Unparseable(original.to_string())),
        }
    }

    fn assemble(
        component_type: Option<ComponentType>,
        namespace: &str,
        name: &str,
        version: &str,
        original: &str,
    ) -> RefResult<Self> {
        if namespace.is_empty() || namespace.contains('.') {
            return Err(RefError::InvalidNamespace {
                namespace: namespace.to_string(),
                input: original.to_string(),
            });
        }
        if name.is_empty() {
            return Err(RefError::MissingName(original.to_string()));
        }
        if !is_valid_version(version) {
            return Err(RefError::InvalidVersion {
                version: version.to_string(),
                input: original.to_string(),
            });
        }
        Ok(Self {
            component_type,
            namespace: namespace.to_string(),
            name: name.to_string(),
            version: version.to_string(),
        })
    }

    /// Parse and require an explicit component type.
    ///
    /// # Errors
    ///
    /// Returns [`RefError::MissingType`] for otherwise valid legacy
    /// references, plus everything [`ComponentRef::parse`] can return.
    pub fn normalize(input: &str) -> RefResult<Self> {
        let parsed = Self::parse(input)?;
        if parsed.component_type.is_none() {
            return Err(RefError::MissingType(input.to_string()));
        }
        Ok(parsed)
    }

    /// The component type, erroring on legacy untyped references.
    pub fn require_type(&self) -> RefResult<ComponentType> {
        self.component_type
            .ok_or_else(|| RefError::MissingType(self.to_string()))
    }

    /// The reference without its type prefix: `namespace.name:version`.
    #[must_use]
    pub fn untyped(&self) -> String {
        format!("{}.{}:{}", self.namespace, self.name, self.version)
    }

    /// A copy of this reference with the version replaced.
    #[must_use]
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }
}

impl std::fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.component_type {
            Some(ty) => write!(f, "{ty}:{}.{}:{}", self.namespace, self.name, self.version),
            None => write!(f, "{}.{}:{}", self.namespace, self.name, self.version),
        }
    }
}

impl std::str::FromStr for ComponentRef {
    type Err = RefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form() {
        let r = ComponentRef::parse("catalyst:acme.fetch:1.2.3").unwrap();
        assert_eq!(r.component_type, Some(ComponentType::Catalyst));
        assert_eq!(r.namespace, "acme");
        assert_eq!(r.name, "fetch");
        assert_eq!(r.version, "1.2.3");
        assert_eq!(r.to_string(), "catalyst:acme.fetch:1.2.3");
    }

    #[test]
    fn test_shorthand_expansion() {
        for (token, ty) in [
            ("c", ComponentType::Catalyst),
            ("r", ComponentType::Reagent),
            ("f", ComponentType::Formula),
            ("catalyst", ComponentType::Catalyst),
            ("reagent", ComponentType::Reagent),
            ("formula", ComponentType::Formula),
        ] {
            let r = ComponentRef::parse(&format!("{token}:local.math:1.0.0")).unwrap();
            assert_eq!(r.component_type, Some(ty));
        }
    }

    #[test]
    fn test_legacy_name_version() {
        let r = ComponentRef::parse("math:1.0.0").unwrap();
        assert_eq!(r.component_type, None);
        assert_eq!(r.namespace, "local");
        assert_eq!(r.name, "math");
        assert_eq!(r.version, "1.0.0");
    }

    #[test]
    fn test_legacy_bare_name() {
        let r = ComponentRef::parse("math").unwrap();
        assert_eq!(r.namespace, "local");
        assert_eq!(r.version, "latest");
    }

    #[test]
    fn test_legacy_publisher_triplet() {
        let r = ComponentRef::parse("local:math:1.0.0").unwrap();
        assert_eq!(r.component_type, None);
        assert_eq!(r.namespace, "local");
        assert_eq!(r.name, "math");
    }

    #[test]
    fn test_untyped_namespaced() {
        let r = ComponentRef::parse("acme.fetch:2.0.0").unwrap();
        assert_eq!(r.component_type, None);
        assert_eq!(r.namespace, "acme");
        assert_eq!(r.name, "fetch");
    }

    #[test]
    fn test_untyped_namespaced_defaults_latest() {
        let r = ComponentRef::parse("acme.fetch").unwrap();
        assert_eq!(r.version, "latest");
    }

    #[test]
    fn test_normalize_requires_type() {
        assert!(matches!(
            ComponentRef::normalize("math:1.0.0"),
            Err(RefError::MissingType(_))
        ));
        assert!(ComponentRef::normalize("r:local.math:1.0.0").is_ok());
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = ComponentRef::normalize("c:acme.fetch:1.0.0").unwrap();
        let twice = ComponentRef::normalize(&once.to_string()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(ComponentRef::parse("  "), Err(RefError::Empty));
    }

    #[test]
    fn test_rejects_bad_version() {
        assert!(matches!(
            ComponentRef::parse("catalyst:local.math:1.0"),
            Err(RefError::InvalidVersion { .. })
        ));
        assert!(matches!(
            ComponentRef::parse("local.math:v1.0.0"),
            Err(RefError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_equality_all_fields() {
        let a = ComponentRef::parse("c:local.math:1.0.0").unwrap();
        let b = ComponentRef::parse("catalyst:local.math:1.0.0").unwrap();
        let c = ComponentRef::parse("r:local.math:1.0.0").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_plural_roundtrip() {
        for ty in [
            ComponentType::Catalyst,
            ComponentType::Reagent,
            ComponentType::Formula,
        ] {
            assert_eq!(ComponentType::from_plural(ty.plural()).unwrap(), ty);
        }
    }
}
