//! The host policy type, its defaults, and its predicates.

use std::time::Duration;

use cyfr_core::limits::{parse_byte_size, parse_duration, parse_rate_limit};
use cyfr_core::{ComponentType, RateLimit};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{PolicyError, PolicyResult};

/// Default instruction budget for one invocation.
pub const DEFAULT_FUEL_LIMIT: u64 = 100_000_000;

const DEFAULT_MAX_MEMORY: u64 = 64 * 1024 * 1024;
const DEFAULT_MAX_REQUEST: u64 = 10 * 1024 * 1024;
const DEFAULT_MAX_RESPONSE: u64 = 10 * 1024 * 1024;

/// Per-reference execution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPolicy {
    /// Exact domains or `*.suffix` wildcards. Empty denies all egress.
    pub allowed_domains: Vec<String>,
    /// Allowed HTTP verbs for egress.
    pub allowed_methods: Vec<String>,
    /// Request budget over a window, if any.
    pub rate_limit: Option<RateLimit>,
    /// Wall-clock budget for one invocation.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Linear-memory ceiling in bytes.
    pub max_memory_bytes: u64,
    /// Input byte cap.
    pub max_request_size: u64,
    /// Output byte cap (also applied to egress response bodies).
    pub max_response_size: u64,
    /// MCP tool patterns (`exact` or `prefix.*`). Empty denies all.
    pub allowed_tools: Vec<String>,
    /// Storage path prefixes. Empty allows all.
    pub allowed_storage_paths: Vec<String>,
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        u64::try_from(d.as_millis()).unwrap_or(u64::MAX).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl HostPolicy {
    /// The type-aware default: deny-all egress and tools, allow-all
    /// storage paths, timeout 3 m (catalyst) / 1 m (reagent) / 5 m
    /// (formula).
    #[must_use]
    pub fn default_for(component_type: ComponentType) -> Self {
        let timeout = match component_type {
            ComponentType::Catalyst => Duration::from_secs(180),
            ComponentType::Reagent => Duration::from_secs(60),
            ComponentType::Formula => Duration::from_secs(300),
        };
        Self {
            allowed_domains: Vec::new(),
            allowed_methods: vec!["GET".to_string(), "POST".to_string()],
            rate_limit: None,
            timeout,
            max_memory_bytes: DEFAULT_MAX_MEMORY,
            max_request_size: DEFAULT_MAX_REQUEST,
            max_response_size: DEFAULT_MAX_RESPONSE,
            allowed_tools: Vec::new(),
            allowed_storage_paths: Vec::new(),
        }
    }

    /// Domain predicate: exact membership, or `*.suffix` matching
    /// `X.suffix` for some non-empty `X`. A bare `suffix` never matches
    /// its own wildcard.
    #[must_use]
    pub fn allows_domain(&self, domain: &str) -> bool {
        self.allowed_domains.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix("*.") {
                domain
                    .strip_suffix(suffix)
                    .and_then(|head| head.strip_suffix('.'))
                    .is_some_and(|head| !head.is_empty())
            } else {
                pattern == domain
            }
        })
    }

    /// HTTP method predicate (case-insensitive membership).
    #[must_use]
    pub fn allows_method(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
    }

    /// Tool predicate: exact name or `prefix.*` matching any name that
    /// begins with `prefix.`. The empty list denies all.
    #[must_use]
    pub fn allows_tool(&self, tool: &str) -> bool {
        self.allowed_tools.iter().any(|pattern| {
            if let Some(prefix) = pattern.strip_suffix(".*") {
                tool.strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.'))
            } else {
                pattern == tool
            }
        })
    }

    /// Storage-path predicate: the empty list allows all; otherwise the
    /// candidate must begin with one of the listed prefixes.
    #[must_use]
    pub fn allows_storage_path(&self, path: &str) -> bool {
        if self.allowed_storage_paths.is_empty() {
            return true;
        }
        self.allowed_storage_paths
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Render the policy as the string-valued map form used on the wire
    /// and in policy snapshots.
    #[must_use]
    pub fn to_map(&self) -> Value {
        let mut map = Map::new();
        map.insert("allowed_domains".into(), json!(self.allowed_domains));
        map.insert("allowed_methods".into(), json!(self.allowed_methods));
        if let Some(rl) = self.rate_limit {
            map.insert(
                "rate_limit".into(),
                json!(format!("{}/{}s", rl.requests, rl.window.as_secs())),
            );
        }
        map.insert("timeout".into(), json!(format_duration(self.timeout)));
        map.insert(
            "max_memory_bytes".into(),
            json!(format_byte_size(self.max_memory_bytes)),
        );
        map.insert(
            "max_request_size".into(),
            json!(format_byte_size(self.max_request_size)),
        );
        map.insert(
            "max_response_size".into(),
            json!(format_byte_size(self.max_response_size)),
        );
        map.insert("allowed_tools".into(), json!(self.allowed_tools));
        map.insert(
            "allowed_storage_paths".into(),
            json!(self.allowed_storage_paths),
        );
        Value::Object(map)
    }

    /// Parse the map form, filling absent fields from the type-aware
    /// default. Present-but-invalid fields are errors, never defaults.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidField`] on wrong JSON shapes and
    /// [`PolicyError::Limit`] on bad limit strings.
    pub fn from_map(map: &Value, component_type: ComponentType) -> PolicyResult<Self> {
        let mut policy = Self::default_for(component_type);
        let Some(obj) = map.as_object() else {
            return Err(PolicyError::InvalidField {
                field: "policy",
                reason: "expected a JSON object".to_string(),
            });
        };

        if let Some(v) = obj.get("allowed_domains") {
            policy.allowed_domains = string_list(v, "allowed_domains")?;
        }
        if let Some(v) = obj.get("allowed_methods") {
            policy.allowed_methods = string_list(v, "allowed_methods")?;
        }
        if let Some(v) = obj.get("rate_limit") {
            let s = string_field(v, "rate_limit")?;
            policy.rate_limit = Some(parse_rate_limit(&s)?);
        }
        if let Some(v) = obj.get("timeout") {
            let s = string_field(v, "timeout")?;
            policy.timeout = parse_duration(&s)?;
        }
        if let Some(v) = obj.get("max_memory_bytes") {
            policy.max_memory_bytes = byte_field(v, "max_memory_bytes")?;
        }
        if let Some(v) = obj.get("max_request_size") {
            policy.max_request_size = byte_field(v, "max_request_size")?;
        }
        if let Some(v) = obj.get("max_response_size") {
            policy.max_response_size = byte_field(v, "max_response_size")?;
        }
        if let Some(v) = obj.get("allowed_tools") {
            policy.allowed_tools = string_list(v, "allowed_tools")?;
        }
        if let Some(v) = obj.get("allowed_storage_paths") {
            policy.allowed_storage_paths = string_list(v, "allowed_storage_paths")?;
        }
        Ok(policy)
    }
}

fn string_field(v: &Value, field: &'static str) -> PolicyResult<String> {
    v.as_str()
        .map(ToString::to_string)
        .ok_or_else(|| PolicyError::InvalidField {
            field,
            reason: "expected a string".to_string(),
        })
}

fn byte_field(v: &Value, field: &'static str) -> PolicyResult<u64> {
    match v {
        Value::Number(n) => n.as_u64().ok_or_else(|| PolicyError::InvalidField {
            field,
            reason: "expected a non-negative integer".to_string(),
        }),
        Value::String(s) => Ok(parse_byte_size(s)?),
        _ => Err(PolicyError::InvalidField {
            field,
            reason: "expected a byte size".to_string(),
        }),
    }
}

fn string_list(v: &Value, field: &'static str) -> PolicyResult<Vec<String>> {
    let Some(items) = v.as_array() else {
        return Err(PolicyError::InvalidField {
            field,
            reason: "expected a list of strings".to_string(),
        });
    };
    items
        .iter()
        .map(|item| string_field(item, field))
        .collect()
}

/// Inverse of `parse_duration` for the map form.
fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis % 1000 != 0 {
        return format!("{millis}ms");
    }
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

/// Inverse of `parse_byte_size` for the map form.
fn format_byte_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;
    if bytes != 0 && bytes % GB == 0 {
        format!("{}GB", bytes / GB)
    } else if bytes != 0 && bytes % MB == 0 {
        format!("{}MB", bytes / MB)
    } else if bytes != 0 && bytes % KB == 0 {
        format!("{}KB", bytes / KB)
    } else {
        bytes.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_aware_defaults() {
        assert_eq!(
            HostPolicy::default_for(ComponentType::Catalyst).timeout,
            Duration::from_secs(180)
        );
        assert_eq!(
            HostPolicy::default_for(ComponentType::Reagent).timeout,
            Duration::from_secs(60)
        );
        assert_eq!(
            HostPolicy::default_for(ComponentType::Formula).timeout,
            Duration::from_secs(300)
        );
        let p = HostPolicy::default_for(ComponentType::Catalyst);
        assert!(p.allowed_domains.is_empty());
        assert!(p.allowed_tools.is_empty());
    }

    #[test]
    fn test_domain_wildcard_semantics() {
        let mut p = HostPolicy::default_for(ComponentType::Catalyst);
        p.allowed_domains = vec!["*.stripe.com".to_string(), "api.github.com".to_string()];

        assert!(p.allows_domain("api.stripe.com"));
        assert!(p.allows_domain("deep.api.stripe.com"));
        // The bare suffix does not match its own wildcard.
        assert!(!p.allows_domain("stripe.com"));
        assert!(!p.allows_domain("notstripe.com"));
        assert!(!p.allows_domain("stripe.com.evil.net"));

        assert!(p.allows_domain("api.github.com"));
        assert!(!p.allows_domain("github.com"));
    }

    #[test]
    fn test_empty_domains_deny_all() {
        let p = HostPolicy::default_for(ComponentType::Catalyst);
        assert!(!p.allows_domain("example.com"));
    }

    #[test]
    fn test_tool_patterns() {
        let mut p = HostPolicy::default_for(ComponentType::Formula);
        assert!(!p.allows_tool("component.search"));

        p.allowed_tools = vec!["component.search".to_string(), "storage.*".to_string()];
        assert!(p.allows_tool("component.search"));
        assert!(!p.allows_tool("component.publish"));
        assert!(p.allows_tool("storage.read"));
        assert!(p.allows_tool("storage.write"));
        assert!(!p.allows_tool("storage"));
        assert!(!p.allows_tool("storageextra.read"));
    }

    #[test]
    fn test_storage_path_semantics() {
        let mut p = HostPolicy::default_for(ComponentType::Reagent);
        // Empty list allows everything.
        assert!(p.allows_storage_path("scratch/anything"));

        p.allowed_storage_paths = vec!["scratch/".to_string()];
        assert!(p.allows_storage_path("scratch/file.txt"));
        assert!(!p.allows_storage_path("private/file.txt"));
    }

    #[test]
    fn test_method_membership() {
        let p = HostPolicy::default_for(ComponentType::Catalyst);
        assert!(p.allows_method("GET"));
        assert!(p.allows_method("post"));
        assert!(!p.allows_method("DELETE"));
    }

    #[test]
    fn test_map_roundtrip() {
        let mut p = HostPolicy::default_for(ComponentType::Catalyst);
        p.allowed_domains = vec!["*.stripe.com".to_string()];
        p.rate_limit = Some(RateLimit {
            requests: 100,
            window: Duration::from_secs(60),
        });
        p.timeout = Duration::from_secs(90);
        p.max_memory_bytes = 128 * 1024 * 1024;
        p.allowed_tools = vec!["component.*".to_string()];
        p.allowed_storage_paths = vec!["scratch/".to_string()];

        let map = p.to_map();
        let back = HostPolicy::from_map(&map, ComponentType::Catalyst).unwrap();
        assert_eq!(p, back);
    }

    #[test]
    fn test_from_map_fills_defaults() {
        let map = json!({"allowed_domains": ["api.example.com"]});
        let p = HostPolicy::from_map(&map, ComponentType::Reagent).unwrap();
        assert_eq!(p.timeout, Duration::from_secs(60));
        assert_eq!(p.allowed_domains, vec!["api.example.com"]);
    }

    #[test]
    fn test_from_map_rejects_bad_limits() {
        let map = json!({"timeout": "soon"});
        assert!(matches!(
            HostPolicy::from_map(&map, ComponentType::Reagent),
            Err(PolicyError::Limit(_))
        ));

        let map = json!({"max_memory_bytes": "huge"});
        assert!(HostPolicy::from_map(&map, ComponentType::Reagent).is_err());

        let map = json!({"rate_limit": "often"});
        assert!(HostPolicy::from_map(&map, ComponentType::Reagent).is_err());
    }

    #[test]
    fn test_format_duration_inverse() {
        for d in [
            Duration::from_millis(250),
            Duration::from_secs(90),
            Duration::from_secs(60),
            Duration::from_secs(3600),
            Duration::from_secs(180),
        ] {
            assert_eq!(parse_duration(&format_duration(d)).unwrap(), d);
        }
    }

    #[test]
    fn test_format_byte_size_inverse() {
        for b in [512, 64 * 1024, 10 * 1024 * 1024, 1024 * 1024 * 1024, 1000] {
            assert_eq!(parse_byte_size(&format_byte_size(b)).unwrap(), b);
        }
    }
}
