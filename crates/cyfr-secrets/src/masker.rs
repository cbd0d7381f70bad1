//! Output redaction.
//!
//! Every occurrence of a preloaded secret plaintext is replaced with
//! [`REDACTED`] before an execution output is persisted or returned, and
//! so are the encodings a guest is most likely to leak it under: base64,
//! URL-safe base64, and lower/upper hexadecimal.
//!
//! Secrets shorter than four characters are left alone; masking them
//! would shred common literals (`"key"`, `"1"`) across unrelated output.

use base64::Engine as _;
use serde_json::Value;

/// The replacement token.
pub const REDACTED: &str = "[REDACTED]";

/// Minimum plaintext length the masker acts on.
const MIN_SECRET_LEN: usize = 4;

/// Every needle the masker scrubs for one plaintext.
fn variants(secret: &str) -> Vec<String> {
    let bytes = secret.as_bytes();
    let mut out = vec![
        secret.to_string(),
        base64::engine::general_purpose::STANDARD.encode(bytes),
        base64::engine::general_purpose::STANDARD_NO_PAD.encode(bytes),
        base64::engine::general_purpose::URL_SAFE.encode(bytes),
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes),
        hex::encode(bytes),
        hex::encode_upper(bytes),
    ];
    out.dedup();
    out
}

/// Scrub all variants of each secret from a string.
#[must_use]
pub fn mask_text(text: &str, secrets: &[String]) -> String {
    let mut out = text.to_string();
    for secret in secrets {
        if secret.len() < MIN_SECRET_LEN {
            continue;
        }
        for needle in variants(secret) {
            if out.contains(&needle) {
                out = out.replace(&needle, REDACTED);
            }
        }
    }
    out
}

/// Scrub all variants of each secret from a JSON value, recursing through
/// objects and arrays. Object keys are scrubbed too.
#[must_use]
pub fn mask_value(value: &Value, secrets: &[String]) -> Value {
    match value {
        Value::String(s) => Value::String(mask_text(s, secrets)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| mask_value(item, secrets)).collect())
        },
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (mask_text(key, secrets), mask_value(item, secrets)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secrets(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_masks_plaintext_and_all_encodings() {
        let secret = "sk-abcdefghijkl";
        let secrets = secrets(&[secret]);

        let plain = format!("key is {secret}");
        assert_eq!(mask_text(&plain, &secrets), "key is [REDACTED]");

        let b64 = base64::engine::general_purpose::STANDARD.encode(secret);
        assert!(!mask_text(&b64, &secrets).contains(&b64));

        let url = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(secret);
        assert!(!mask_text(&url, &secrets).contains(&url));

        let lower = hex::encode(secret);
        assert!(!mask_text(&lower, &secrets).contains(&lower));

        let upper = hex::encode_upper(secret);
        assert!(!mask_text(&upper, &secrets).contains(&upper));
    }

    #[test]
    fn test_scenario_double_leak() {
        // Guest leaks the secret twice: raw and base64.
        let out = json!({
            "out": "key is sk-abcdefghijkl and base64 c2stYWJjZGVmZ2hpamts"
        });
        let masked = mask_value(&out, &secrets(&["sk-abcdefghijkl"]));
        let text = masked["out"].as_str().unwrap();
        assert_eq!(text.matches(REDACTED).count(), 2);
        assert!(!text.contains("sk-abcdefghijkl"));
        assert!(!text.contains("c2stYWJjZGVmZ2hpamts"));
    }

    #[test]
    fn test_short_secrets_left_alone() {
        let secrets = secrets(&["key"]);
        assert_eq!(mask_text("the key is key", &secrets), "the key is key");
    }

    #[test]
    fn test_recurses_into_maps_and_lists() {
        let value = json!({
            "list": ["tok-12345", {"nested": "prefix tok-12345 suffix"}],
            "tok-12345": "value under a secret key",
        });
        let masked = mask_value(&value, &secrets(&["tok-12345"]));
        assert_eq!(masked["list"][0], REDACTED);
        assert_eq!(masked["list"][1]["nested"], format!("prefix {REDACTED} suffix"));
        assert!(masked.get("tok-12345").is_none());
        assert!(masked.get(REDACTED).is_some());
    }

    #[test]
    fn test_non_string_values_untouched() {
        let value = json!({"n": 42, "b": true, "z": null});
        assert_eq!(mask_value(&value, &secrets(&["whatever"])), value);
    }
}
