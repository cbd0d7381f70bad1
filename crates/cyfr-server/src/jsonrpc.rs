//! JSON-RPC 2.0 envelope types.

use cyfr_core::ErrorCode;
use serde::Serialize;
use serde_json::{Value, json};

/// One decoded element of a `POST /mcp` body.
#[derive(Debug, Clone)]
pub enum Decoded {
    /// A request: carries an id and expects a response entry.
    Request {
        /// The caller's id, echoed back.
        id: Value,
        /// Method name.
        method: String,
        /// Parameters (object or absent).
        params: Value,
    },
    /// A notification: no id, no response entry.
    Notification {
        /// Method name.
        method: String,
        /// Parameters (object or absent).
        params: Value,
    },
    /// Not a valid JSON-RPC 2.0 envelope.
    Invalid,
}

impl Decoded {
    /// Decode one element.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::Invalid;
        };
        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Self::Invalid;
        }
        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            return Self::Invalid;
        };
        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("id") {
            Some(id) if !id.is_null() => Self::Request {
                id: id.clone(),
                method: method.to_string(),
                params,
            },
            _ => Self::Notification {
                method: method.to_string(),
                params,
            },
        }
    }

    /// The method, when the envelope decoded.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request { method, .. } | Self::Notification { method, .. } => Some(method),
            Self::Invalid => None,
        }
    }
}

/// A response entry.
#[derive(Debug, Clone, Serialize)]
pub struct RpcResponse(Value);

impl RpcResponse {
    /// A success entry.
    #[must_use]
    pub fn result(id: &Value, result: Value) -> Self {
        Self(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    /// An error entry from the closed code table.
    #[must_use]
    pub fn error(id: &Value, code: ErrorCode, message: &str) -> Self {
        Self(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code.code(), "message": message, "data": {"name": code.name()}},
        }))
    }

    /// The wire value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.0
    }

    /// Borrow the wire value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request() {
        let decoded = Decoded::from_value(&json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}
        }));
        assert!(matches!(
            decoded,
            Decoded::Request { ref method, .. } if method == "initialize"
        ));
    }

    #[test]
    fn test_decode_notification() {
        let decoded = Decoded::from_value(&json!({
            "jsonrpc": "2.0", "method": "notifications/initialized"
        }));
        assert!(matches!(decoded, Decoded::Notification { .. }));
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(
            Decoded::from_value(&json!({"method": "x"})),
            Decoded::Invalid
        ));
        assert!(matches!(Decoded::from_value(&json!([1, 2])), Decoded::Invalid));
        assert!(matches!(
            Decoded::from_value(&json!({"jsonrpc": "2.0", "id": 1})),
            Decoded::Invalid
        ));
    }

    #[test]
    fn test_error_entry_shape() {
        let entry = RpcResponse::error(&json!(7), ErrorCode::SessionRequired, "no session");
        let value = entry.into_value();
        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["code"], -33301);
        assert_eq!(value["error"]["data"]["name"], "session_required");
    }
}
