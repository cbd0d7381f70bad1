//! Host imports exposed to the sandbox.
//!
//! Every import takes one JSON payload in guest memory and returns one
//! JSON payload. Policy denials are returned to the guest as an error
//! *value* (`{"error": {...}}`) and logged to the policy log; they never
//! trap the host. Only genuinely broken guest payloads (bad pointers,
//! oversized allocations) become engine errors.

use std::collections::HashMap;
use std::sync::Arc;

use cyfr_audit::{PolicyDecision, PolicyLog};
use cyfr_core::{ComponentType, Context, ExecutionId, ToolDispatcher};
use cyfr_policy::HostPolicy;
use cyfr_storage::StorageAdapter;
use extism::{CurrentPlugin, Error, PluginBuilder, UserData, Val};
use serde_json::{Value, json};
use tracing::debug;

/// Cap on any single guest payload crossing the boundary.
const MAX_GUEST_PAYLOAD_LEN: u64 = 10 * 1024 * 1024;

/// Mutable state shared with the host imports of one invocation.
pub struct HostState {
    /// Caller context (the sandbox runs as the calling user).
    pub ctx: Context,
    /// Execution this state belongs to.
    pub execution_id: ExecutionId,
    /// Display reference of the running component.
    pub reference: String,
    /// Its type; gates `cyfr_tools_call`.
    pub component_type: ComponentType,
    /// Policy snapshot enforced for this run.
    pub policy: HostPolicy,
    /// Preloaded granted secrets, name to plaintext.
    pub secrets: HashMap<String, String>,
    /// User-scoped storage access.
    pub adapter: StorageAdapter,
    /// Consultation log.
    pub policy_log: PolicyLog,
    /// Router re-entry for formulas.
    pub dispatcher: Option<Arc<dyn ToolDispatcher>>,
    /// Runtime handle for async work from the sandbox thread.
    pub runtime: tokio::runtime::Handle,
    /// Host-import trace accumulated during the run.
    pub trace: Vec<Value>,
}

impl HostState {
    fn log_policy(&self, decision: PolicyDecision, reason: Option<&str>) {
        self.policy_log.record(
            &self.ctx,
            &self.reference,
            Some(self.component_type.as_str()),
            Some(&self.execution_id),
            &self.policy.to_map(),
            decision,
            reason,
        );
    }
}

/// Register every host import on the plugin builder.
pub fn register_host_functions<'a>(
    mut builder: PluginBuilder<'a>,
    user_data: &'a UserData<HostState>,
) -> PluginBuilder<'a> {
    let imports: [(
        &str,
        fn(&mut CurrentPlugin, &[Val], &mut [Val], UserData<HostState>) -> Result<(), Error>,
    ); 7] = [
        ("cyfr_http_request", http_request_impl),
        ("cyfr_secrets_read", secrets_read_impl),
        ("cyfr_storage_read", storage_read_impl),
        ("cyfr_storage_write", storage_write_impl),
        ("cyfr_storage_list", storage_list_impl),
        ("cyfr_storage_delete", storage_delete_impl),
        ("cyfr_tools_call", tools_call_impl),
    ];
    for (name, implementation) in imports {
        builder = builder.with_function(
            name,
            [extism::PTR],
            [extism::PTR],
            user_data.clone(),
            implementation,
        );
    }
    builder
}

/// Extract a guest string with a length cap enforced before allocation.
fn get_safe_string(plugin: &mut CurrentPlugin, val: &Val) -> Result<String, Error> {
    let ptr = match val {
        Val::I64(v) => u64::from_ne_bytes(v.to_ne_bytes()),
        _ => return Err(Error::msg("expected memory pointer value")),
    };
    let len = plugin.memory_length(ptr)?;
    if len > MAX_GUEST_PAYLOAD_LEN {
        return Err(Error::msg(format!(
            "guest payload of {len} bytes exceeds the {MAX_GUEST_PAYLOAD_LEN} byte cap"
        )));
    }
    plugin.memory_get_val(val)
}

/// Write a JSON value back into guest memory.
fn reply(plugin: &mut CurrentPlugin, outputs: &mut [Val], value: &Value) -> Result<(), Error> {
    let body = value.to_string();
    let mem = plugin.memory_new(&body)?;
    outputs[0] = plugin.memory_to_val(mem);
    Ok(())
}

fn error_value(code: &str, message: impl Into<String>) -> Value {
    json!({"error": {"code": code, "message": message.into()}})
}

fn parse_request(raw: &str) -> Result<Value, Value> {
    serde_json::from_str(raw)
        .map_err(|e| error_value("invalid_request", format!("payload is not JSON: {e}")))
}

/// `cyfr_http_request({method, url, headers, body})`.
///
/// Checks `allowed_methods`, then extracts the host and checks
/// `allowed_domains`; performs the request under the response-size cap.
#[allow(clippy::needless_pass_by_value)]
fn http_request_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let raw = get_safe_string(plugin, &inputs[0])?;
    let request = match parse_request(&raw) {
        Ok(v) => v,
        Err(e) => return reply(plugin, outputs, &e),
    };
    let method = request["method"].as_str().unwrap_or("GET").to_uppercase();
    let url_raw = request["url"].as_str().unwrap_or_default().to_string();

    let ud = user_data.get()?;
    let mut state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;

    let url = match reqwest::Url::parse(&url_raw) {
        Ok(url) => url,
        Err(e) => {
            return reply(
                plugin,
                outputs,
                &error_value("invalid_request", format!("bad url {url_raw:?}: {e}")),
            );
        },
    };
    let host = url.host_str().unwrap_or_default().to_string();

    if !state.policy.allows_method(&method) {
        state.log_policy(PolicyDecision::Deny, Some("method_not_allowed"));
        state.trace.push(json!({
            "import": "http.request", "method": method, "host": host, "decision": "deny",
        }));
        return reply(
            plugin,
            outputs,
            &error_value(
                "policy_violation",
                format!("method {method} is not allowed by policy"),
            ),
        );
    }
    if !state.policy.allows_domain(&host) {
        state.log_policy(PolicyDecision::Deny, Some("domain_not_allowed"));
        state.trace.push(json!({
            "import": "http.request", "method": method, "host": host, "decision": "deny",
        }));
        return reply(
            plugin,
            outputs,
            &error_value(
                "policy_violation",
                format!("domain {host} is not allowed by policy"),
            ),
        );
    }
    state.log_policy(PolicyDecision::Allow, None);
    state.trace.push(json!({
        "import": "http.request", "method": method, "host": host, "decision": "allow",
    }));

    let max_response = state.policy.max_response_size;
    let runtime = state.runtime.clone();
    drop(state);
    drop(ud);

    let headers: HashMap<String, String> = request["headers"]
        .as_object()
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let body = request["body"].as_str().map(ToString::to_string);

    let outcome = runtime.block_on(async move {
        let client = reqwest::Client::new();
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| format!("unsupported method: {e}"))?;
        let mut builder = client.request(method, url);
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let response = builder.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let mut response_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(name.as_str().to_string(), value.to_string());
            }
        }
        // Stream the body so the size cap cuts off before allocation.
        let mut response = response;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| e.to_string())? {
            if (bytes.len() + chunk.len()) as u64 > max_response {
                return Err(format!("response exceeded {max_response} byte cap"));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes).into_owned();
        Ok::<Value, String>(json!({
            "status": status, "headers": response_headers, "body": body,
        }))
    });

    match outcome {
        Ok(response) => reply(plugin, outputs, &response),
        Err(message) => reply(plugin, outputs, &error_value("http_error", message)),
    }
}

/// `cyfr_secrets_read({name})`: only preloaded (granted) secrets resolve.
#[allow(clippy::needless_pass_by_value)]
fn secrets_read_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let raw = get_safe_string(plugin, &inputs[0])?;
    let request = match parse_request(&raw) {
        Ok(v) => v,
        Err(e) => return reply(plugin, outputs, &e),
    };
    let name = request["name"].as_str().unwrap_or_default().to_string();

    let ud = user_data.get()?;
    let mut state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;

    let response = match state.secrets.get(&name) {
        Some(value) => json!({"value": value}),
        None => error_value(
            "secret_not_granted",
            format!("no grant for secret {name:?} on this component"),
        ),
    };
    state.trace.push(json!({
        "import": "secrets.read", "name": name,
        "decision": if response.get("error").is_some() { "deny" } else { "allow" },
    }));
    drop(state);
    reply(plugin, outputs, &response)
}

fn split_guest_path(path: &str) -> Result<Vec<String>, Value> {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect();
    if segments.is_empty() {
        return Err(error_value("invalid_request", "empty storage path"));
    }
    if StorageAdapter::is_global_prefix(&segments[0]) {
        return Err(error_value(
            "policy_violation",
            format!("storage prefix {:?} is reserved", segments[0]),
        ));
    }
    Ok(segments)
}

enum StorageOp {
    Read,
    Write,
    List,
    Delete,
}

#[allow(clippy::needless_pass_by_value)]
fn storage_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
    op: &StorageOp,
) -> Result<(), Error> {
    let raw = get_safe_string(plugin, &inputs[0])?;
    let request = match parse_request(&raw) {
        Ok(v) => v,
        Err(e) => return reply(plugin, outputs, &e),
    };
    let path = request["path"].as_str().unwrap_or_default().to_string();

    let ud = user_data.get()?;
    let mut state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;

    let op_name = match op {
        StorageOp::Read => "storage.read",
        StorageOp::Write => "storage.write",
        StorageOp::List => "storage.list",
        StorageOp::Delete => "storage.delete",
    };

    if !state.policy.allows_storage_path(&path) {
        state.log_policy(PolicyDecision::Deny, Some("storage_path_not_allowed"));
        state.trace.push(json!({
            "import": op_name, "path": path, "decision": "deny",
        }));
        return reply(
            plugin,
            outputs,
            &error_value(
                "policy_violation",
                format!("storage path {path:?} is not allowed by policy"),
            ),
        );
    }
    let segments = match split_guest_path(&path) {
        Ok(segments) => segments,
        Err(e) => return reply(plugin, outputs, &e),
    };
    state.trace.push(json!({
        "import": op_name, "path": path, "decision": "allow",
    }));

    let ctx = state.ctx.clone();
    let adapter = state.adapter.clone();
    let runtime = state.runtime.clone();
    drop(state);
    drop(ud);

    let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
    let response = runtime.block_on(async {
        match op {
            StorageOp::Read => match adapter.get(&ctx, &segment_refs).await {
                Ok(bytes) => json!({"data": String::from_utf8_lossy(&bytes).into_owned()}),
                Err(e) => error_value("storage_error", e.to_string()),
            },
            StorageOp::Write => {
                let data = request["data"].as_str().unwrap_or_default();
                match adapter.put(&ctx, &segment_refs, data.as_bytes()).await {
                    Ok(()) => json!({"ok": true}),
                    Err(e) => error_value("storage_error", e.to_string()),
                }
            },
            StorageOp::List => match adapter.list(&ctx, &segment_refs).await {
                Ok(entries) => json!({"entries": entries}),
                Err(e) => error_value("storage_error", e.to_string()),
            },
            StorageOp::Delete => match adapter.delete(&ctx, &segment_refs).await {
                Ok(()) => json!({"ok": true}),
                Err(e) => error_value("storage_error", e.to_string()),
            },
        }
    });
    reply(plugin, outputs, &response)
}

#[allow(clippy::needless_pass_by_value)]
fn storage_read_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    storage_impl(plugin, inputs, outputs, user_data, &StorageOp::Read)
}

#[allow(clippy::needless_pass_by_value)]
fn storage_write_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    storage_impl(plugin, inputs, outputs, user_data, &StorageOp::Write)
}

#[allow(clippy::needless_pass_by_value)]
fn storage_list_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    storage_impl(plugin, inputs, outputs, user_data, &StorageOp::List)
}

#[allow(clippy::needless_pass_by_value)]
fn storage_delete_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    storage_impl(plugin, inputs, outputs, user_data, &StorageOp::Delete)
}

/// `cyfr_tools_call({name, args})`: formulas only; re-enters the router
/// with a child context whose `parent_execution_id` is set.
#[allow(clippy::needless_pass_by_value)]
fn tools_call_impl(
    plugin: &mut CurrentPlugin,
    inputs: &[Val],
    outputs: &mut [Val],
    user_data: UserData<HostState>,
) -> Result<(), Error> {
    let raw = get_safe_string(plugin, &inputs[0])?;
    let request = match parse_request(&raw) {
        Ok(v) => v,
        Err(e) => return reply(plugin, outputs, &e),
    };
    let name = request["name"].as_str().unwrap_or_default().to_string();
    let args = request.get("args").cloned().unwrap_or_else(|| json!({}));

    let ud = user_data.get()?;
    let mut state = ud
        .lock()
        .map_err(|e| Error::msg(format!("host state lock poisoned: {e}")))?;

    if state.component_type != ComponentType::Formula {
        state.trace.push(json!({
            "import": "mcp.tools.call", "tool": name, "decision": "deny",
        }));
        return reply(
            plugin,
            outputs,
            &error_value(
                "policy_violation",
                "only formula components may call tools",
            ),
        );
    }
    if !state.policy.allows_tool(&name) {
        state.log_policy(PolicyDecision::Deny, Some("tool_not_allowed"));
        state.trace.push(json!({
            "import": "mcp.tools.call", "tool": name, "decision": "deny",
        }));
        return reply(
            plugin,
            outputs,
            &error_value(
                "policy_violation",
                format!("tool {name} is not allowed by policy"),
            ),
        );
    }
    let Some(dispatcher) = state.dispatcher.clone() else {
        return reply(
            plugin,
            outputs,
            &error_value("not_configured", "no tool dispatcher installed"),
        );
    };
    state.log_policy(PolicyDecision::Allow, None);
    state.trace.push(json!({
        "import": "mcp.tools.call", "tool": name, "decision": "allow",
    }));

    let child_ctx = state.ctx.child_for_execution(state.execution_id.clone());
    let runtime = state.runtime.clone();
    drop(state);
    drop(ud);

    // `tool.action` splits into the router's (tool, action) pair.
    let (tool, action) = name
        .split_once('.')
        .map_or((name.as_str(), None), |(t, a)| (t, Some(a)));
    let mut call_args = args;
    if let (Some(action), Some(obj)) = (action, call_args.as_object_mut()) {
        obj.entry("action".to_string())
            .or_insert_with(|| json!(action));
    }

    debug!(tool, "formula tool re-entry");
    let response = runtime.block_on(async {
        match dispatcher.handle(tool, &child_ctx, call_args).await {
            Ok(value) => value,
            Err(e) => error_value(e.code.name(), e.message),
        }
    });
    reply(plugin, outputs, &response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_guest_path() {
        assert_eq!(
            split_guest_path("scratch/notes.txt").unwrap(),
            vec!["scratch", "notes.txt"]
        );
        assert!(split_guest_path("").is_err());
        // Reserved global prefixes never resolve for guests.
        assert!(split_guest_path("components/x").is_err());
        assert!(split_guest_path("cache/x").is_err());
    }

    #[test]
    fn test_error_value_shape() {
        let v = error_value("policy_violation", "nope");
        assert_eq!(v["error"]["code"], "policy_violation");
        assert_eq!(v["error"]["message"], "nope");
    }
}
