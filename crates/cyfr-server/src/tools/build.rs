//! The `build` tool.
//!
//! `validate` and `toolchains` are fully in-tree. The compile actions
//! delegate to the external toolchain command configured via
//! `CYFR_BUILD_COMMAND` (source on stdin, module on stdout) and report
//! `toolchain_unavailable` when none is configured.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use cyfr_core::{Context, ToolError, ToolResult};
use cyfr_registry::{PublishAttrs, inspect_wasm, validate_wasm};
use serde_json::{Value, json};
use tracing::debug;

use super::{action, descriptor, opt_str, str_arg, unknown_action};
use crate::router::ToolHandler;
use crate::state::Services;

/// Compilers probed for `toolchains`.
const KNOWN_TOOLCHAINS: &[&str] = &["cargo", "tinygo", "javy", "wasm-tools"];

/// Wall-clock budget for one external compile.
const COMPILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Validate modules and drive the external build toolchain.
pub struct BuildTool {
    services: Arc<Services>,
}

impl BuildTool {
    /// Create the tool over the shared services.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    fn decode(args: &Value) -> ToolResult<Vec<u8>> {
        let raw = str_arg(args, "wasm_base64")?;
        base64::engine::general_purpose::STANDARD
            .decode(raw)
            .map_err(|e| {
                ToolError::invalid_params(format!("wasm_base64 is not valid base64: {e}"))
            })
    }

    fn validate(args: &Value) -> ToolResult<Value> {
        let bytes = Self::decode(args)?;
        if let Err(e) = validate_wasm(&bytes) {
            return Ok(json!({"valid": false, "reason": e.to_string()}));
        }
        match inspect_wasm(&bytes) {
            Ok(info) => Ok(json!({
                "valid": true,
                "size": bytes.len(),
                "exports": info.exports,
                "suggested_type": info.suggested_type,
            })),
            Err(e) => Ok(json!({"valid": false, "reason": e.to_string()})),
        }
    }

    fn toolchains() -> Value {
        let available: Vec<&str> = KNOWN_TOOLCHAINS
            .iter()
            .copied()
            .filter(|name| binary_on_path(name))
            .collect();
        json!({"known": KNOWN_TOOLCHAINS, "available": available})
    }

    /// Run the configured toolchain: source on stdin, module on stdout.
    async fn compile(&self, args: &Value) -> ToolResult<Vec<u8>> {
        let Some(command) = self.services.config.build_command.clone() else {
            return Err(ToolError::invalid_params(
                "toolchain_unavailable: no build command configured",
            ));
        };
        let source = str_arg(args, "source")?.to_string();
        debug!(command, "running external toolchain");

        let run = async move {
            use tokio::io::AsyncWriteExt;

            let mut child = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| format!("failed to spawn toolchain: {e}"))?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(source.as_bytes())
                    .await
                    .map_err(|e| format!("failed to feed toolchain: {e}"))?;
            }
            let output = child
                .wait_with_output()
                .await
                .map_err(|e| format!("toolchain failed: {e}"))?;
            if !output.status.success() {
                return Err(format!(
                    "toolchain exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                ));
            }
            Ok(output.stdout)
        };

        let bytes = tokio::time::timeout(COMPILE_TIMEOUT, run)
            .await
            .map_err(|_| ToolError::internal("toolchain timed out"))?
            .map_err(ToolError::internal)?;
        validate_wasm(&bytes).map_err(|e| {
            ToolError::internal(format!("toolchain produced an invalid module: {e}"))
        })?;
        Ok(bytes)
    }

    async fn compile_only(&self, args: &Value) -> ToolResult<Value> {
        let bytes = self.compile(args).await?;
        Ok(json!({
            "size": bytes.len(),
            "wasm_base64": base64::engine::general_purpose::STANDARD.encode(bytes),
        }))
    }

    async fn compile_and_save(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let bytes = self.compile(args).await?;
        let build_id = format!("build_{}", uuid::Uuid::now_v7().simple());
        let segments = ["builds", &build_id, "module.wasm"];
        self.services
            .adapter
            .put(ctx, &segments, &bytes)
            .await
            .map_err(|e| ToolError::internal(e.to_string()))?;
        Ok(json!({"build_id": build_id, "size": bytes.len()}))
    }

    async fn compile_and_publish(&self, ctx: &Context, args: &Value) -> ToolResult<Value> {
        let bytes = self.compile(args).await?;
        let attrs = PublishAttrs {
            name: str_arg(args, "name")?.to_string(),
            version: str_arg(args, "version")?.to_string(),
            component_type: None,
            publisher: opt_str(args, "publisher").map(ToString::to_string),
            description: opt_str(args, "description").map(ToString::to_string),
            tags: Vec::new(),
            category: None,
            license: None,
        };
        let record = self
            .services
            .registry
            .publish_bytes(ctx, &bytes, attrs)
            .await
            .map_err(|e| ToolError::invalid_params(e.to_string()))?;
        Ok(json!({"component": record}))
    }
}

/// Whether `name` resolves to a file on `PATH`.
fn binary_on_path(name: &str) -> bool {
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| dir.join(name).is_file())
}

#[async_trait]
impl ToolHandler for BuildTool {
    fn name(&self) -> &'static str {
        "build"
    }

    fn descriptor(&self) -> Value {
        descriptor(
            "build",
            "Validate WASM modules and drive the build toolchain",
            &["compile", "compile_and_save", "compile_and_publish", "validate", "toolchains"],
        )
    }

    async fn handle(&self, ctx: &Context, args: Value) -> ToolResult<Value> {
        match action(&args)? {
            "validate" => Self::validate(&args),
            "toolchains" => Ok(Self::toolchains()),
            "compile" => self.compile_only(&args).await,
            "compile_and_save" => self.compile_and_save(ctx, &args).await,
            "compile_and_publish" => self.compile_and_publish(ctx, &args).await,
            other => Err(unknown_action("build", other)),
        }
    }
}
