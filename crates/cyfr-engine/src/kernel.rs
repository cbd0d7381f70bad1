//! The execution kernel.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use cyfr_audit::{PolicyDecision, PolicyLog};
use cyfr_core::{ComponentRef, ComponentType, Context, ExecutionId, ToolDispatcher};
use cyfr_crypto::ContentDigest;
use cyfr_policy::{HostPolicy, PolicyStore, policy::DEFAULT_FUEL_LIMIT};
use cyfr_registry::ComponentRegistry;
use cyfr_secrets::SecretStore;
use cyfr_storage::{StorageAdapter, StorageError};
use dashmap::DashMap;
use extism::{Manifest, PluginBuilder, UserData, Wasm};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::host::{HostState, register_host_functions};
use crate::record::{ExecutionRecord, ExecutionStatus, ExecutionStore};
use crate::reference::Reference;
use crate::verify::{BlobResolver, NoopResolver, TrustRoot};

/// Caller options for one invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit entry point; defaults to `execute` when exported, else
    /// the module's first export.
    pub entry_point: Option<String>,
    /// Type override for `arca`/`oci` references whose bytes must
    /// otherwise be inspected.
    pub component_type: Option<ComponentType>,
    /// Instruction budget override.
    pub fuel_limit: Option<u64>,
}

/// What one invocation produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The execution record id.
    pub execution_id: String,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Masked output, when the guest returned one.
    pub output: Option<Value>,
    /// Failure detail, when it did not.
    pub error: Option<String>,
    /// Record duration.
    pub duration_ms: Option<i64>,
}

struct ResolvedArtifact {
    bytes: Vec<u8>,
    digest: String,
    component_type: ComponentType,
    publisher: String,
    display: String,
    typed_ref: Option<ComponentRef>,
    exports: Vec<String>,
    signature: Option<String>,
}

/// Resolve, verify, sandbox, record, mask.
pub struct ExecutionKernel {
    registry: Arc<ComponentRegistry>,
    policies: PolicyStore,
    secrets: Arc<SecretStore>,
    executions: ExecutionStore,
    policy_log: PolicyLog,
    adapter: StorageAdapter,
    trust_root: Option<Arc<dyn TrustRoot>>,
    resolver: Arc<dyn BlobResolver>,
    dispatcher: OnceLock<Arc<dyn ToolDispatcher>>,
    cancel_handles: DashMap<String, extism::CancelHandle>,
}

impl ExecutionKernel {
    /// Assemble the kernel over the shared stores.
    #[must_use]
    pub fn new(
        registry: Arc<ComponentRegistry>,
        policies: PolicyStore,
        secrets: Arc<SecretStore>,
        executions: ExecutionStore,
        policy_log: PolicyLog,
        adapter: StorageAdapter,
        trust_root: Option<Arc<dyn TrustRoot>>,
    ) -> Self {
        Self {
            registry,
            policies,
            secrets,
            executions,
            policy_log,
            adapter,
            trust_root,
            resolver: Arc::new(NoopResolver),
            dispatcher: OnceLock::new(),
            cancel_handles: DashMap::new(),
        }
    }

    /// Install the OCI pull side-car.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn BlobResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Install the tool router. Called once at boot, after the router is
    /// built (the router holds the kernel, so this seam breaks the
    /// cycle).
    pub fn set_dispatcher(&self, dispatcher: Arc<dyn ToolDispatcher>) {
        let _ = self.dispatcher.set(dispatcher);
    }

    /// The execution record store (read surface for tools).
    #[must_use]
    pub fn executions(&self) -> &ExecutionStore {
        &self.executions
    }

    /// Run a component. See the crate docs for the stage breakdown.
    ///
    /// # Errors
    ///
    /// Pre-invocation failures (resolution, verification,
    /// `POLICY_REQUIRED`) error without leaving a record; once the
    /// record is inserted every outcome is also recorded on it.
    pub async fn run(
        &self,
        ctx: &Context,
        reference: Reference,
        input: Value,
        opts: RunOptions,
    ) -> EngineResult<RunOutcome> {
        // Stage A: resolution.
        let artifact = self.resolve(ctx, &reference, &opts).await?;

        // Stage B: verification.
        self.verify(&artifact)?;

        // Stage C: policy load + snapshot.
        let (policy, stored) = match &artifact.typed_ref {
            Some(typed) => {
                let loaded = self.policies.load(typed)?;
                (loaded.policy, loaded.stored)
            },
            None => (HostPolicy::default_for(artifact.component_type), false),
        };
        if artifact.component_type == ComponentType::Catalyst
            && !stored
            && policy.allowed_domains.is_empty()
        {
            self.policy_log.record(
                ctx,
                &artifact.display,
                Some(artifact.component_type.as_str()),
                None,
                &policy.to_map(),
                PolicyDecision::Deny,
                Some("POLICY_REQUIRED"),
            );
            return Err(EngineError::PolicyRequired(artifact.display));
        }

        // Stage D: secret preload.
        let granted: Vec<(String, String)> = match &artifact.typed_ref {
            Some(typed) => self.secrets.resolve_granted(ctx, typed)?,
            None => Vec::new(),
        };
        let secret_values: Vec<String> = granted.iter().map(|(_, v)| v.clone()).collect();

        // Stage E: record insert, before the sandbox ever starts.
        let execution_id = ExecutionId::new();
        let input_hash = ContentDigest::of(input.to_string().as_bytes()).to_string();
        let record = ExecutionRecord {
            id: execution_id.to_string(),
            request_id: Some(ctx.request_id.to_string()),
            parent_execution_id: ctx
                .parent_execution_id
                .as_ref()
                .map(|id| id.as_str().to_string()),
            reference: artifact.display.clone(),
            input_hash: Some(input_hash),
            user_id: ctx.user_id.clone(),
            component_type: Some(artifact.component_type.as_str().to_string()),
            component_digest: Some(artifact.digest.clone()),
            started_at: chrono::Utc::now(),
            completed_at: None,
            duration_ms: None,
            status: ExecutionStatus::Running,
            error_message: None,
            input: Some(input.clone()),
            output: None,
            wasi_trace: None,
            host_policy: Some(policy.to_map()),
        };
        self.executions.insert_running(&record)?;
        self.mirror_artifact(ctx, &execution_id, "started.json", &json!({
            "execution_id": record.id,
            "reference": record.reference,
            "started_at": record.started_at.to_rfc3339(),
            "input": input,
        }))
        .await;

        // Stage F: sandbox invocation.
        let invocation = self
            .invoke(ctx, &artifact, &policy, granted, &execution_id, &input, &opts)
            .await;
        self.cancel_handles.remove(execution_id.as_str());

        // Stage G: finalization with masked output.
        let outcome = match invocation {
            Ok((raw_output, trace)) => {
                let masked = cyfr_secrets::mask_value(&raw_output, &secret_values);
                let finalized = self.executions.finalize(
                    &execution_id,
                    ExecutionStatus::Completed,
                    Some(&masked),
                    None,
                    Some(&trace),
                )?;
                self.mirror_artifact(ctx, &execution_id, "completed.json", &json!({
                    "execution_id": finalized.id,
                    "output": masked,
                    "duration_ms": finalized.duration_ms,
                }))
                .await;
                info!(execution_id = %execution_id, "execution completed");
                RunOutcome {
                    execution_id: execution_id.to_string(),
                    status: ExecutionStatus::Completed,
                    output: Some(masked),
                    error: None,
                    duration_ms: finalized.duration_ms,
                }
            },
            Err(engine_error) => {
                let message =
                    cyfr_secrets::mask_text(&engine_error.to_string(), &secret_values);
                match self.executions.finalize(
                    &execution_id,
                    ExecutionStatus::Failed,
                    None,
                    Some(&message),
                    None,
                ) {
                    Ok(finalized) => {
                        self.mirror_artifact(ctx, &execution_id, "failed.json", &json!({
                            "execution_id": finalized.id,
                            "error": message,
                            "duration_ms": finalized.duration_ms,
                        }))
                        .await;
                        return Err(engine_error);
                    },
                    Err(EngineError::NotFound(_)) => {
                        // Finalized under us: a concurrent cancel won.
                        let record = self.executions.get(&execution_id)?;
                        if let Some(record) = record
                            && record.status == ExecutionStatus::Cancelled
                        {
                            return Ok(RunOutcome {
                                execution_id: execution_id.to_string(),
                                status: ExecutionStatus::Cancelled,
                                output: None,
                                error: record.error_message,
                                duration_ms: record.duration_ms,
                            });
                        }
                        return Err(engine_error);
                    },
                    Err(other) => return Err(other),
                }
            },
        };
        Ok(outcome)
    }

    /// Cancel a running execution via the engine's cancel handle.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] for unknown ids and
    /// [`EngineError::NotRunning`] for terminal records.
    pub fn cancel(&self, _ctx: &Context, execution_id: &ExecutionId) -> EngineResult<()> {
        let record = self
            .executions
            .get(execution_id)?
            .ok_or_else(|| EngineError::NotFound(execution_id.to_string()))?;
        if record.status != ExecutionStatus::Running {
            return Err(EngineError::NotRunning {
                id: execution_id.to_string(),
                status: record.status.as_str().to_string(),
            });
        }
        if let Some(handle) = self.cancel_handles.get(execution_id.as_str()) {
            if let Err(e) = handle.cancel() {
                warn!(error = %e, "engine cancel signal failed");
            }
        }
        self.executions.finalize(
            execution_id,
            ExecutionStatus::Cancelled,
            None,
            Some("cancelled by request"),
            None,
        )?;
        info!(execution_id = %execution_id, "execution cancelled");
        Ok(())
    }

    async fn resolve(
        &self,
        ctx: &Context,
        reference: &Reference,
        opts: &RunOptions,
    ) -> EngineResult<ResolvedArtifact> {
        match reference {
            Reference::Registry(raw) => {
                let typed = ComponentRef::normalize(raw)?;
                let record = self.registry.get(ctx, &typed)?;
                let bytes = self.registry.get_blob(ctx, &record.digest).await?;
                let signature = self.read_signature(ctx, &record.blob_segments()).await;
                Ok(ResolvedArtifact {
                    bytes,
                    digest: record.digest.clone(),
                    component_type: record.component_type,
                    publisher: record.publisher.clone(),
                    display: record.reference().to_string(),
                    typed_ref: Some(record.reference()),
                    exports: record.exports,
                    signature,
                })
            },
            Reference::Local(path) => {
                let (component_type, publisher, name, version) =
                    parse_local_layout(path).ok_or_else(|| {
                        EngineError::BadLocalPath(path.clone())
                    })?;
                let segments = [
                    "components".to_string(),
                    component_type.plural().to_string(),
                    publisher.clone(),
                    name.clone(),
                    version.clone(),
                    format!("{}.wasm", component_type.as_str()),
                ];
                let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
                let bytes = match self.adapter.get(ctx, &segment_refs).await {
                    Ok(bytes) => bytes,
                    Err(StorageError::NotFound(p)) => {
                        return Err(EngineError::BadLocalPath(p));
                    },
                    Err(e) => return Err(e.into()),
                };
                let info = cyfr_registry::inspect_wasm(&bytes)?;
                let typed = ComponentRef::new(component_type, publisher.clone(), name, version);
                Ok(ResolvedArtifact {
                    digest: ContentDigest::of(&bytes).to_string(),
                    bytes,
                    component_type,
                    publisher,
                    display: typed.to_string(),
                    typed_ref: Some(typed),
                    exports: info.exports,
                    signature: None,
                })
            },
            Reference::Arca(path) => {
                let segments: Vec<&str> =
                    path.split('/').filter(|s| !s.is_empty()).collect();
                let bytes = self.adapter.get(ctx, &segments).await?;
                let info = cyfr_registry::inspect_wasm(&bytes)?;
                let component_type = opts.component_type.unwrap_or(info.suggested_type);
                Ok(ResolvedArtifact {
                    digest: ContentDigest::of(&bytes).to_string(),
                    bytes,
                    component_type,
                    publisher: "local".to_string(),
                    display: format!("arca:{path}"),
                    typed_ref: None,
                    exports: info.exports,
                    signature: None,
                })
            },
            Reference::Oci(raw) => {
                let bytes = self.resolver.pull(raw).await?;
                let info = cyfr_registry::inspect_wasm(&bytes)?;
                let component_type = opts.component_type.unwrap_or(info.suggested_type);
                Ok(ResolvedArtifact {
                    digest: ContentDigest::of(&bytes).to_string(),
                    bytes,
                    component_type,
                    publisher: "oci".to_string(),
                    display: format!("oci:{raw}"),
                    typed_ref: None,
                    exports: info.exports,
                    signature: None,
                })
            },
        }
    }

    async fn read_signature(&self, ctx: &Context, blob_segments: &[String; 6]) -> Option<String> {
        let mut segments: Vec<String> = blob_segments.to_vec();
        if let Some(last) = segments.last_mut() {
            last.push_str(".sig");
        }
        let segment_refs: Vec<&str> = segments.iter().map(String::as_str).collect();
        match self.adapter.get(ctx, &segment_refs).await {
            Ok(bytes) => String::from_utf8(bytes).ok(),
            Err(_) => None,
        }
    }

    fn verify(&self, artifact: &ResolvedArtifact) -> EngineResult<()> {
        // Local namespaces are owned by the calling user on this node;
        // anything else must verify against the trust root.
        if artifact.publisher == "local" || artifact.publisher == "agent" {
            return Ok(());
        }
        let Some(trust_root) = &self.trust_root else {
            return Err(EngineError::VerificationFailed(format!(
                "no trust root configured for publisher {}",
                artifact.publisher
            )));
        };
        trust_root.verify(
            &artifact.publisher,
            &artifact.bytes,
            artifact.signature.as_deref(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    async fn invoke(
        &self,
        ctx: &Context,
        artifact: &ResolvedArtifact,
        policy: &HostPolicy,
        granted: Vec<(String, String)>,
        execution_id: &ExecutionId,
        input: &Value,
        opts: &RunOptions,
    ) -> EngineResult<(Value, Value)> {
        let entry = match &opts.entry_point {
            Some(entry) => entry.clone(),
            None if artifact.exports.iter().any(|e| e == "execute") => "execute".to_string(),
            None => artifact
                .exports
                .first()
                .cloned()
                .ok_or_else(|| {
                    EngineError::ExecutionFailed("module has no callable export".to_string())
                })?,
        };

        let pages =
            u32::try_from(policy.max_memory_bytes / (64 * 1024)).unwrap_or(u32::MAX);
        let manifest = Manifest::new([Wasm::data(artifact.bytes.clone())])
            .with_timeout(policy.timeout)
            .with_memory_max(pages);

        let input_raw = input.to_string();
        if input_raw.len() as u64 > policy.max_request_size {
            return Err(EngineError::ExecutionFailed(format!(
                "input exceeds {} byte cap",
                policy.max_request_size
            )));
        }

        let state = HostState {
            ctx: ctx.clone(),
            execution_id: execution_id.clone(),
            reference: artifact.display.clone(),
            component_type: artifact.component_type,
            policy: policy.clone(),
            secrets: granted.into_iter().collect::<HashMap<_, _>>(),
            adapter: self.adapter.clone(),
            policy_log: self.policy_log.clone(),
            dispatcher: self.dispatcher.get().cloned(),
            runtime: tokio::runtime::Handle::current(),
            trace: Vec::new(),
        };
        let user_data = UserData::new(state);
        let fuel = opts.fuel_limit.unwrap_or(DEFAULT_FUEL_LIMIT);

        let builder = PluginBuilder::new(manifest)
            .with_wasi(true)
            .with_fuel_limit(fuel);
        let builder = register_host_functions(builder, &user_data);
        let mut plugin = builder
            .build()
            .map_err(|e| EngineError::ExecutionFailed(format!("plugin build failed: {e}")))?;

        self.cancel_handles
            .insert(execution_id.to_string(), plugin.cancel_handle());

        debug!(execution_id = %execution_id, entry, fuel, "entering sandbox");
        let max_response = policy.max_response_size;
        let call_result = tokio::task::spawn_blocking(move || {
            plugin
                .call::<&str, String>(&entry, &input_raw)
                .map(|out| out.to_string())
        })
        .await
        .map_err(|e| EngineError::ExecutionFailed(format!("sandbox task failed: {e}")))?;

        let trace = {
            let ud = user_data.get().map_err(|e| {
                EngineError::ExecutionFailed(format!("host state unavailable: {e}"))
            })?;
            let state = ud
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            Value::Array(state.trace.clone())
        };

        match call_result {
            Ok(raw) => {
                if raw.len() as u64 > max_response {
                    return Err(EngineError::ExecutionFailed(format!(
                        "output exceeds {max_response} byte cap"
                    )));
                }
                let output =
                    serde_json::from_str(&raw).unwrap_or(Value::String(raw));
                Ok((output, trace))
            },
            Err(e) => {
                let message = e.to_string();
                let lowered = message.to_lowercase();
                if lowered.contains("timeout") || lowered.contains("timed out") {
                    Err(EngineError::Timeout(message))
                } else if lowered.contains("fuel") {
                    Err(EngineError::Timeout(format!("fuel exhausted: {message}")))
                } else {
                    Err(EngineError::ExecutionFailed(message))
                }
            },
        }
    }

    async fn mirror_artifact(
        &self,
        ctx: &Context,
        execution_id: &ExecutionId,
        file: &str,
        body: &Value,
    ) {
        let id = execution_id.to_string();
        let segments = ["executions", id.as_str(), file];
        let bytes = serde_json::to_vec_pretty(body).unwrap_or_default();
        if let Err(e) = self.adapter.put(ctx, &segments, &bytes).await {
            warn!(error = %e, "execution artifact mirror failed");
        }
    }
}

impl std::fmt::Debug for ExecutionKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionKernel")
            .field("active_cancel_handles", &self.cancel_handles.len())
            .finish_non_exhaustive()
    }
}

/// Parse `components/<types>/<publisher>/<name>/<version>` (with or
/// without a trailing artifact file).
fn parse_local_layout(path: &str) -> Option<(ComponentType, String, String, String)> {
    let segments: Vec<&str> = Path::new(path)
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let anchor = segments.iter().rposition(|s| *s == "components")?;
    let tail = &segments[anchor + 1..];
    if tail.len() != 4 && tail.len() != 5 {
        return None;
    }
    let component_type = ComponentType::from_plural(tail[0]).ok()?;
    Some((
        component_type,
        tail[1].to_string(),
        tail[2].to_string(),
        tail[3].to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyfr_core::RequestId;
    use cyfr_crypto::SecretBox;
    use cyfr_registry::PublishAttrs;
    use cyfr_secrets::SecretScope;
    use cyfr_storage::{Cache, Database};

    fn ctx() -> Context {
        let mut ctx = Context::unauthenticated(RequestId::new());
        ctx.user_id = "alice".to_string();
        ctx
    }

    struct Fixture {
        kernel: ExecutionKernel,
        registry: Arc<ComponentRegistry>,
        db: Database,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::in_memory().unwrap();
        let adapter = StorageAdapter::new(dir.path());
        let cache = Arc::new(Cache::new());
        let registry = Arc::new(ComponentRegistry::new(db.clone(), adapter.clone()));
        let secrets = Arc::new(SecretStore::new(
            db.clone(),
            Arc::new(SecretBox::new("test-key-base", 16).unwrap()),
        ));
        let kernel = ExecutionKernel::new(
            Arc::clone(&registry),
            PolicyStore::new(db.clone(), cache),
            secrets,
            ExecutionStore::new(db.clone()),
            PolicyLog::new(db.clone()),
            adapter,
            None,
        );
        Fixture {
            kernel,
            registry,
            db,
            _dir: dir,
        }
    }

    fn module(names: &[&str]) -> Vec<u8> {
        use wasm_encoder::{
            CodeSection, ExportKind, ExportSection, Function, FunctionSection, Instruction,
            Module, TypeSection,
        };
        let mut types = TypeSection::new();
        types.ty().function([], []);
        let mut functions = FunctionSection::new();
        let mut exports = ExportSection::new();
        let mut codes = CodeSection::new();
        for (i, name) in names.iter().enumerate() {
            functions.function(0);
            exports.export(name, ExportKind::Func, u32::try_from(i).unwrap());
            let mut body = Function::new([]);
            body.instruction(&Instruction::End);
            codes.function(&body);
        }
        let mut m = Module::new();
        m.section(&types);
        m.section(&functions);
        m.section(&exports);
        m.section(&codes);
        m.finish()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_records_completed_execution() {
        let f = fixture();
        let ctx = ctx();
        f.registry
            .publish_bytes(
                &ctx,
                &module(&["run"]),
                PublishAttrs {
                    name: "noop".to_string(),
                    version: "1.0.0".to_string(),
                    ..PublishAttrs::default()
                },
            )
            .await
            .unwrap();

        let outcome = f
            .kernel
            .run(
                &ctx,
                Reference::Registry("r:local.noop:1.0.0".to_string()),
                serde_json::json!({"a": 5}),
                RunOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.status, ExecutionStatus::Completed);
        assert!(outcome.duration_ms.unwrap_or(-1) >= 0);

        let record = f
            .kernel
            .executions()
            .get(&ExecutionId::from_string(outcome.execution_id.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.component_digest.unwrap().starts_with("sha256:"));
        assert!(record.completed_at.is_some());
        assert_eq!(record.reference, "reagent:local.noop:1.0.0");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_catalyst_without_policy_fails_fast() {
        let f = fixture();
        let ctx = ctx();
        // `http_get` export makes this a catalyst by inference.
        f.registry
            .publish_bytes(
                &ctx,
                &module(&["http_get"]),
                PublishAttrs {
                    name: "fetch".to_string(),
                    version: "1.0.0".to_string(),
                    ..PublishAttrs::default()
                },
            )
            .await
            .unwrap();

        let result = f
            .kernel
            .run(
                &ctx,
                Reference::Registry("c:local.fetch:1.0.0".to_string()),
                serde_json::json!({}),
                RunOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(EngineError::PolicyRequired(_))));

        // No running record is left behind.
        let records = f.kernel.executions().list(&ctx, 10).unwrap();
        assert!(records.iter().all(|r| r.status != ExecutionStatus::Running));
        assert!(records.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_secret_masking_in_record() {
        let f = fixture();
        let ctx = ctx();
        f.registry
            .publish_bytes(
                &ctx,
                &module(&["run"]),
                PublishAttrs {
                    name: "echo".to_string(),
                    version: "1.0.0".to_string(),
                    ..PublishAttrs::default()
                },
            )
            .await
            .unwrap();

        // Grant a secret so the preload stage resolves a plaintext. The
        // noop guest emits no output, so this exercises preload and
        // masking setup, not leakage.
        let secrets = SecretStore::new(
            f.db.clone(),
            Arc::new(SecretBox::new("test-key-base", 16).unwrap()),
        );
        secrets
            .set(&ctx, "SK", "sk-abcdefghijkl", SecretScope::Personal)
            .unwrap();
        secrets
            .grant(
                &ctx,
                "SK",
                &ComponentRef::parse("r:local.echo:1.0.0").unwrap(),
                SecretScope::Personal,
            )
            .unwrap();

        let outcome = f
            .kernel
            .run(
                &ctx,
                Reference::Registry("r:local.echo:1.0.0".to_string()),
                serde_json::json!({}),
                RunOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.status, ExecutionStatus::Completed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancel_requires_running_state() {
        let f = fixture();
        let ctx = ctx();
        let missing = ExecutionId::new();
        assert!(matches!(
            f.kernel.cancel(&ctx, &missing),
            Err(EngineError::NotFound(_))
        ));

        f.registry
            .publish_bytes(
                &ctx,
                &module(&["run"]),
                PublishAttrs {
                    name: "noop".to_string(),
                    version: "1.0.0".to_string(),
                    ..PublishAttrs::default()
                },
            )
            .await
            .unwrap();
        let outcome = f
            .kernel
            .run(
                &ctx,
                Reference::Registry("r:local.noop:1.0.0".to_string()),
                serde_json::json!({}),
                RunOptions::default(),
            )
            .await
            .unwrap();

        // Terminal records cannot be cancelled.
        assert!(matches!(
            f.kernel
                .cancel(&ctx, &ExecutionId::from_string(outcome.execution_id)),
            Err(EngineError::NotRunning { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bad_local_path_rejected() {
        let f = fixture();
        let result = f
            .kernel
            .run(
                &ctx(),
                Reference::Local("somewhere/else/module.wasm".to_string()),
                serde_json::json!({}),
                RunOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(EngineError::BadLocalPath(_))));
    }

    #[test]
    fn test_parse_local_layout() {
        let parsed =
            parse_local_layout("components/reagents/local/math/1.0.0/reagent.wasm").unwrap();
        assert_eq!(parsed.0, ComponentType::Reagent);
        assert_eq!(parsed.1, "local");
        assert_eq!(parsed.2, "math");
        assert_eq!(parsed.3, "1.0.0");

        assert!(parse_local_layout("components/reagents/local/math/1.0.0").is_some());
        assert!(parse_local_layout("elsewhere/math.wasm").is_none());
    }
}
