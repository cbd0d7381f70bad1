//! Shared server state and bootstrap.

use std::sync::Arc;

use cyfr_audit::{AuditLog, PolicyLog, RequestLog};
use cyfr_auth::{ApiKeyStore, PermissionStore, SessionStore};
use cyfr_crypto::SecretBox;
use cyfr_engine::{ExecutionKernel, ExecutionStore, HmacTrustRoot, TrustRoot};
use cyfr_policy::PolicyStore;
use cyfr_registry::ComponentRegistry;
use cyfr_secrets::SecretStore;
use cyfr_storage::{Cache, Database, StorageAdapter};

use crate::config::ServerConfig;
use crate::router::ToolRouter;
use crate::sse::SseHub;

/// Every store and subsystem the tool handlers touch.
pub struct Services {
    /// Resolved configuration.
    pub config: ServerConfig,
    /// Embedded database.
    pub db: Database,
    /// Process-local TTL cache.
    pub cache: Arc<Cache>,
    /// Scoped blob adapter.
    pub adapter: StorageAdapter,
    /// Host policies.
    pub policies: PolicyStore,
    /// Encrypted secrets + grants.
    pub secrets: Arc<SecretStore>,
    /// API keys.
    pub keys: ApiKeyStore,
    /// Sessions.
    pub sessions: Arc<SessionStore>,
    /// Durable permission grants.
    pub permissions: PermissionStore,
    /// Component registry.
    pub registry: Arc<ComponentRegistry>,
    /// Execution kernel.
    pub kernel: Arc<ExecutionKernel>,
    /// Request log.
    pub request_log: RequestLog,
    /// Policy log.
    pub policy_log: PolicyLog,
    /// Audit events.
    pub audit: AuditLog,
    /// SSE fan-out hub.
    pub sse: Arc<SseHub>,
}

impl Services {
    /// Open stores and assemble the service graph.
    ///
    /// # Errors
    ///
    /// Fatal at startup: database open/migration or secret-box setup
    /// failures.
    pub fn open(config: ServerConfig) -> anyhow::Result<Arc<Self>> {
        let db = Database::open(&config.db_path)?;
        let cache = Arc::new(Cache::new());
        let adapter = StorageAdapter::new(&config.base_path);

        let secret_box = Arc::new(SecretBox::new(
            &config.secret_key_base,
            config.pbkdf2_iterations,
        )?);
        let secrets = Arc::new(SecretStore::new(db.clone(), secret_box));
        let policies = PolicyStore::new(db.clone(), Arc::clone(&cache));
        let registry = Arc::new(ComponentRegistry::new(db.clone(), adapter.clone()));
        let policy_log = PolicyLog::new(db.clone());
        let trust_root: Option<Arc<dyn TrustRoot>> = config
            .trust_root_key
            .as_deref()
            .map(|key| Arc::new(HmacTrustRoot::new(key)) as Arc<dyn TrustRoot>);

        let kernel = Arc::new(ExecutionKernel::new(
            Arc::clone(&registry),
            policies.clone(),
            Arc::clone(&secrets),
            ExecutionStore::new(db.clone()),
            policy_log.clone(),
            adapter.clone(),
            trust_root,
        ));

        Ok(Arc::new(Self {
            keys: ApiKeyStore::new(db.clone()),
            sessions: Arc::new(SessionStore::new(db.clone(), config.session_ttl)),
            permissions: PermissionStore::new(db.clone()),
            request_log: RequestLog::new(db.clone(), adapter.clone()),
            audit: AuditLog::new(db.clone(), adapter.clone()),
            policy_log,
            registry,
            kernel,
            secrets,
            policies,
            adapter,
            cache,
            db,
            config,
            sse: Arc::new(SseHub::new()),
        }))
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

/// Axum application state.
#[derive(Clone)]
pub struct AppState {
    /// Shared service graph.
    pub services: Arc<Services>,
    /// The tool router (also the kernel's dispatcher).
    pub router: Arc<ToolRouter>,
}

impl AppState {
    /// Build the state: router over services, kernel dispatcher wired.
    #[must_use]
    pub fn new(services: Arc<Services>) -> Self {
        let router = Arc::new(ToolRouter::with_default_tools(Arc::clone(&services)));
        services
            .kernel
            .set_dispatcher(Arc::clone(&router) as Arc<dyn cyfr_core::ToolDispatcher>);
        Self { services, router }
    }
}
