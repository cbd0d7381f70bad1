//! Server configuration.
//!
//! Environment variables are the interface; an optional TOML file can
//! pre-fill values that env then overrides. Missing `CYFR_SECRET_KEY_BASE`
//! outside dev mode is fatal at startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration errors are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Production mode without a secret key base.
    #[error("CYFR_SECRET_KEY_BASE is required outside dev mode")]
    MissingSecretKeyBase,

    /// A numeric variable failed to parse.
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },

    /// The TOML overlay failed to read or parse.
    #[error("config file error: {0}")]
    File(String),
}

/// TOML overlay shape (every field optional; env wins).
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    base_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    secret_key_base: Option<String>,
    pbkdf2_iterations: Option<u32>,
    session_ttl_hours: Option<u64>,
    build_command: Option<String>,
    trust_root_key: Option<String>,
}

/// Resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Base directory for all persisted state.
    pub base_path: PathBuf,
    /// Database file path; defaults to `<base>/cyfr.db`.
    pub db_path: PathBuf,
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Secret key base for secret sealing.
    pub secret_key_base: String,
    /// PBKDF2 iteration count.
    pub pbkdf2_iterations: u32,
    /// Session lifetime.
    pub session_ttl: Duration,
    /// Dev mode (permits a generated secret key base).
    pub dev_mode: bool,
    /// External WASM toolchain command for `build.compile`.
    pub build_command: Option<String>,
    /// HMAC key for the artifact trust root.
    pub trust_root_key: Option<String>,
}

impl ServerConfig {
    /// Load from the environment, with an optional TOML overlay under it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unparseable values or a missing
    /// secret key base outside dev mode; the binary treats these as
    /// fatal.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var("CYFR_CONFIG_FILE") {
            Ok(path) => {
                let raw = std::fs::read_to_string(&path)
                    .map_err(|e| ConfigError::File(format!("{path}: {e}")))?;
                toml::from_str::<FileConfig>(&raw)
                    .map_err(|e| ConfigError::File(format!("{path}: {e}")))?
            },
            Err(_) => FileConfig::default(),
        };

        let dev_mode = std::env::var("CYFR_ENV").map(|v| v != "prod").unwrap_or(true);

        let base_path = env_var("CYFR_BASE_PATH")
            .map(PathBuf::from)
            .or(file.base_path)
            .unwrap_or_else(|| PathBuf::from("./data"));
        let db_path = env_var("CYFR_DB_PATH")
            .map(PathBuf::from)
            .or(file.db_path)
            .unwrap_or_else(|| base_path.join("cyfr.db"));
        let host = env_var("CYFR_HOST")
            .or(file.host)
            .unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_var("CYFR_PORT")?.or(file.port).unwrap_or(4800);
        let pbkdf2_iterations = parse_var("CYFR_PBKDF2_ITERATIONS")?
            .or(file.pbkdf2_iterations)
            .unwrap_or(cyfr_crypto::secretbox::DEFAULT_PBKDF2_ITERATIONS);
        let session_ttl_hours: u64 = parse_var("CYFR_SESSION_TTL_HOURS")?
            .or(file.session_ttl_hours)
            .unwrap_or(24);

        let secret_key_base = match env_var("CYFR_SECRET_KEY_BASE").or(file.secret_key_base) {
            Some(value) => value,
            None if dev_mode => cyfr_crypto::generate_token("dev_"),
            None => return Err(ConfigError::MissingSecretKeyBase),
        };

        Ok(Self {
            base_path,
            db_path,
            host,
            port,
            secret_key_base,
            pbkdf2_iterations,
            session_ttl: Duration::from_secs(session_ttl_hours.saturating_mul(3600)),
            dev_mode,
            build_command: env_var("CYFR_BUILD_COMMAND").or(file.build_command),
            trust_root_key: env_var("CYFR_TRUST_ROOT_KEY").or(file.trust_root_key),
        })
    }

    /// A throwaway configuration rooted at `base` (tests and dev).
    #[must_use]
    pub fn for_base(base: impl Into<PathBuf>) -> Self {
        let base_path = base.into();
        Self {
            db_path: base_path.join("cyfr.db"),
            base_path,
            host: "127.0.0.1".to_string(),
            port: 0,
            secret_key_base: "test-secret-key-base".to_string(),
            pbkdf2_iterations: 16,
            session_ttl: Duration::from_secs(3600),
            dev_mode: true,
            build_command: None,
            trust_root_key: Some("test-trust-root".to_string()),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env_var(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                var: name,
                value: raw,
            }),
        None => Ok(None),
    }
}
