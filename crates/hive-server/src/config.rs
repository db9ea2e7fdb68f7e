//! Coordinator configuration.
//!
//! Three layers, lowest priority first: compiled defaults, an optional JSON
//! config file, and `HIVE_*` environment variables. Env parsing is strict —
//! an out-of-range or malformed value is ignored rather than half-applied.
//! The shared plugin secret is env-only so it never lands in a config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration loading failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Security is enabled but no shared secret was provided.
    #[error("security.enabled is true but HIVE_PLUGIN_SECRET is not set")]
    MissingSecret,
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerSection {
    /// Host to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind (0 for auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Handshake security settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SecuritySection {
    /// Whether the shared-secret token check is enforced.
    pub enabled: bool,
    /// Shared secret all plugins must present. Env-only
    /// (`HIVE_PLUGIN_SECRET`); never serialized.
    #[serde(skip)]
    pub shared_secret: Option<String>,
    /// Plugin ids allowed to handshake. Empty means no restriction.
    #[serde(default)]
    pub allowed_plugins: Vec<String>,
}

/// Liveness sweep settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LivenessSection {
    /// A running instance is unhealthy once its last heartbeat is older
    /// than this.
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
    /// How often the sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_heartbeat_timeout_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    10
}

impl Default for LivenessSection {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Full coordinator configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoordConfig {
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,
    /// Handshake security settings.
    #[serde(default)]
    pub security: SecuritySection,
    /// Liveness sweep settings.
    #[serde(default)]
    pub liveness: LivenessSection,
    /// API version the coordinator speaks; only the major component
    /// participates in handshake compatibility.
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// SQLite database path. `None` keeps state in memory.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Log filter directive (e.g. `"info"`, `"hive_server=debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_api_version() -> String {
    hive_core::CORE_API_VERSION.to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

impl Default for CoordConfig {
    fn default() -> Self {
        Self {
            server: ServerSection::default(),
            security: SecuritySection::default(),
            liveness: LivenessSection::default(),
            api_version: default_api_version(),
            db_path: None,
            log_level: default_log_level(),
        }
    }
}

impl CoordConfig {
    /// Load configuration: defaults, then the optional file at `path`, then
    /// env overrides. Validates that security has a secret when enabled.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                debug!(?path, "loading config from file");
                let content = std::fs::read_to_string(path)?;
                serde_json::from_str(&content)?
            }
            Some(path) => {
                debug!(?path, "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        apply_env_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    /// Check invariants that span multiple fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.enabled && self.security.shared_secret.is_none() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(())
    }
}

/// Apply `HIVE_*` env overrides from the process environment.
pub fn apply_env_overrides(config: &mut CoordConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (testable without touching the
/// process environment).
pub fn apply_overrides_from(
    config: &mut CoordConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("HIVE_HOST") {
        config.server.host = v;
    }
    if let Some(v) = parse_in_range(lookup("HIVE_PORT"), 0, u64::from(u16::MAX)) {
        config.server.port = u16::try_from(v).unwrap_or(config.server.port);
    }
    if let Some(v) = parse_bool(lookup("HIVE_SECURITY_ENABLED")) {
        config.security.enabled = v;
    }
    if let Some(v) = lookup("HIVE_PLUGIN_SECRET") {
        config.security.shared_secret = Some(v);
    }
    if let Some(v) = lookup("HIVE_ALLOWED_PLUGINS") {
        config.security.allowed_plugins = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .collect();
    }
    if let Some(v) = parse_in_range(lookup("HIVE_HEARTBEAT_TIMEOUT_SECS"), 1, 86_400) {
        config.liveness.heartbeat_timeout_secs = v;
    }
    if let Some(v) = parse_in_range(lookup("HIVE_SWEEP_INTERVAL_SECS"), 1, 86_400) {
        config.liveness.sweep_interval_secs = v;
    }
    if let Some(v) = lookup("HIVE_API_VERSION") {
        config.api_version = v;
    }
    if let Some(v) = lookup("HIVE_DB_PATH") {
        config.db_path = Some(PathBuf::from(v));
    }
    if let Some(v) = lookup("HIVE_LOG_LEVEL") {
        config.log_level = v;
    }
}

fn parse_in_range(raw: Option<String>, min: u64, max: u64) -> Option<u64> {
    let value: u64 = raw?.trim().parse().ok()?;
    (min..=max).contains(&value).then_some(value)
}

fn parse_bool(raw: Option<String>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
