//! Configuration management

use std::{collections::HashMap, env, path::Path};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before secrets are resolved.
    /// Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Sandbox configuration
    pub sandbox: SandboxConfig,
    /// Downstream datasource credentials marshaled into the sandbox
    pub datasources: DatasourcesConfig,
    /// Metrics exporter configuration
    pub metrics: MetricsConfig,
}

/// Server listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Canonical public base URL. Used as the token audience and issuer base,
    /// so it must match what clients see.
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Base URL with any trailing slash removed
    #[must_use]
    pub fn canonical_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Enable the OAuth authorization server and request gating
    pub enabled: bool,
    /// GitHub organizations whose members may authenticate.
    /// Empty means no organization policy.
    pub allowed_orgs: Vec<String>,
    /// Token signing configuration
    pub tokens: AuthTokensConfig,
    /// GitHub OAuth app credentials (required when auth is enabled)
    pub github: Option<AuthGitHubConfig>,
}

/// Token signing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthTokensConfig {
    /// HS256 signing key. Supports `env:VAR_NAME` indirection.
    /// Startup fails if empty.
    pub secret_key: String,
    /// Token `iss` claim
    pub issuer: String,
    /// Access token TTL in seconds
    pub access_token_ttl: u64,
    /// Refresh token TTL in seconds
    pub refresh_token_ttl: u64,
}

impl Default for AuthTokensConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            issuer: "mcp-sandbox-gateway".to_string(),
            access_token_ttl: 3600,
            refresh_token_ttl: 2_592_000,
        }
    }
}

impl AuthTokensConfig {
    /// Resolve the signing key (expand `env:VAR_NAME` indirection)
    #[must_use]
    pub fn resolve_secret_key(&self) -> String {
        resolve_secret(&self.secret_key)
    }
}

/// GitHub OAuth app configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthGitHubConfig {
    /// OAuth app client id (supports `env:VAR_NAME`)
    pub client_id: String,
    /// OAuth app client secret (supports `env:VAR_NAME`)
    pub client_secret: String,
}

impl AuthGitHubConfig {
    /// Resolve the client id
    #[must_use]
    pub fn resolve_client_id(&self) -> String {
        resolve_secret(&self.client_id)
    }

    /// Resolve the client secret
    #[must_use]
    pub fn resolve_client_secret(&self) -> String {
        resolve_secret(&self.client_secret)
    }
}

/// Sandbox backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SandboxBackendKind {
    /// Standard container isolation
    Docker,
    /// User-space-kernel isolation via the runsc runtime
    Gvisor,
}

impl std::fmt::Display for SandboxBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Docker => f.write_str("docker"),
            Self::Gvisor => f.write_str("gvisor"),
        }
    }
}

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Backend to execute code with. Unknown names fail at startup.
    pub backend: SandboxBackendKind,
    /// Container image to run
    pub image: String,
    /// Default execution timeout in seconds (also the per-call maximum
    /// is derived from this; see the execute tool)
    pub timeout: u64,
    /// Memory limit ("512m", "2g", or plain bytes)
    pub memory_limit: String,
    /// CPU quota as a fraction of one core (1.0 = one full core)
    pub cpu_limit: f64,
    /// Docker network to attach containers to
    pub network: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackendKind::Docker,
            image: "mcp-sandbox:latest".to_string(),
            timeout: 60,
            memory_limit: "512m".to_string(),
            cpu_limit: 1.0,
            network: "mcp-sandbox".to_string(),
        }
    }
}

impl SandboxConfig {
    /// Memory limit in bytes
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the limit string is malformed.
    pub fn memory_limit_bytes(&self) -> Result<i64> {
        parse_memory_limit(&self.memory_limit)
    }
}

/// Parse a memory limit string ("512m", "2g", "1024k", or plain bytes)
pub fn parse_memory_limit(value: &str) -> Result<i64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Config("Empty memory limit".to_string()));
    }

    let (number, multiplier) = match value.chars().last() {
        Some('k' | 'K') => (&value[..value.len() - 1], 1024),
        Some('m' | 'M') => (&value[..value.len() - 1], 1024 * 1024),
        Some('g' | 'G') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };

    number
        .parse::<i64>()
        .ok()
        .filter(|n| *n > 0)
        .map(|n| n * multiplier)
        .ok_or_else(|| Error::Config(format!("Invalid memory limit: {value}")))
}

/// ClickHouse cluster connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// Hostname
    pub host: String,
    /// Port
    pub port: u16,
    /// Protocol (http or https)
    pub protocol: String,
    /// Username
    pub user: String,
    /// Password (supports `env:VAR_NAME`)
    pub password: String,
    /// Database name
    pub database: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8443,
            protocol: "https".to_string(),
            user: "default".to_string(),
            password: String::new(),
            database: "default".to_string(),
        }
    }
}

impl ClickHouseConfig {
    /// Resolve the password
    #[must_use]
    pub fn resolve_password(&self) -> String {
        resolve_secret(&self.password)
    }
}

/// Prometheus endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Query API base URL
    pub url: String,
}

/// Loki endpoint
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LokiConfig {
    /// Query API base URL
    pub url: String,
}

/// S3-compatible object storage used by sandbox code to publish artifacts
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Endpoint URL
    pub endpoint: String,
    /// Access key (supports `env:VAR_NAME`)
    pub access_key: String,
    /// Secret key (supports `env:VAR_NAME`)
    pub secret_key: String,
    /// Bucket name
    pub bucket: String,
    /// Region
    pub region: String,
    /// Public URL prefix for uploaded objects
    pub public_url_prefix: Option<String>,
}

impl StorageConfig {
    /// Resolve the access key
    #[must_use]
    pub fn resolve_access_key(&self) -> String {
        resolve_secret(&self.access_key)
    }

    /// Resolve the secret key
    #[must_use]
    pub fn resolve_secret_key(&self) -> String {
        resolve_secret(&self.secret_key)
    }
}

/// Downstream datasources whose credentials are marshaled into the sandbox
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DatasourcesConfig {
    /// Named ClickHouse clusters. Cluster names are explicit config keys;
    /// there is no auto-selection.
    pub clickhouse: HashMap<String, ClickHouseConfig>,
    /// Prometheus endpoint
    pub prometheus: Option<PrometheusConfig>,
    /// Loki endpoint
    pub loki: Option<LokiConfig>,
    /// Object storage
    pub storage: Option<StorageConfig>,
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus scrape listener
    pub enabled: bool,
    /// Port for the scrape listener (own listener; the main surface keeps
    /// its closed public-path set)
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Expand `env:VAR_NAME` indirection in a secret value
fn resolve_secret(value: &str) -> String {
    if let Some(var_name) = value.strip_prefix("env:") {
        env::var(var_name).unwrap_or_else(|_| value.to_string())
    } else {
        value.to_string()
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("MCP_SANDBOX_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let path = Path::new(path_str);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {path_str}"),
                    Err(e) => tracing::warn!("Failed to load env file {path_str}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {path_str}");
            }
        }
    }

    /// Validate cross-field constraints that serde cannot express
    fn validate(&self) -> Result<()> {
        if self.auth.enabled && self.auth.github.is_none() {
            return Err(Error::Config(
                "auth.github is required when auth is enabled".to_string(),
            ));
        }

        if self.server.canonical_base_url().is_empty() {
            return Err(Error::Config("server.base_url must not be empty".to_string()));
        }

        self.sandbox.memory_limit_bytes()?;

        if self.sandbox.cpu_limit <= 0.0 {
            return Err(Error::Config(format!(
                "sandbox.cpu_limit must be positive, got {}",
                self.sandbox.cpu_limit
            )));
        }

        Ok(())
    }
}
