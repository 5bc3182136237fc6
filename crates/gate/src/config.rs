//! Gateway configuration.
//!
//! Loaded from a TOML file. Every field has a default except the two
//! collaborator URLs, which [`GateConfig::validate`] requires.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::verify::PolicyKind;

/// Default listen host.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default maximum captured request body, in bytes.
pub const DEFAULT_MAX_BODY_SIZE: usize = 4 * 1024 * 1024;
/// Default upstream call timeout.
pub const DEFAULT_UPSTREAM_TIMEOUT_MS: u64 = 30_000;
/// Default oracle call timeout.
pub const DEFAULT_ORACLE_TIMEOUT_MS: u64 = 10_000;
/// Default `Access-Control-Max-Age` for preflight responses.
pub const DEFAULT_PREFLIGHT_MAX_AGE: u64 = 86_400;

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML did not parse.
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range or inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// Upstream RPC node.
    pub upstream: UpstreamConfig,
    /// Authorization oracle.
    pub oracle: OracleConfig,
    /// CORS settings.
    pub cors: CorsConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Largest request body captured for gating and relay.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ServerConfig {
    /// `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream RPC node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// HTTP base URL, e.g. `http://127.0.0.1:26657`.
    pub http_url: String,
    /// WebSocket base URL. Derived from `http_url` when unset.
    pub ws_url: Option<String>,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self { http_url: String::new(), ws_url: None, timeout_ms: DEFAULT_UPSTREAM_TIMEOUT_MS }
    }
}

impl UpstreamConfig {
    /// Per-call timeout.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// WebSocket base URL: `ws_url`, or `http_url` with its scheme swapped.
    pub fn ws_base(&self) -> String {
        if let Some(ws) = &self.ws_url {
            return ws.clone();
        }
        if let Some(rest) = self.http_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.http_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.http_url.clone()
        }
    }
}

/// Authorization oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Endpoint receiving the verification POST.
    pub url: String,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// How oracle verdicts are read.
    pub policy: PolicyKind,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            timeout_ms: DEFAULT_ORACLE_TIMEOUT_MS,
            policy: PolicyKind::default(),
        }
    }
}

impl OracleConfig {
    /// Per-call timeout.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// CORS settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// `Access-Control-Max-Age` on preflight responses, in seconds.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { max_age_secs: DEFAULT_PREFLIGHT_MAX_AGE }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Trace every gating decision at debug level.
    pub debug: bool,
}

impl GateConfig {
    /// Parse and validate a TOML document.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if it is
    /// not valid TOML for [`GateConfig`] and [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::parse(&contents)
    }

    /// Check that the configuration can run a gateway.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.server.max_body_size == 0 {
            return Err(ConfigError::Invalid("server.max_body_size must be non-zero".into()));
        }
        check_url("upstream.http_url", &self.upstream.http_url, &["http", "https"])?;
        if let Some(ws) = &self.upstream.ws_url {
            check_url("upstream.ws_url", ws, &["ws", "wss"])?;
        }
        check_url("oracle.url", &self.oracle.url, &["http", "https"])?;
        Ok(())
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} is required")));
    }
    let url = reqwest::Url::parse(value)
        .map_err(|e| ConfigError::Invalid(format!("{field} is not a valid URL: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Invalid(format!(
            "{field} must use one of {schemes:?}, got {}",
            url.scheme()
        )));
    }
    Ok(())
}
