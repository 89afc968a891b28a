//! Client configuration.
//!
//! Resolution order (later overrides earlier):
//! 1. Built-in defaults (`localhost:9000`)
//! 2. Config file: an explicit path, or `<config dir>/ushell/mcp.toml`
//! 3. Environment variables
//! 4. Command-line flags (applied by the caller through the `with_*` builders)
//!
//! # Configuration
//!
//! ```toml
//! host = "localhost"
//! port = 9000
//! connect_timeout_secs = 5
//! request_timeout_secs = 30
//! trailing_grace_ms = 20
//! malformed = "abort"   # or "skip"
//! ```
//!
//! # Environment Variables
//!
//! - `MCP_HOST` - server host
//! - `MCP_PORT` - server port
//! - `MCP_CONNECT_TIMEOUT_SECS` - connect timeout
//! - `MCP_REQUEST_TIMEOUT_SECS` - per-request deadline
//! - `USHELL_CONFIG_DIR` - directory holding `mcp.toml`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::session::MalformedPolicy;

/// Default server host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default server port.
pub const DEFAULT_PORT: u16 = 9000;

/// Default bound on establishing the socket.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default deadline for one request, matching the server's command timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for notifications the server sends after a tool's response.
pub const DEFAULT_TRAILING_GRACE: Duration = Duration::from_millis(20);

/// Environment variable overriding the host.
pub const ENV_HOST: &str = "MCP_HOST";
/// Environment variable overriding the port.
pub const ENV_PORT: &str = "MCP_PORT";
/// Environment variable overriding the connect timeout, in seconds.
pub const ENV_CONNECT_TIMEOUT: &str = "MCP_CONNECT_TIMEOUT_SECS";
/// Environment variable overriding the request timeout, in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "MCP_REQUEST_TIMEOUT_SECS";
/// Environment variable overriding the config directory.
pub const ENV_CONFIG_DIR: &str = "USHELL_CONFIG_DIR";

/// Config filename within the config directory.
const CONFIG_FILE: &str = "mcp.toml";

/// Application name for directory resolution.
const APP_NAME: &str = "ushell";

/// Effective settings for an [`McpClient`](crate::McpClient).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Bound on establishing the socket.
    pub connect_timeout: Duration,
    /// Deadline for each request, from send to terminal message.
    pub request_timeout: Duration,
    /// How long to collect notifications after a `call_tool` terminal.
    /// Zero only takes what is already buffered.
    pub trailing_grace: Duration,
    /// Handling of undecodable frames.
    pub malformed: MalformedPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            trailing_grace: DEFAULT_TRAILING_GRACE,
            malformed: MalformedPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Set the host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the trailing notification grace period.
    pub fn with_trailing_grace(mut self, grace: Duration) -> Self {
        self.trailing_grace = grace;
        self
    }

    /// Set the malformed frame policy.
    pub fn with_malformed_policy(mut self, policy: MalformedPolicy) -> Self {
        self.malformed = policy;
        self
    }

    /// `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Overlay the values set in a config file.
    pub fn apply_file(&mut self, file: &ConfigFile) {
        if let Some(host) = &file.host {
            self.host = host.clone();
        }
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = file.trailing_grace_ms {
            self.trailing_grace = Duration::from_millis(ms);
        }
        if let Some(policy) = file.malformed {
            self.malformed = policy;
        }
    }

    /// Overlay the process environment.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`, which maps variable names to values.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(ENV_PORT, &port, "not a port number"))?;
        }
        if let Some(secs) = lookup(ENV_CONNECT_TIMEOUT) {
            self.connect_timeout = parse_secs(ENV_CONNECT_TIMEOUT, &secs)?;
        }
        if let Some(secs) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout = parse_secs(ENV_REQUEST_TIMEOUT, &secs)?;
        }
        Ok(())
    }

    /// Reject settings a connection cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.is_empty() {
            return Err(ConfigError::invalid("host", "", "must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("port", 0, "must be non-zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::invalid("connect_timeout", 0, "must be non-zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout", 0, "must be non-zero"));
        }
        Ok(())
    }
}

fn parse_secs(key: &str, value: &str) -> ConfigResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::invalid(key, value, "expected whole seconds"))
}

/// On-disk config layer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Server host.
    pub host: Option<String>,
    /// Server port.
    pub port: Option<u16>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// Request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Trailing notification grace in milliseconds.
    pub trailing_grace_ms: Option<u64>,
    /// Malformed frame policy.
    pub malformed: Option<MalformedPolicy>,
}

impl ConfigFile {
    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(toml_str)?)
    }
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: ClientConfig,
    /// The config file that was loaded, if any.
    pub source: Option<PathBuf>,
}

/// Directory holding `mcp.toml`: `USHELL_CONFIG_DIR`, else the platform
/// config directory joined with `ushell`.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Path of the user config file, if a config directory can be determined.
pub fn user_config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join(CONFIG_FILE))
}

/// Load a config file from a specific path.
pub fn load_config_file(path: &Path) -> ConfigResult<ConfigFile> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    ConfigFile::from_toml(&contents)
}

/// Build the effective configuration from defaults, a config file and the
/// environment.
///
/// An `explicit` path must exist. Without one, the user config file is used
/// when present and silently skipped otherwise.
pub fn load_config(explicit: Option<&Path>) -> ConfigResult<LoadedConfig> {
    let mut config = ClientConfig::default();

    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => user_config_path().filter(|p| p.is_file()),
    };

    if let Some(path) = &source {
        let file = load_config_file(path)?;
        config.apply_file(&file);
        tracing::debug!(path = %path.display(), "loaded MCP client config");
    }

    config.apply_env()?;
    config.validate()?;

    Ok(LoadedConfig { config, source })
}
