//! Configuration types for the recorder

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use hyper::Uri;
use serde::{Deserialize, Serialize};

use crate::{RecorderError, Result};

/// Port the recorder listens on unless told otherwise
pub const RECORDER_DEFAULT_PORT: u16 = 9999;

/// Input of the `record` command, validated before anything touches the
/// network or the filesystem
#[derive(Debug, Clone, Default)]
pub struct RecordCommand {
    /// Base URL of the real backend
    pub target: String,
    /// Optional subdirectory of the mock root to store artifacts in
    pub responses_path: Option<String>,
}

impl RecordCommand {
    /// Validate the command
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::Validation`] if the target is missing or not an
    /// absolute http(s) URL, or if the responses path escapes the mock root
    pub fn validate(&self) -> Result<()> {
        let target = self.target.trim();
        if target.is_empty() {
            return Err(RecorderError::Validation("target is required".to_string()));
        }

        let uri = target
            .parse::<Uri>()
            .map_err(|e| RecorderError::Validation(format!("invalid target '{target}': {e}")))?;
        match uri.scheme_str() {
            Some("http" | "https") => {}
            _ => {
                return Err(RecorderError::Validation(format!(
                    "target '{target}' must be an http:// or https:// URL"
                )))
            }
        }
        if uri.authority().is_none() {
            return Err(RecorderError::Validation(format!(
                "target '{target}' has no host"
            )));
        }
        if uri.query().is_some() {
            return Err(RecorderError::Validation(format!(
                "target '{target}' cannot carry a query string"
            )));
        }

        if let Some(path) = &self.responses_path {
            validate_responses_path(path)?;
        }

        Ok(())
    }

    /// Target base URL without a trailing slash, so `target + path` never
    /// doubles the separator
    #[must_use]
    pub fn normalized_target(&self) -> String {
        self.target.trim().trim_end_matches('/').to_string()
    }
}

/// Check that a responses path stays inside the mock root
fn validate_responses_path(path: &str) -> Result<()> {
    if path.contains('\0') {
        return Err(RecorderError::Validation(
            "responses path cannot contain null bytes".to_string(),
        ));
    }

    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(RecorderError::Validation(
                    "responses path cannot contain '..'".to_string(),
                ))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(RecorderError::Validation(format!(
                    "responses path must be relative: {path}"
                )))
            }
        }
    }

    Ok(())
}

/// Settings loaded from an optional TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Listener settings
    #[serde(default)]
    pub listen: ListenConfig,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Timeouts
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ListenConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Port to bind, 0 picks an ephemeral port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    RECORDER_DEFAULT_PORT
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum inbound request body in bytes
    pub max_request_size: usize,
    /// Maximum upstream response body in bytes
    pub max_response_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 256 * 1024 * 1024, // 256 MB
        }
    }
}

/// Timeouts, in milliseconds
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Bound on a single upstream request, headers and body included
    pub upstream_ms: u64,
    /// Bound on graceful shutdown of open connections
    pub shutdown_ms: u64,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            upstream_ms: 30_000,
            shutdown_ms: 5_000,
        }
    }
}

impl TimeoutsConfig {
    /// Upstream timeout as a duration
    #[must_use]
    pub fn upstream(&self) -> Duration {
        Duration::from_millis(self.upstream_ms)
    }

    /// Shutdown timeout as a duration
    #[must_use]
    pub fn shutdown(&self) -> Duration {
        Duration::from_millis(self.shutdown_ms)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human output
    #[default]
    Pretty,
    /// Single-line human output
    Compact,
    /// One JSON object per event
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level filter, e.g. `info` or `pmok=debug`
    #[serde(default)]
    pub level: Option<String>,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Settings {
    /// Load settings from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml_str(&content)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid settings
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)
            .map_err(|e| RecorderError::ConfigError(format!("Failed to parse config: {e}")))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    ///
    /// # Errors
    ///
    /// Returns error if a limit or timeout is zero
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_request_size == 0 {
            return Err(RecorderError::ConfigError(
                "max_request_size must be > 0".to_string(),
            ));
        }
        if self.limits.max_response_size == 0 {
            return Err(RecorderError::ConfigError(
                "max_response_size must be > 0".to_string(),
            ));
        }
        if self.timeouts.upstream_ms == 0 {
            return Err(RecorderError::ConfigError(
                "upstream_ms must be > 0".to_string(),
            ));
        }
        if self.timeouts.shutdown_ms == 0 {
            return Err(RecorderError::ConfigError(
                "shutdown_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runtime configuration, built once at start and handed to the server
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Target base URL, no trailing slash
    pub target: String,
    /// Directory artifacts are written to
    pub destination_dir: PathBuf,
    /// Listener settings
    pub listen: ListenConfig,
    /// Resource limits
    pub limits: LimitsConfig,
    /// Timeouts
    pub timeouts: TimeoutsConfig,
}

impl RecorderConfig {
    /// Resolve the runtime configuration from a command, the project's mock
    /// root and the loaded settings
    ///
    /// # Errors
    ///
    /// Returns error if the command or settings are invalid
    pub fn new(command: &RecordCommand, mock_root: &Path, settings: &Settings) -> Result<Self> {
        command.validate()?;
        settings.validate()?;

        let destination_dir = match command.responses_path.as_deref() {
            Some(sub) if !sub.is_empty() => mock_root.join(sub),
            _ => mock_root.to_path_buf(),
        };

        Ok(Self {
            target: command.normalized_target(),
            destination_dir,
            listen: settings.listen,
            limits: settings.limits,
            timeouts: settings.timeouts,
        })
    }

    /// Address the listener binds
    #[must_use]
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen.host, self.listen.port)
    }
}
