// SPDX-License-Identifier: MIT OR Apache-2.0
//! Startup configuration for the router daemon: socket paths, audit
//! storage, rate-limit defaults, and pipeline timeouts.
//!
//! Scoped to the request-processing engine only — plugin discovery,
//! manifest parsing, and credential-file storage are assembled
//! upstream and handed in as an already-built tool catalog.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Errors raised while loading or validating [`RouterConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file does not exist.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was requested.
        path: String,
    },
    /// The file was not valid TOML, or did not match the schema.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },
    /// One or more semantic checks failed.
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

/// Advisory-level issues that do not prevent startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// `handler_timeout_secs` is unusually large.
    LargeHandlerTimeout {
        /// The configured value.
        secs: u64,
    },
    /// `confirmation_timeout_secs` is unusually large.
    LargeConfirmationTimeout {
        /// The configured value.
        secs: u64,
    },
    /// `response_size_cap_bytes` is small enough to reject common
    /// legitimate tool results.
    SmallResponseSizeCap {
        /// The configured value.
        bytes: u64,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LargeHandlerTimeout { secs } => {
                write!(f, "handler_timeout_secs is unusually large ({secs}s)")
            }
            Self::LargeConfirmationTimeout { secs } => {
                write!(f, "confirmation_timeout_secs is unusually large ({secs}s)")
            }
            Self::SmallResponseSizeCap { bytes } => {
                write!(f, "response_size_cap_bytes is unusually small ({bytes} bytes)")
            }
        }
    }
}

/// Per-session rate-limit defaults applied to every new bucket.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RateLimitSettings {
    /// Steady-state refill rate.
    pub requests_per_minute: u32,
    /// Bucket capacity and starting balance.
    pub burst_size: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst_size: 10,
        }
    }
}

/// Top-level router daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RouterConfig {
    /// Local IPC endpoint the ROUTER socket binds (e.g.
    /// `ipc:///run/carapace/router.sock`).
    pub router_endpoint: String,
    /// Local IPC endpoint the PUB socket binds.
    pub event_bus_endpoint: String,
    /// Directory root for per-group audit log files. Created with
    /// mode 0700 if missing.
    pub audit_base_path: String,
    /// Per-session token-bucket defaults.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    /// Stage 5 confirmation deadline, in seconds.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Stage 6 handler execution deadline, in seconds.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,
    /// Maximum serialized handler-result size, in bytes, before
    /// stage 6 rejects it as `HANDLER_ERROR`.
    #[serde(default = "default_response_size_cap_bytes")]
    pub response_size_cap_bytes: u64,
}

const fn default_confirmation_timeout_secs() -> u64 {
    300
}

const fn default_handler_timeout_secs() -> u64 {
    30
}

const fn default_response_size_cap_bytes() -> u64 {
    1024 * 1024
}

const MAX_REASONABLE_TIMEOUT_SECS: u64 = 3_600;
const MIN_REASONABLE_RESPONSE_CAP_BYTES: u64 = 4_096;

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            router_endpoint: "ipc:///run/carapace/router.sock".to_string(),
            event_bus_endpoint: "ipc:///run/carapace/events.sock".to_string(),
            audit_base_path: "/var/lib/carapace/audit".to_string(),
            rate_limit: RateLimitSettings::default(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            handler_timeout_secs: default_handler_timeout_secs(),
            response_size_cap_bytes: default_response_size_cap_bytes(),
        }
    }
}

/// Load a [`RouterConfig`] from a TOML file.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] if `path` does not exist, or
/// [`ConfigError::ParseError`] if its contents are not valid TOML
/// matching [`RouterConfig`]'s shape.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.display().to_string(),
    })?;
    parse_toml(&content)
}

/// Parse a [`RouterConfig`] from a TOML string.
///
/// # Errors
///
/// Returns [`ConfigError::ParseError`] if `content` is not valid TOML
/// matching [`RouterConfig`]'s shape.
pub fn parse_toml(content: &str) -> Result<RouterConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

/// Validate semantic constraints on `config`, returning advisory
/// warnings for anything unusual.
///
/// # Errors
///
/// Returns [`ConfigError::ValidationError`] if any field is out of
/// range.
pub fn validate_config(config: &RouterConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.router_endpoint.trim().is_empty() {
        errors.push("router_endpoint must not be empty".to_string());
    }
    if config.event_bus_endpoint.trim().is_empty() {
        errors.push("event_bus_endpoint must not be empty".to_string());
    }
    if config.audit_base_path.trim().is_empty() {
        errors.push("audit_base_path must not be empty".to_string());
    }
    if config.rate_limit.burst_size == 0 {
        errors.push("rate_limit.burst_size must be at least 1".to_string());
    }
    if config.confirmation_timeout_secs == 0 {
        errors.push("confirmation_timeout_secs must be at least 1".to_string());
    } else if config.confirmation_timeout_secs > MAX_REASONABLE_TIMEOUT_SECS {
        warnings.push(ConfigWarning::LargeConfirmationTimeout {
            secs: config.confirmation_timeout_secs,
        });
    }
    if config.handler_timeout_secs == 0 {
        errors.push("handler_timeout_secs must be at least 1".to_string());
    } else if config.handler_timeout_secs > MAX_REASONABLE_TIMEOUT_SECS {
        warnings.push(ConfigWarning::LargeHandlerTimeout {
            secs: config.handler_timeout_secs,
        });
    }
    if config.response_size_cap_bytes < MIN_REASONABLE_RESPONSE_CAP_BYTES {
        warnings.push(ConfigWarning::SmallResponseSizeCap {
            bytes: config.response_size_cap_bytes,
        });
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_with_no_warnings() {
        let config = RouterConfig::default();
        assert_eq!(validate_config(&config).unwrap(), Vec::new());
    }

    #[test]
    fn parses_a_minimal_toml_document() {
        let toml = r#"
            router_endpoint = "ipc:///tmp/router.sock"
            event_bus_endpoint = "ipc:///tmp/events.sock"
            audit_base_path = "/tmp/audit"
        "#;
        let config = parse_toml(toml).unwrap();
        assert_eq!(config.handler_timeout_secs, 30);
        assert_eq!(config.confirmation_timeout_secs, 300);
        assert_eq!(config.rate_limit.burst_size, 10);
    }

    #[test]
    fn rejects_zero_burst_size() {
        let mut config = RouterConfig::default();
        config.rate_limit.burst_size = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn warns_on_unusually_large_handler_timeout() {
        let mut config = RouterConfig::default();
        config.handler_timeout_secs = 7_200;
        let warnings = validate_config(&config).unwrap();
        assert!(warnings.contains(&ConfigWarning::LargeHandlerTimeout { secs: 7_200 }));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/carapace.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn load_config_reads_from_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("carapace.toml");
        std::fs::write(
            &path,
            r#"
                router_endpoint = "ipc:///tmp/router.sock"
                event_bus_endpoint = "ipc:///tmp/events.sock"
                audit_base_path = "/tmp/audit"
            "#,
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.router_endpoint, "ipc:///tmp/router.sock");
    }
}
