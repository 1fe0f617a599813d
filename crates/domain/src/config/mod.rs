mod locks;
mod observability;
mod sessions;

pub use locks::*;
pub use observability::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub locks: LocksConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let sessions = &self.sessions;

        if sessions.request_timeout_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.request_timeout_secs".into(),
                message: "timeout must be greater than 0".into(),
            });
        }

        if sessions.request_timeout_secs > DESIGNER_TIMEOUT_SECS {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.request_timeout_secs".into(),
                message: format!(
                    "timeout {} exceeds the designer timeout {}",
                    sessions.request_timeout_secs, DESIGNER_TIMEOUT_SECS,
                ),
            });
        }

        if sessions.max_open_sessions == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.max_open_sessions".into(),
                message: "capacity must be greater than 0".into(),
            });
        }

        if sessions.max_requests_per_second == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.max_requests_per_second".into(),
                message: "request rate must be greater than 0".into(),
            });
        }

        if sessions.max_open_sessions > 0
            && sessions.effective_release_offset() >= sessions.max_open_sessions
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.release_offset".into(),
                message: format!(
                    "release offset {} must be smaller than max_open_sessions {}",
                    sessions.effective_release_offset(),
                    sessions.max_open_sessions,
                ),
            });
        }

        if !sessions.enabled {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "sessions.enabled".into(),
                message: "sessions are disabled; only designer sessions will be kept".into(),
            });
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "observability.sample_rate".into(),
                message: "sample rate must be within 0.0..=1.0".into(),
            });
        }

        errors
    }
}
