// crates/pipeline-config/src/lib.rs
// ============================================================================
// Crate: pipeline-config
// Description: Canonical `PipelineConfig` model, TOML loading, validation.
// Purpose: Ambient configuration stack for the Pipeline Execution Engine —
//          tenant-cache TTL, breaker defaults, worker-pool cap, stage
//          timeout/retry budget, and the approval-email feature gate.
// Dependencies: serde, toml, thiserror
// ============================================================================

//! ## Overview
//! [`PipelineConfig`] carries every recognized key from the engine's
//! external-interface contract. [`PipelineConfig::load`] reads a TOML file
//! (falling back to built-in defaults for any field the file omits) and
//! [`PipelineConfig::validate`] rejects structurally nonsensical values
//! before the engine starts — zero timeouts, zero worker caps, and the
//! like — rather than letting them surface later as a confusing runtime
//! hang.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while loading or validating a [`PipelineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file was not valid TOML, or did not match the expected shape.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that failed to parse.
        path: String,
        /// Underlying parse error.
        #[source]
        source: Box<toml::de::Error>,
    },
    /// A loaded config's values were structurally invalid.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Default tenant-route cache TTL, in seconds (`spec.md` §4.1: "5 minutes is
/// a reasonable default").
pub const DEFAULT_TENANT_CACHE_TTL_SECONDS: u64 = 300;
/// Default circuit-breaker failure threshold.
pub const DEFAULT_CIRCUIT_FAILURE_THRESHOLD: u32 = 5;
/// Default circuit-breaker reset timeout, in milliseconds.
pub const DEFAULT_CIRCUIT_RESET_MS: u64 = 30_000;
/// Default circuit-breaker half-open success threshold.
pub const DEFAULT_CIRCUIT_HALF_OPEN_SUCCESSES: u32 = 2;
/// Default worker-pool cap.
pub const DEFAULT_EXEC_MAX_WORKERS: usize = 16;
/// Default per-HTTP-call timeout, in milliseconds.
pub const DEFAULT_STAGE_TIMEOUT_MS: u64 = 60_000;
/// Default retry budget on 5xx responses.
pub const DEFAULT_STAGE_MAX_RETRIES: u32 = 3;

/// Recognized configuration keys (`spec.md` §6), with their documented
/// defaults.
///
/// # Invariants
/// - Every field has a sensible default; a missing/empty config file yields
///   `Self::default()`, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tenant-route cache TTL, in seconds.
    pub tenant_cache_ttl_seconds: u64,
    /// Circuit-breaker consecutive-failure threshold before tripping `Open`.
    pub circuit_failure_threshold: u32,
    /// Circuit-breaker reset timeout, in milliseconds.
    pub circuit_reset_ms: u64,
    /// Circuit-breaker consecutive `HalfOpen` successes required to close.
    pub circuit_half_open_successes: u32,
    /// Worker-pool cap for tier fan-out, capped at 16 regardless of this value.
    pub exec_max_workers: usize,
    /// Per-HTTP-call timeout, in milliseconds.
    pub stage_timeout_ms: u64,
    /// Retries on `>= 500` responses or transport errors.
    pub stage_max_retries: u32,
    /// Gates the Approval Bridge's fire-and-forget notification email.
    pub approval_email_enabled: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tenant_cache_ttl_seconds: DEFAULT_TENANT_CACHE_TTL_SECONDS,
            circuit_failure_threshold: DEFAULT_CIRCUIT_FAILURE_THRESHOLD,
            circuit_reset_ms: DEFAULT_CIRCUIT_RESET_MS,
            circuit_half_open_successes: DEFAULT_CIRCUIT_HALF_OPEN_SUCCESSES,
            exec_max_workers: DEFAULT_EXEC_MAX_WORKERS,
            stage_timeout_ms: DEFAULT_STAGE_TIMEOUT_MS,
            stage_max_retries: DEFAULT_STAGE_MAX_RETRIES,
            approval_email_enabled: true,
        }
    }
}

impl PipelineConfig {
    /// Loads a config from `path`, falling back to [`PipelineConfig::default`]
    /// for any key the file omits. A `None` path yields the default config.
    ///
    /// # Errors
    /// Returns [`ConfigError::Read`] if `path` is present but unreadable,
    /// [`ConfigError::Parse`] if its contents are not valid TOML, or
    /// [`ConfigError::Invalid`] if the parsed values fail [`Self::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        let config: Self = toml::from_str(&raw)
            .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source: Box::new(source) })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates that every field holds a usable value.
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] describing the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tenant_cache_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("tenant_cache_ttl_seconds must be greater than zero".to_owned()));
        }
        if self.circuit_failure_threshold == 0 {
            return Err(ConfigError::Invalid("circuit_failure_threshold must be greater than zero".to_owned()));
        }
        if self.circuit_half_open_successes == 0 {
            return Err(ConfigError::Invalid("circuit_half_open_successes must be greater than zero".to_owned()));
        }
        if self.exec_max_workers == 0 {
            return Err(ConfigError::Invalid("exec_max_workers must be greater than zero".to_owned()));
        }
        if self.stage_timeout_ms == 0 {
            return Err(ConfigError::Invalid("stage_timeout_ms must be greater than zero".to_owned()));
        }
        Ok(())
    }

    /// Worker-pool cap for tier fan-out, clamped to the hard ceiling of 16
    /// regardless of configured value (`spec.md` §4.8).
    #[must_use]
    pub fn effective_max_workers(&self) -> usize {
        self.exec_max_workers.min(16)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::ConfigError;
    use super::PipelineConfig;

    #[test]
    fn missing_path_yields_defaults() {
        let config = PipelineConfig::load(None).expect("default config");
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn partial_file_fills_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "stage_max_retries = 5").expect("write");
        let config = PipelineConfig::load(Some(file.path())).expect("load");
        assert_eq!(config.stage_max_retries, 5);
        assert_eq!(config.circuit_failure_threshold, super::DEFAULT_CIRCUIT_FAILURE_THRESHOLD);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "stage_timeout_ms = 0").expect("write");
        let result = PipelineConfig::load(Some(file.path()));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn worker_cap_is_clamped_to_sixteen() {
        let mut config = PipelineConfig::default();
        config.exec_max_workers = 64;
        assert_eq!(config.effective_max_workers(), 16);
    }
}
