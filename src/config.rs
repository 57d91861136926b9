use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::HealthPulseError;

// =============================================================================
// Constants
// =============================================================================

/// Default cycle period
pub const DEFAULT_CHECK_INTERVAL_SECONDS: i64 = 5;

/// Default in-cycle parallelism
pub const DEFAULT_MAX_CONCURRENT_JOBS: i64 = 4;

/// Default delay before re-checking a file after repair was triggered
pub const DEFAULT_REPAIR_RECHECK_DELAY_SECONDS: i64 = 3600;

/// Default exponential-backoff base for failed checks
pub const DEFAULT_RETRY_BACKOFF_BASE_SECONDS: i64 = 60;

/// Default exponential-backoff cap for failed checks
pub const DEFAULT_RETRY_BACKOFF_CAP_SECONDS: i64 = 3600;

/// Default per-record check-retry bound, applied on insert
pub const DEFAULT_MAX_RETRIES: i64 = 3;

/// Default per-record repair-retry bound, applied on insert
pub const DEFAULT_MAX_REPAIR_RETRIES: i64 = 2;

/// Hard deadline for operator-requested background checks
pub const MANUAL_CHECK_TIMEOUT_SECONDS: u64 = 600;

// =============================================================================
// Configuration
// =============================================================================

/// Engine configuration.
///
/// Loaded from an optional TOML file with `HEALTHPULSE_`-prefixed environment
/// variables layered on top. Non-positive durations fall back to their
/// defaults at read time rather than failing the load, so a hand-edited
/// config can't wedge the worker.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_seconds: i64,
    pub max_concurrent_jobs: i64,
    pub repair_recheck_delay_seconds: i64,
    pub retry_backoff_base_seconds: i64,
    pub retry_backoff_cap_seconds: i64,
    pub max_retries: i64,
    pub max_repair_retries: i64,
    /// Directory for the default sqlite store; home directory when unset.
    pub database_dir: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        HealthConfig {
            check_interval_seconds: DEFAULT_CHECK_INTERVAL_SECONDS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            repair_recheck_delay_seconds: DEFAULT_REPAIR_RECHECK_DELAY_SECONDS,
            retry_backoff_base_seconds: DEFAULT_RETRY_BACKOFF_BASE_SECONDS,
            retry_backoff_cap_seconds: DEFAULT_RETRY_BACKOFF_CAP_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            max_repair_retries: DEFAULT_MAX_REPAIR_RETRIES,
            database_dir: None,
        }
    }
}

impl HealthConfig {
    /// Load configuration: defaults, then the TOML file (if any), then
    /// `HEALTHPULSE_*` environment variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self, HealthPulseError> {
        let mut figment = Figment::from(Serialized::defaults(HealthConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("HEALTHPULSE_"))
            .extract()
            .map_err(|e| HealthPulseError::ConfigError(e.to_string()))
    }

    /// Cycle period with the non-positive fallback applied.
    pub fn check_interval(&self) -> Duration {
        let seconds = if self.check_interval_seconds <= 0 {
            DEFAULT_CHECK_INTERVAL_SECONDS
        } else {
            self.check_interval_seconds
        };
        Duration::from_secs(seconds as u64)
    }

    /// In-cycle parallelism with the non-positive fallback applied.
    pub fn max_concurrent(&self) -> usize {
        if self.max_concurrent_jobs <= 0 {
            DEFAULT_MAX_CONCURRENT_JOBS as usize
        } else {
            self.max_concurrent_jobs as usize
        }
    }

    /// The store-facing policy slice of this configuration.
    pub fn policy(&self) -> HealthPolicy {
        HealthPolicy {
            max_retries: self.max_retries.max(0),
            max_repair_retries: self.max_repair_retries.max(0),
            retry_backoff_base_seconds: non_negative_or(
                self.retry_backoff_base_seconds,
                DEFAULT_RETRY_BACKOFF_BASE_SECONDS,
            ),
            retry_backoff_cap_seconds: non_negative_or(
                self.retry_backoff_cap_seconds,
                DEFAULT_RETRY_BACKOFF_CAP_SECONDS,
            ),
            repair_recheck_delay_seconds: non_negative_or(
                self.repair_recheck_delay_seconds,
                DEFAULT_REPAIR_RECHECK_DELAY_SECONDS,
            ),
        }
    }
}

fn non_negative_or(value: i64, fallback: i64) -> i64 {
    if value < 0 {
        fallback
    } else {
        value
    }
}

/// Retry/backoff policy handed to the store. Counter bounds initialize new
/// records; the delays drive `scheduled_check_at` updates.
#[derive(Clone, Copy, Debug)]
pub struct HealthPolicy {
    pub max_retries: i64,
    pub max_repair_retries: i64,
    pub retry_backoff_base_seconds: i64,
    pub retry_backoff_cap_seconds: i64,
    pub repair_recheck_delay_seconds: i64,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        HealthConfig::default().policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HealthConfig::default();
        assert_eq!(config.check_interval(), Duration::from_secs(5));
        assert_eq!(config.max_concurrent(), 4);
        assert_eq!(config.policy().max_retries, 3);
        assert_eq!(config.policy().max_repair_retries, 2);
        assert_eq!(config.policy().repair_recheck_delay_seconds, 3600);
    }

    #[test]
    fn test_non_positive_values_fall_back() {
        let config = HealthConfig {
            check_interval_seconds: 0,
            max_concurrent_jobs: -2,
            ..HealthConfig::default()
        };
        assert_eq!(config.check_interval(), Duration::from_secs(5));
        assert_eq!(config.max_concurrent(), 4);
    }

    #[test]
    fn test_zero_backoff_base_is_honoured() {
        // Zero delays are legal (checks become due immediately); only
        // negative values fall back.
        let config = HealthConfig {
            retry_backoff_base_seconds: 0,
            repair_recheck_delay_seconds: 0,
            ..HealthConfig::default()
        };
        assert_eq!(config.policy().retry_backoff_base_seconds, 0);
        assert_eq!(config.policy().repair_recheck_delay_seconds, 0);

        let config = HealthConfig {
            retry_backoff_base_seconds: -1,
            ..HealthConfig::default()
        };
        assert_eq!(config.policy().retry_backoff_base_seconds, 60);
    }

    #[test]
    fn test_load_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("healthpulse.toml");
        std::fs::write(
            &path,
            "check_interval_seconds = 30\nmax_concurrent_jobs = 8\n",
        )
        .unwrap();

        let config = HealthConfig::load(Some(&path)).unwrap();
        assert_eq!(config.check_interval_seconds, 30);
        assert_eq!(config.max_concurrent_jobs, 8);
        // Unspecified values keep their defaults
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_load_without_file() {
        let config = HealthConfig::load(None).unwrap();
        assert_eq!(config.check_interval_seconds, 5);
    }
}
