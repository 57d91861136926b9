use thiserror::Error;

/// Errors surfaced by the health engine.
///
/// Per-file probe and repair failures are persisted into the corresponding
/// health record rather than propagated; the variants here cover the
/// caller-visible failures and the engine's internal plumbing.
#[derive(Error, Debug)]
pub enum HealthPulseError {
    #[error("{0}")]
    Error(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("health worker is already running")]
    AlreadyRunning,

    #[error("health worker is not running")]
    NotRunning,

    #[error("a health check is already active for '{0}'")]
    AlreadyActive(String),

    #[error("no active health check found for '{0}'")]
    NoActiveCheck(String),

    #[error("health check was interrupted")]
    Interrupted,

    #[error("health check timed out")]
    Timeout,

    #[error("no library path recorded for '{0}'; run a library sync to populate it")]
    RepairPreconditionMissing(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("rescan request failed: {0}")]
    Rescan(String),
}
