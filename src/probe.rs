//! Contracts for the engine's external collaborators.
//!
//! The engine never touches file bytes or talks to the library manager
//! directly; it consumes content verification, re-fetch requests, and
//! change notification through these seams.

use crate::error::HealthPulseError;
use crate::registry::InterruptToken;

/// Result of probing one file's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Content verified successfully.
    Healthy,
    /// Content verification found damage; detail describes what failed.
    Corrupted(Option<String>),
    /// The check itself could not be performed (transient I/O trouble).
    CheckFailed(String),
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }

    /// Human-readable failure description for persisting into `last_error`.
    pub fn failure_message(&self) -> Option<String> {
        match self {
            ProbeOutcome::Healthy => None,
            ProbeOutcome::Corrupted(detail) => Some(
                detail
                    .clone()
                    .unwrap_or_else(|| "file content is corrupted".to_string()),
            ),
            ProbeOutcome::CheckFailed(err) => Some(format!("health check failed: {}", err)),
        }
    }
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Healthy => write!(f, "healthy"),
            ProbeOutcome::Corrupted(_) => write!(f, "corrupted"),
            ProbeOutcome::CheckFailed(_) => write!(f, "check_failed"),
        }
    }
}

/// Content verification. Implementations may sample a fraction of the
/// underlying storage; the engine is agnostic.
///
/// A probe can run for a long time and must observe `interrupt`
/// cooperatively, returning `Err(HealthPulseError::Interrupted)` when it
/// fires.
pub trait Prober: Send + Sync {
    fn probe(
        &self,
        file_path: &str,
        interrupt: &InterruptToken,
    ) -> Result<ProbeOutcome, HealthPulseError>;
}

/// The external library manager. A rescan asks it to re-fetch the file at
/// `library_ref`; idempotent from the engine's point of view.
pub trait Rescanner: Send + Sync {
    fn rescan(&self, library_ref: &str) -> Result<(), HealthPulseError>;
}

/// Change-notification sink (e.g. a virtual-filesystem cache). Best-effort:
/// errors are logged by the caller, never propagated.
pub trait Notifier: Send + Sync {
    fn notify(&self, file_path: &str, outcome: &ProbeOutcome) -> Result<(), HealthPulseError>;
}
