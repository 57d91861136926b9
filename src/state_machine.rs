//! The retry/repair escalation automaton.
//!
//! Applies probe outcomes to persisted counters and decides when a file
//! moves from health-check retries into the repair phase, and from repair
//! retries into the terminal PermanentlyCorrupted state. The record's
//! status is the phase discriminator: `RepairTriggered` routes failures to
//! the repair-retry path, everything else to the check-retry path.

use std::sync::Arc;

use log::{error, info, warn};

use crate::error::HealthPulseError;
use crate::probe::{ProbeOutcome, Rescanner};
use crate::record::FileHealthRecord;
use crate::schedule;
use crate::store::HealthStore;
use crate::utils::Utils;

pub struct HealthStateMachine {
    store: Arc<dyn HealthStore>,
    rescanner: Arc<dyn Rescanner>,
}

impl HealthStateMachine {
    pub fn new(store: Arc<dyn HealthStore>, rescanner: Arc<dyn Rescanner>) -> Self {
        Self { store, rescanner }
    }

    /// Apply a probe outcome to the file's persisted state.
    ///
    /// The escalation comparison is `count >= bound - 1` (evaluated with
    /// `saturating_sub`): a record with `max_retries = N` escalates on its
    /// Nth failure, and `max_retries <= 1` escalates on the first. Do not
    /// change this silently; the repair phase uses the same arithmetic.
    pub fn apply(
        &self,
        file_path: &str,
        outcome: &ProbeOutcome,
    ) -> Result<(), HealthPulseError> {
        let record = self.store.get(file_path)?.ok_or_else(|| {
            HealthPulseError::Error(format!("no health record for '{}'", file_path))
        })?;

        if record.status.is_terminal() {
            warn!(
                "Ignoring {} probe result for permanently corrupted file '{}'",
                outcome, file_path
            );
            return Ok(());
        }

        match outcome {
            ProbeOutcome::Healthy => {
                let next_check =
                    schedule::next_check_at(record.effective_release_date(), Utils::now_ts());
                self.store.mark_healthy(file_path, next_check)?;
                info!(
                    "File '{}' is healthy, next check at {}",
                    file_path,
                    Utils::format_ts(next_check)
                );
                Ok(())
            }
            ProbeOutcome::Corrupted(_) | ProbeOutcome::CheckFailed(_) => {
                let message = outcome
                    .failure_message()
                    .unwrap_or_else(|| "health check failed".to_string());

                if record.status.is_repair_phase() {
                    self.apply_repair_failure(&record, &message)
                } else {
                    self.apply_check_failure(&record, &message)
                }
            }
        }
    }

    fn apply_check_failure(
        &self,
        record: &FileHealthRecord,
        message: &str,
    ) -> Result<(), HealthPulseError> {
        if record.retry_count >= record.max_retries.saturating_sub(1) {
            info!(
                "Check retries exhausted for '{}' ({}/{}), escalating to repair",
                record.file_path, record.retry_count, record.max_retries
            );
            self.run_repair(&record.file_path)
        } else {
            warn!(
                "File '{}' failed its health check ({}): retry {}/{}",
                record.file_path,
                message,
                record.retry_count + 1,
                record.max_retries
            );
            self.store
                .increment_retry(&record.file_path, Some(message))
        }
    }

    fn apply_repair_failure(
        &self,
        record: &FileHealthRecord,
        message: &str,
    ) -> Result<(), HealthPulseError> {
        if record.repair_retry_count >= record.max_repair_retries.saturating_sub(1) {
            error!(
                "Repair retries exhausted for '{}', marking permanently corrupted",
                record.file_path
            );
            self.store
                .mark_permanently_corrupted(&record.file_path, Some(message))
        } else {
            warn!(
                "File '{}' still failing after repair ({}): repair retry {}/{}",
                record.file_path,
                message,
                record.repair_retry_count + 1,
                record.max_repair_retries
            );
            self.store
                .increment_repair_retry(&record.file_path, Some(message))
        }
    }

    /// Trigger a repair and absorb the retryable failure modes.
    ///
    /// A missing `library_ref` schedules another attempt by bumping the
    /// repair-retry counter (an operator library sync can populate the ref
    /// in the meantime). A rescanner refusal has already driven the record
    /// terminal inside [`trigger_repair`], so it only gets logged here.
    /// Store failures propagate.
    pub fn run_repair(&self, file_path: &str) -> Result<(), HealthPulseError> {
        match self.trigger_repair(file_path) {
            Ok(()) => Ok(()),
            Err(err @ HealthPulseError::RepairPreconditionMissing(_)) => {
                warn!(
                    "Repair trigger failed for '{}', will retry later: {}",
                    file_path, err
                );
                self.store
                    .increment_repair_retry(file_path, Some(&err.to_string()))
            }
            Err(err @ HealthPulseError::Rescan(_)) => {
                error!("Rescan refused for '{}': {}", file_path, err);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// The raw repair procedure: look up the library reference, ask the
    /// library manager to re-fetch the file, and persist the result.
    ///
    /// Fails with [`HealthPulseError::RepairPreconditionMissing`] (record
    /// untouched) when no library reference has been synced, and with
    /// [`HealthPulseError::Rescan`] (record marked permanently
    /// corrupted, since the manager was reachable but refused) when the rescan call errors.
    pub fn trigger_repair(&self, file_path: &str) -> Result<(), HealthPulseError> {
        let record = self.store.get(file_path)?.ok_or_else(|| {
            HealthPulseError::Error(format!("no health record for '{}'", file_path))
        })?;

        let library_ref = match record.library_ref() {
            Some(library_ref) => library_ref.to_string(),
            None => {
                return Err(HealthPulseError::RepairPreconditionMissing(
                    file_path.to_string(),
                ))
            }
        };

        info!(
            "Requesting rescan of '{}' for file '{}'",
            library_ref, file_path
        );

        match self.rescanner.rescan(&library_ref) {
            Ok(()) => {
                self.store.set_repair_triggered(file_path, None)?;
                info!("Repair triggered for '{}'", file_path);
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                self.store
                    .mark_permanently_corrupted(file_path, Some(&message))?;
                Err(HealthPulseError::Rescan(message))
            }
        }
    }
}
