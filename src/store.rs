//! The persistence contract for file-health records.
//!
//! Each operation is atomic with respect to other operations on the same
//! record; implementations serialize conflicting status transitions. The
//! engine is constructed against this trait so two engines with disjoint
//! stores can run in one process.

use crate::error::HealthPulseError;
use crate::record::FileHealthRecord;
use crate::status::HealthStatus;

pub trait HealthStore: Send + Sync {
    /// Fetch one record by path.
    fn get(&self, file_path: &str) -> Result<Option<FileHealthRecord>, HealthPulseError>;

    /// Insert a new Pending record, or flip an existing non-Pending record
    /// back to Pending without resetting its counters. Re-arms
    /// `scheduled_check_at` to now in both cases; a record already Pending
    /// is left untouched.
    fn upsert_pending(
        &self,
        file_path: &str,
        source_ref: Option<&str>,
    ) -> Result<(), HealthPulseError>;

    /// `Pending | Corrupted -> Checking`. Fails for any other current status
    /// (in particular Healthy and PermanentlyCorrupted) and for unknown
    /// paths.
    fn set_checking(&self, file_path: &str) -> Result<(), HealthPulseError>;

    /// General write path. `source_ref` and `scheduled_check_at` leave the
    /// stored value in place when `None`; `last_error` is always written
    /// (with `None` clearing it); `reset_counters` zeroes both retry
    /// counters.
    fn update(
        &self,
        file_path: &str,
        status: HealthStatus,
        last_error: Option<&str>,
        source_ref: Option<&str>,
        scheduled_check_at: Option<i64>,
        reset_counters: bool,
    ) -> Result<(), HealthPulseError>;

    /// Status to Healthy, both retry counters to zero, `last_error` cleared,
    /// `last_checked` to now, and the next routine check scheduled.
    fn mark_healthy(
        &self,
        file_path: &str,
        next_scheduled_at: i64,
    ) -> Result<(), HealthPulseError>;

    /// Record a failing check: status to Corrupted, `retry_count`
    /// incremented (clamped at `max_retries`), `last_checked` to now, and
    /// the next attempt scheduled with exponential backoff.
    fn increment_retry(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError>;

    /// Record a failing repair attempt: `repair_retry_count` incremented
    /// (clamped at `max_repair_retries`), `last_checked` to now, next
    /// attempt scheduled with backoff. The status is left untouched.
    fn increment_repair_retry(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError>;

    /// Status to RepairTriggered with the re-check scheduled after the
    /// repair-recheck delay.
    fn set_repair_triggered(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError>;

    /// Terminal transition. Only explicit operator cleanup removes a record
    /// from this state.
    fn mark_permanently_corrupted(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError>;

    /// Records due for a health check: status Pending or Corrupted with
    /// `scheduled_check_at <= now`, oldest schedule first, at most `limit`.
    fn fetch_due_for_check(
        &self,
        limit: usize,
    ) -> Result<Vec<FileHealthRecord>, HealthPulseError>;

    /// Records due for a repair attempt: status RepairTriggered with repair
    /// retries remaining and `scheduled_check_at <= now`.
    fn fetch_due_for_repair(
        &self,
        limit: usize,
    ) -> Result<Vec<FileHealthRecord>, HealthPulseError>;

    /// Startup reconciliation: every Checking record back to Pending. A
    /// Checking status is only meaningful while some process holds a live
    /// cancel handle for it, which cannot survive a restart.
    fn reset_all_checking(&self) -> Result<(), HealthPulseError>;
}
