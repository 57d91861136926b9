use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::status::HealthStatus;

/// The authoritative per-file health entity.
///
/// One row per `file_path`. Mutated exclusively by the state machine and by
/// the orchestrator's mark-checking step; all retry/escalation state lives
/// here so crash recovery never depends on process memory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileHealthRecord {
    pub id: i64,
    pub file_path: String,
    pub status: HealthStatus,
    /// Reference to the origin descriptor used to re-derive the file. Opaque
    /// to the engine; passed through on updates.
    pub source_ref: Option<String>,
    /// External library-manager path. Required to trigger repair.
    pub library_ref: Option<String>,
    /// Release timestamp used by the check scheduler; `created_at`
    /// substitutes when absent.
    pub release_date: Option<i64>,
    pub retry_count: i64,
    pub max_retries: i64,
    pub repair_retry_count: i64,
    pub max_repair_retries: i64,
    pub last_error: Option<String>,
    pub last_checked: Option<i64>,
    pub scheduled_check_at: Option<i64>,
    pub created_at: i64,
}

/// Column list matching `FileHealthRecord::from_row`. Keep the two in sync.
pub const RECORD_COLUMNS: &str = "id, file_path, status, source_ref, library_ref, release_date, \
     retry_count, max_retries, repair_retry_count, max_repair_retries, \
     last_error, last_checked, scheduled_check_at, created_at";

impl FileHealthRecord {
    pub fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(FileHealthRecord {
            id: row.get(0)?,
            file_path: row.get(1)?,
            status: HealthStatus::from_i64(row.get(2)?),
            source_ref: row.get(3)?,
            library_ref: row.get(4)?,
            release_date: row.get(5)?,
            retry_count: row.get(6)?,
            max_retries: row.get(7)?,
            repair_retry_count: row.get(8)?,
            max_repair_retries: row.get(9)?,
            last_error: row.get(10)?,
            last_checked: row.get(11)?,
            scheduled_check_at: row.get(12)?,
            created_at: row.get(13)?,
        })
    }

    /// Release date with the `created_at` fallback applied.
    pub fn effective_release_date(&self) -> i64 {
        self.release_date.unwrap_or(self.created_at)
    }

    /// A non-empty library reference, if one has been synced.
    pub fn library_ref(&self) -> Option<&str> {
        self.library_ref.as_deref().filter(|r| !r.is_empty())
    }
}
