use std::path::PathBuf;
use std::sync::Mutex;

use directories::BaseDirs;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use crate::config::HealthPolicy;
use crate::error::HealthPulseError;
use crate::record::{FileHealthRecord, RECORD_COLUMNS};
use crate::schedule;
use crate::schema::CREATE_SCHEMA_SQL;
use crate::status::HealthStatus;
use crate::store::HealthStore;
use crate::utils::Utils;

const DB_FILENAME: &str = "healthpulse.db";
const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Sqlite-backed implementation of the [`HealthStore`] contract.
///
/// Every operation runs as a single statement or a short immediate
/// transaction on the shared connection, which serializes conflicting status
/// transitions per record. The retry policy is injected at construction and
/// applied when inserting records and scheduling retries.
#[derive(Debug)]
pub struct SqliteHealthStore {
    conn: Mutex<Connection>,
    policy: HealthPolicy,
}

impl SqliteHealthStore {
    /// Open (creating if needed) the store at `db_dir/healthpulse.db`, with
    /// the home directory as the fallback location.
    pub fn open(db_dir: Option<PathBuf>, policy: HealthPolicy) -> Result<Self, HealthPulseError> {
        let mut db_path = db_dir
            .or_else(|| BaseDirs::new().map(|base| base.home_dir().to_path_buf()))
            .ok_or_else(|| {
                HealthPulseError::Error("Could not determine home directory".to_string())
            })?;

        if !db_path.is_dir() {
            return Err(HealthPulseError::Error(format!(
                "Database folder '{}' does not exist or is not a directory",
                db_path.display()
            )));
        }

        db_path.push(DB_FILENAME);

        info!("Opening health database: {}", db_path.display());
        let conn = Connection::open(&db_path).map_err(HealthPulseError::Database)?;

        let store = Self {
            conn: Mutex::new(conn),
            policy,
        };
        store.ensure_schema()?;

        Ok(store)
    }

    /// In-memory store, primarily for tests and embedding experiments.
    pub fn open_in_memory(policy: HealthPolicy) -> Result<Self, HealthPulseError> {
        let conn = Connection::open_in_memory().map_err(HealthPulseError::Database)?;
        let store = Self {
            conn: Mutex::new(conn),
            policy,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&self) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();

        let table_exists: bool = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='meta'",
                [],
                |row| row.get::<_, i32>(0),
            )
            .map(|count| count > 0)
            .unwrap_or(false);

        if !table_exists {
            info!("Health database is uninitialized - creating schema at version {CURRENT_SCHEMA_VERSION}");
            conn.execute_batch(CREATE_SCHEMA_SQL)?;
            info!("Health database successfully initialized");
            return Ok(());
        }

        let db_version_str: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let db_version_str = match db_version_str {
            Some(s) => s,
            None => return Err(HealthPulseError::Error("Schema version missing".to_string())),
        };

        let db_version: u32 = match db_version_str.parse() {
            Ok(num) => num,
            Err(_) => {
                return Err(HealthPulseError::Error(
                    "Schema version mismatch".to_string(),
                ))
            }
        };

        // No upgrades exist yet; anything other than the current version is
        // a database from the future.
        if db_version != CURRENT_SCHEMA_VERSION {
            return Err(HealthPulseError::Error(format!(
                "Unsupported schema version {db_version} (expected {CURRENT_SCHEMA_VERSION})"
            )));
        }

        Ok(())
    }

    /// Run `f` inside an immediate transaction on the shared connection.
    fn immediate_transaction<T, F>(&self, f: F) -> Result<T, HealthPulseError>
    where
        F: FnOnce(&Connection) -> Result<T, HealthPulseError>,
    {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn get_record(
        conn: &Connection,
        file_path: &str,
    ) -> Result<Option<FileHealthRecord>, HealthPulseError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM file_health WHERE file_path = ?");
        conn.query_row(&sql, [file_path], FileHealthRecord::from_row)
            .optional()
            .map_err(HealthPulseError::Database)
    }

    fn fetch_due(
        &self,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<FileHealthRecord>, HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM file_health \
             WHERE {where_clause} \
             ORDER BY scheduled_check_at ASC \
             LIMIT ?"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params, FileHealthRecord::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn require_updated(
        conn: &Connection,
        rows_updated: usize,
        file_path: &str,
        action: &str,
    ) -> Result<(), HealthPulseError> {
        if rows_updated > 0 {
            return Ok(());
        }
        match Self::get_record(conn, file_path)? {
            Some(record) => Err(HealthPulseError::Error(format!(
                "cannot {} '{}' from status {}",
                action, file_path, record.status
            ))),
            None => Err(HealthPulseError::Error(format!(
                "no health record for '{}'",
                file_path
            ))),
        }
    }

    // ========================================================================
    // Importer-sync surface (not part of the HealthStore contract)
    // ========================================================================

    /// Record the release timestamp the check scheduler keys off. Populated
    /// by the surrounding system's metadata sync.
    pub fn set_release_date(
        &self,
        file_path: &str,
        release_date: i64,
    ) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE file_health SET release_date = ?1 WHERE file_path = ?2",
            params![release_date, file_path],
        )?;
        Self::require_updated(&conn, rows, file_path, "set release date for")
    }

    /// Record the library-manager path needed to trigger repair. Populated
    /// by the surrounding system's library sync.
    pub fn set_library_ref(
        &self,
        file_path: &str,
        library_ref: &str,
    ) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE file_health SET library_ref = ?1 WHERE file_path = ?2",
            params![library_ref, file_path],
        )?;
        Self::require_updated(&conn, rows, file_path, "set library ref for")
    }
}

impl HealthStore for SqliteHealthStore {
    fn get(&self, file_path: &str) -> Result<Option<FileHealthRecord>, HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        Self::get_record(&conn, file_path)
    }

    fn upsert_pending(
        &self,
        file_path: &str,
        source_ref: Option<&str>,
    ) -> Result<(), HealthPulseError> {
        let policy = self.policy;
        self.immediate_transaction(|conn| {
            let now = Utils::now_ts();
            match Self::get_record(conn, file_path)? {
                None => {
                    conn.execute(
                        "INSERT INTO file_health \
                            (file_path, status, source_ref, max_retries, max_repair_retries, \
                             scheduled_check_at, created_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                        params![
                            file_path,
                            HealthStatus::Pending.as_i64(),
                            source_ref,
                            policy.max_retries,
                            policy.max_repair_retries,
                            now
                        ],
                    )?;
                    debug!("Added '{}' to the health watchlist", file_path);
                }
                Some(record) if record.status != HealthStatus::Pending => {
                    conn.execute(
                        "UPDATE file_health SET \
                            status = ?1, \
                            source_ref = COALESCE(?2, source_ref), \
                            scheduled_check_at = ?3 \
                         WHERE file_path = ?4",
                        params![
                            HealthStatus::Pending.as_i64(),
                            source_ref,
                            now,
                            file_path
                        ],
                    )?;
                    debug!("Reset '{}' to pending for a fresh check", file_path);
                }
                Some(_) => {
                    // Already pending; nothing to write
                }
            }
            Ok(())
        })
    }

    fn set_checking(&self, file_path: &str) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE file_health SET status = ?1 WHERE file_path = ?2 AND status IN (?3, ?4)",
            params![
                HealthStatus::Checking.as_i64(),
                file_path,
                HealthStatus::Pending.as_i64(),
                HealthStatus::Corrupted.as_i64()
            ],
        )?;
        Self::require_updated(&conn, rows, file_path, "start checking")
    }

    fn update(
        &self,
        file_path: &str,
        status: HealthStatus,
        last_error: Option<&str>,
        source_ref: Option<&str>,
        scheduled_check_at: Option<i64>,
        reset_counters: bool,
    ) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE file_health SET \
                status = ?1, \
                last_error = ?2, \
                source_ref = COALESCE(?3, source_ref), \
                scheduled_check_at = COALESCE(?4, scheduled_check_at), \
                retry_count = CASE WHEN ?5 THEN 0 ELSE retry_count END, \
                repair_retry_count = CASE WHEN ?5 THEN 0 ELSE repair_retry_count END \
             WHERE file_path = ?6",
            params![
                status.as_i64(),
                last_error,
                source_ref,
                scheduled_check_at,
                reset_counters,
                file_path
            ],
        )?;
        Self::require_updated(&conn, rows, file_path, "update")
    }

    fn mark_healthy(
        &self,
        file_path: &str,
        next_scheduled_at: i64,
    ) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        // PermanentlyCorrupted is terminal; a healthy probe of such a record
        // must not resurrect it.
        let rows = conn.execute(
            "UPDATE file_health SET \
                status = ?1, \
                retry_count = 0, \
                repair_retry_count = 0, \
                last_error = NULL, \
                last_checked = ?2, \
                scheduled_check_at = ?3 \
             WHERE file_path = ?4 AND status != ?5",
            params![
                HealthStatus::Healthy.as_i64(),
                Utils::now_ts(),
                next_scheduled_at,
                file_path,
                HealthStatus::PermanentlyCorrupted.as_i64()
            ],
        )?;
        Self::require_updated(&conn, rows, file_path, "mark healthy")
    }

    fn increment_retry(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError> {
        let policy = self.policy;
        self.immediate_transaction(|conn| {
            let record = Self::get_record(conn, file_path)?.ok_or_else(|| {
                HealthPulseError::Error(format!("no health record for '{}'", file_path))
            })?;

            // Counters may reach their bound, never exceed it
            let new_count = (record.retry_count + 1).min(record.max_retries);
            let now = Utils::now_ts();
            let backoff = schedule::retry_backoff(
                new_count,
                policy.retry_backoff_base_seconds,
                policy.retry_backoff_cap_seconds,
            );

            conn.execute(
                "UPDATE file_health SET \
                    status = ?1, \
                    retry_count = ?2, \
                    last_error = ?3, \
                    last_checked = ?4, \
                    scheduled_check_at = ?5 \
                 WHERE file_path = ?6",
                params![
                    HealthStatus::Corrupted.as_i64(),
                    new_count,
                    last_error,
                    now,
                    now + backoff,
                    file_path
                ],
            )?;
            Ok(())
        })
    }

    fn increment_repair_retry(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError> {
        let policy = self.policy;
        self.immediate_transaction(|conn| {
            let record = Self::get_record(conn, file_path)?.ok_or_else(|| {
                HealthPulseError::Error(format!("no health record for '{}'", file_path))
            })?;

            let new_count = (record.repair_retry_count + 1).min(record.max_repair_retries);
            let now = Utils::now_ts();
            let backoff = schedule::retry_backoff(
                new_count,
                policy.retry_backoff_base_seconds,
                policy.retry_backoff_cap_seconds,
            );

            // The status is the phase discriminator; a failed repair attempt
            // does not move the record between phases.
            conn.execute(
                "UPDATE file_health SET \
                    repair_retry_count = ?1, \
                    last_error = ?2, \
                    last_checked = ?3, \
                    scheduled_check_at = ?4 \
                 WHERE file_path = ?5",
                params![new_count, last_error, now, now + backoff, file_path],
            )?;
            Ok(())
        })
    }

    fn set_repair_triggered(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let now = Utils::now_ts();
        let rows = conn.execute(
            "UPDATE file_health SET \
                status = ?1, \
                last_error = ?2, \
                scheduled_check_at = ?3 \
             WHERE file_path = ?4",
            params![
                HealthStatus::RepairTriggered.as_i64(),
                last_error,
                now + self.policy.repair_recheck_delay_seconds,
                file_path
            ],
        )?;
        Self::require_updated(&conn, rows, file_path, "set repair triggered for")
    }

    fn mark_permanently_corrupted(
        &self,
        file_path: &str,
        last_error: Option<&str>,
    ) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE file_health SET \
                status = ?1, \
                last_error = ?2, \
                last_checked = ?3 \
             WHERE file_path = ?4",
            params![
                HealthStatus::PermanentlyCorrupted.as_i64(),
                last_error,
                Utils::now_ts(),
                file_path
            ],
        )?;
        Self::require_updated(&conn, rows, file_path, "mark permanently corrupted")
    }

    fn fetch_due_for_check(
        &self,
        limit: usize,
    ) -> Result<Vec<FileHealthRecord>, HealthPulseError> {
        let now = Utils::now_ts();
        self.fetch_due(
            "status IN (?1, ?2) AND scheduled_check_at IS NOT NULL AND scheduled_check_at <= ?3",
            &[
                &HealthStatus::Pending.as_i64(),
                &HealthStatus::Corrupted.as_i64(),
                &now,
                &(limit as i64),
            ],
        )
    }

    fn fetch_due_for_repair(
        &self,
        limit: usize,
    ) -> Result<Vec<FileHealthRecord>, HealthPulseError> {
        let now = Utils::now_ts();
        self.fetch_due(
            "status = ?1 AND repair_retry_count < max_repair_retries \
             AND scheduled_check_at IS NOT NULL AND scheduled_check_at <= ?2",
            &[
                &HealthStatus::RepairTriggered.as_i64(),
                &now,
                &(limit as i64),
            ],
        )
    }

    fn reset_all_checking(&self) -> Result<(), HealthPulseError> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE file_health SET status = ?1 WHERE status = ?2",
            params![
                HealthStatus::Pending.as_i64(),
                HealthStatus::Checking.as_i64()
            ],
        )?;
        if rows > 0 {
            info!("Reset {rows} record(s) stuck in Checking back to Pending");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> SqliteHealthStore {
        SqliteHealthStore::open_in_memory(HealthPolicy::default())
            .expect("in-memory store should open")
    }

    #[test]
    fn test_open_with_valid_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteHealthStore::open(
            Some(temp_dir.path().to_path_buf()),
            HealthPolicy::default(),
        );
        assert!(store.is_ok(), "Store creation should succeed with valid path");
    }

    #[test]
    fn test_open_with_invalid_path() {
        let store = SqliteHealthStore::open(
            Some("/nonexistent/path/that/does/not/exist".into()),
            HealthPolicy::default(),
        );
        match store.unwrap_err() {
            HealthPulseError::Error(msg) => {
                assert!(msg.contains("does not exist"));
            }
            other => panic!("Unexpected error type: {other:?}"),
        }
    }

    #[test]
    fn test_schema_created() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = SqliteHealthStore::open(
            Some(temp_dir.path().to_path_buf()),
            HealthPolicy::default(),
        )
        .expect("Store creation should succeed");

        let conn = store.conn.lock().unwrap();
        let version: String = conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .expect("Should be able to query schema version");
        assert_eq!(version, "1");

        let count: i32 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name='file_health'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1, "file_health table should exist");
    }

    #[test]
    fn test_upsert_creates_pending_record() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", Some("nzb:abc")).unwrap();

        let record = store.get("/m/x.mkv").unwrap().expect("record should exist");
        assert_eq!(record.status, HealthStatus::Pending);
        assert_eq!(record.source_ref.as_deref(), Some("nzb:abc"));
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.repair_retry_count, 0);
        assert_eq!(record.max_retries, 3);
        assert_eq!(record.max_repair_retries, 2);
        assert!(record.scheduled_check_at.is_some());
    }

    #[test]
    fn test_upsert_twice_is_idempotent() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", Some("nzb:abc")).unwrap();
        let first = store.get("/m/x.mkv").unwrap().unwrap();

        store.upsert_pending("/m/x.mkv", Some("nzb:abc")).unwrap();
        let second = store.get("/m/x.mkv").unwrap().unwrap();

        assert_eq!(second.status, HealthStatus::Pending);
        assert_eq!(second.retry_count, first.retry_count);
        assert_eq!(second.repair_retry_count, first.repair_retry_count);
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn test_upsert_resets_non_pending_without_clearing_counters() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();
        store.increment_retry("/m/x.mkv", Some("boom")).unwrap();

        store.upsert_pending("/m/x.mkv", None).unwrap();
        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::Pending);
        assert_eq!(record.retry_count, 1, "counters survive the reset");
    }

    #[test]
    fn test_set_checking_transitions() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();

        store.set_checking("/m/x.mkv").unwrap();
        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::Checking);
    }

    #[test]
    fn test_set_checking_rejects_healthy() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();
        store.mark_healthy("/m/x.mkv", Utils::now_ts() + 3600).unwrap();

        let err = store.set_checking("/m/x.mkv").unwrap_err();
        assert!(err.to_string().contains("Healthy"));
    }

    #[test]
    fn test_set_checking_rejects_unknown_path() {
        let store = test_store();
        let err = store.set_checking("/m/missing.mkv").unwrap_err();
        assert!(err.to_string().contains("no health record"));
    }

    #[test]
    fn test_mark_healthy_clears_state() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();
        store.increment_retry("/m/x.mkv", Some("bad segment")).unwrap();
        store.increment_repair_retry("/m/x.mkv", Some("still bad")).unwrap();

        let next = Utils::now_ts() + 3600;
        store.mark_healthy("/m/x.mkv", next).unwrap();

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::Healthy);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.repair_retry_count, 0);
        assert_eq!(record.last_error, None);
        assert_eq!(record.scheduled_check_at, Some(next));
        assert!(record.last_checked.is_some());
    }

    #[test]
    fn test_mark_healthy_refuses_terminal_record() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();
        store
            .mark_permanently_corrupted("/m/x.mkv", Some("gone"))
            .unwrap();

        let err = store.mark_healthy("/m/x.mkv", Utils::now_ts()).unwrap_err();
        assert!(err.to_string().contains("Permanently Corrupted"));

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::PermanentlyCorrupted);
    }

    #[test]
    fn test_increment_retry_sets_corrupted_and_backs_off() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();

        let before = Utils::now_ts();
        store.increment_retry("/m/x.mkv", Some("bad segment")).unwrap();

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::Corrupted);
        assert_eq!(record.retry_count, 1);
        assert_eq!(record.last_error.as_deref(), Some("bad segment"));
        // Default policy: base 60s, so retry 1 schedules 120s out
        let scheduled = record.scheduled_check_at.unwrap();
        assert!(scheduled >= before + 120 && scheduled <= before + 125);
    }

    #[test]
    fn test_increment_retry_clamps_at_max() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();
        for _ in 0..10 {
            store.increment_retry("/m/x.mkv", Some("still bad")).unwrap();
        }
        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.retry_count, record.max_retries);
    }

    #[test]
    fn test_increment_repair_retry_keeps_status() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();
        store.set_repair_triggered("/m/x.mkv", None).unwrap();

        store
            .increment_repair_retry("/m/x.mkv", Some("rescan failed"))
            .unwrap();

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::RepairTriggered);
        assert_eq!(record.repair_retry_count, 1);

        for _ in 0..10 {
            store
                .increment_repair_retry("/m/x.mkv", Some("rescan failed"))
                .unwrap();
        }
        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.repair_retry_count, record.max_repair_retries);
    }

    #[test]
    fn test_set_repair_triggered_schedules_recheck() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();

        let before = Utils::now_ts();
        store.set_repair_triggered("/m/x.mkv", None).unwrap();

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::RepairTriggered);
        assert_eq!(record.last_error, None);
        let scheduled = record.scheduled_check_at.unwrap();
        assert!(scheduled >= before + 3600 && scheduled <= before + 3605);
    }

    #[test]
    fn test_update_leaves_unspecified_fields() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", Some("nzb:abc")).unwrap();
        store.increment_retry("/m/x.mkv", Some("bad")).unwrap();

        store
            .update("/m/x.mkv", HealthStatus::Pending, None, None, None, false)
            .unwrap();

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::Pending);
        assert_eq!(record.source_ref.as_deref(), Some("nzb:abc"));
        assert_eq!(record.retry_count, 1, "counters preserved");
        assert_eq!(record.last_error, None, "last_error always written");
        assert!(record.scheduled_check_at.is_some(), "schedule untouched");
    }

    #[test]
    fn test_update_can_reset_counters() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();
        store.increment_retry("/m/x.mkv", Some("bad")).unwrap();

        store
            .update("/m/x.mkv", HealthStatus::Pending, None, None, None, true)
            .unwrap();

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.repair_retry_count, 0);
    }

    #[test]
    fn test_fetch_due_for_check_filters_and_orders() {
        let store = test_store();
        let now = Utils::now_ts();

        store.upsert_pending("/m/a.mkv", None).unwrap();
        store.upsert_pending("/m/b.mkv", None).unwrap();
        store.upsert_pending("/m/c.mkv", None).unwrap();
        store.upsert_pending("/m/future.mkv", None).unwrap();
        store.upsert_pending("/m/healthy.mkv", None).unwrap();

        // Stagger schedules: b older than a
        store
            .update("/m/a.mkv", HealthStatus::Pending, None, None, Some(now - 10), false)
            .unwrap();
        store
            .update("/m/b.mkv", HealthStatus::Corrupted, None, None, Some(now - 50), false)
            .unwrap();
        store
            .update("/m/c.mkv", HealthStatus::Pending, None, None, Some(now - 30), false)
            .unwrap();
        store
            .update("/m/future.mkv", HealthStatus::Pending, None, None, Some(now + 3600), false)
            .unwrap();
        store.mark_healthy("/m/healthy.mkv", now - 100).unwrap();

        let due = store.fetch_due_for_check(10).unwrap();
        let paths: Vec<&str> = due.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/m/b.mkv", "/m/c.mkv", "/m/a.mkv"]);

        // Limit is honoured
        let due = store.fetch_due_for_check(2).unwrap();
        assert_eq!(due.len(), 2);
    }

    #[test]
    fn test_fetch_due_for_repair_excludes_exhausted() {
        let store = test_store();
        let now = Utils::now_ts();

        store.upsert_pending("/m/a.mkv", None).unwrap();
        store.set_repair_triggered("/m/a.mkv", None).unwrap();
        store
            .update("/m/a.mkv", HealthStatus::RepairTriggered, None, None, Some(now - 5), false)
            .unwrap();

        store.upsert_pending("/m/b.mkv", None).unwrap();
        store.set_repair_triggered("/m/b.mkv", None).unwrap();
        for _ in 0..2 {
            store.increment_repair_retry("/m/b.mkv", Some("no luck")).unwrap();
        }
        store
            .update("/m/b.mkv", HealthStatus::RepairTriggered, None, None, Some(now - 5), false)
            .unwrap();

        let due = store.fetch_due_for_repair(10).unwrap();
        let paths: Vec<&str> = due.iter().map(|r| r.file_path.as_str()).collect();
        assert_eq!(paths, vec!["/m/a.mkv"], "exhausted repair retries drop out");
    }

    #[test]
    fn test_reset_all_checking() {
        let store = test_store();
        store.upsert_pending("/m/a.mkv", None).unwrap();
        store.upsert_pending("/m/b.mkv", None).unwrap();
        store.set_checking("/m/a.mkv").unwrap();
        store.set_checking("/m/b.mkv").unwrap();

        store.reset_all_checking().unwrap();

        for path in ["/m/a.mkv", "/m/b.mkv"] {
            let record = store.get(path).unwrap().unwrap();
            assert_eq!(record.status, HealthStatus::Pending);
        }

        // With nothing in Checking this is a no-op
        store.reset_all_checking().unwrap();
        let record = store.get("/m/a.mkv").unwrap().unwrap();
        assert_eq!(record.status, HealthStatus::Pending);
    }

    #[test]
    fn test_importer_sync_helpers() {
        let store = test_store();
        store.upsert_pending("/m/x.mkv", None).unwrap();

        store.set_release_date("/m/x.mkv", 1_700_000_000).unwrap();
        store.set_library_ref("/m/x.mkv", "/lib/x.mkv").unwrap();

        let record = store.get("/m/x.mkv").unwrap().unwrap();
        assert_eq!(record.release_date, Some(1_700_000_000));
        assert_eq!(record.library_ref.as_deref(), Some("/lib/x.mkv"));

        assert!(store.set_release_date("/m/missing.mkv", 0).is_err());
    }
}
