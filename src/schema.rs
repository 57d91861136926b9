pub const CREATE_SCHEMA_SQL: &str = r#"
BEGIN TRANSACTION;

CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', '1');

-- One row per tracked file. All retry/escalation state is persisted here
-- so that crash recovery never depends on process memory.
CREATE TABLE IF NOT EXISTS file_health (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL UNIQUE,             -- Canonical path inside the virtual namespace
    status INTEGER NOT NULL DEFAULT 0,          -- HealthStatus code (0 = Pending, 1 = Checking, 2 = Healthy, 3 = Corrupted, 4 = RepairTriggered, 5 = PermanentlyCorrupted)

    -- External references
    source_ref TEXT,                            -- Origin descriptor used to re-derive the file (opaque)
    library_ref TEXT,                           -- Library-manager path; required to trigger repair
    release_date INTEGER,                       -- Release timestamp; created_at substitutes when NULL

    -- Retry State Group
    retry_count INTEGER NOT NULL DEFAULT 0,     -- Consecutive failing checks since last Healthy
    max_retries INTEGER NOT NULL,               -- Policy bound for retry_count
    repair_retry_count INTEGER NOT NULL DEFAULT 0,
    max_repair_retries INTEGER NOT NULL,        -- Policy bound for repair_retry_count

    -- Scheduling Group
    last_error TEXT,                            -- Most recent failure message
    last_checked INTEGER,                       -- When the last probe completed (UTC)
    scheduled_check_at INTEGER,                 -- When the record becomes due (UTC)
    created_at INTEGER NOT NULL                 -- Immutable insert timestamp (UTC)
);

-- The due queries filter on status and order by schedule
CREATE INDEX IF NOT EXISTS idx_file_health_due ON file_health (status, scheduled_check_at);

COMMIT;
"#;
