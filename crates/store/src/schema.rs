// SPDX-License-Identifier: MIT

//! Schema bootstrap, applied at every open.

pub(crate) const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tasks (
        id               TEXT PRIMARY KEY,
        operation        TEXT NOT NULL,
        zone_name        TEXT NOT NULL,
        priority         INTEGER NOT NULL,
        status           TEXT NOT NULL,
        metadata         TEXT NOT NULL,
        depends_on       TEXT,
        created_by       TEXT NOT NULL,
        attempt          INTEGER NOT NULL DEFAULT 0,
        progress_percent INTEGER,
        progress_info    TEXT,
        error            TEXT,
        result_message   TEXT,
        created_at       INTEGER NOT NULL,
        started_at       INTEGER,
        completed_at     INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks (status)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_depends_on ON tasks (depends_on)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_zone ON tasks (zone_name)",
    r#"
    CREATE TABLE IF NOT EXISTS storage_locations (
        id                 TEXT PRIMARY KEY,
        name               TEXT NOT NULL,
        path               TEXT NOT NULL UNIQUE,
        kind               TEXT NOT NULL,
        enabled            INTEGER NOT NULL DEFAULT 1,
        file_count         INTEGER NOT NULL DEFAULT 0,
        total_size         INTEGER NOT NULL DEFAULT 0,
        last_scan_at       INTEGER,
        scan_errors        INTEGER NOT NULL DEFAULT 0,
        last_error_message TEXT,
        created_at         INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS artifacts (
        id                  TEXT PRIMARY KEY,
        storage_location_id TEXT NOT NULL REFERENCES storage_locations (id),
        filename            TEXT NOT NULL,
        path                TEXT NOT NULL UNIQUE,
        size                INTEGER NOT NULL DEFAULT 0,
        file_type           TEXT NOT NULL,
        extension           TEXT,
        mime_type           TEXT,
        checksum            TEXT,
        checksum_algorithm  TEXT,
        checksum_verified   INTEGER,
        source_url          TEXT,
        discovered_at       INTEGER NOT NULL,
        last_verified       INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_artifacts_location ON artifacts (storage_location_id)",
    r#"
    CREATE TABLE IF NOT EXISTS log_sessions (
        session_id      TEXT PRIMARY KEY,
        cookie          TEXT NOT NULL,
        logname         TEXT NOT NULL,
        log_path        TEXT NOT NULL,
        follow_lines    INTEGER NOT NULL DEFAULT 100,
        grep_pattern    TEXT,
        status          TEXT NOT NULL,
        created_at      INTEGER NOT NULL,
        connected_at    INTEGER,
        disconnected_at INTEGER,
        lines_sent      INTEGER NOT NULL DEFAULT 0,
        error_message   TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_log_sessions_status ON log_sessions (status)",
];
