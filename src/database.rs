use crate::engine::PhaseLabel;
use crate::records::{
    storage_date, DailyRecord, DailyRecordStore, StoreError, StoreResult, STORAGE_DATE_FORMAT,
};
use chrono::{NaiveDate, Utc};
use rusqlite::Error::InvalidParameterName;
use rusqlite::{params, Connection, OptionalExtension, Result as SqliteResult};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

/// Log IO-related DB errors (disk full, permission denied).
/// Caller still returns Err.
fn log_io_error_if_any(context: &str, e: &rusqlite::Error) {
    use rusqlite::ffi::ErrorCode;
    if let rusqlite::Error::SqliteFailure(ffi_err, _) = e {
        match ffi_err.code {
            ErrorCode::DiskFull => {
                error!(
                    "[DB] {}: Disk full. Free space on drive or check app data directory.",
                    context
                );
            }
            ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                error!(
                    "[DB] {}: Permission denied or read-only. Check app data directory is writable.",
                    context
                );
            }
            ErrorCode::SystemIoFailure => {
                error!("[DB] {}: I/O error. Check disk and permissions.", context);
            }
            _ => {}
        }
    }
}

/// Run `body` inside `BEGIN IMMEDIATE` / `COMMIT`, rolling back on any error.
fn in_transaction<T>(
    conn: &Connection,
    context: &str,
    body: impl FnOnce(&Connection) -> SqliteResult<T>,
) -> SqliteResult<T> {
    conn.execute("BEGIN IMMEDIATE TRANSACTION", []).map_err(|e| {
        log_io_error_if_any(context, &e);
        error!("[DB] {}: failed to begin transaction: {}", context, e);
        e
    })?;

    match body(conn) {
        Ok(value) => {
            conn.execute("COMMIT", []).map_err(|e| {
                log_io_error_if_any(context, &e);
                error!("[DB] {}: failed to commit transaction: {}", context, e);
                let _ = conn.execute("ROLLBACK", []);
                e
            })?;
            Ok(value)
        }
        Err(e) => {
            log_io_error_if_any(context, &e);
            error!("[DB] {}: {}. Rolling back transaction.", context, e);
            let _ = conn.execute("ROLLBACK", []);
            Err(e)
        }
    }
}

const INSERT_EMPTY_DAY: &str = "INSERT OR IGNORE INTO daily_records
     (day, work_minutes, rest_minutes, tasks_completed, tasks_total, created_at, updated_at)
     VALUES (?1, 0, 0, 0, 0, ?2, ?2)";

/// SQLite-backed daily records plus the local key-value table (`app_meta`)
/// that holds the phase anchor, the checklist and user settings.
pub struct Database {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// PRODUCTION: handles a poisoned mutex (panic in another thread) as an error instead of unwrapping
    fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, rusqlite::Error> {
        self.conn.lock().map_err(|e| {
            InvalidParameterName(format!(
                "Database mutex poisoned: {}. A panic occurred while holding the lock. \
                 Please restart the application to recover.",
                e
            ))
        })
    }

    /// Same lock for the record store; a poisoned connection reports the store as unavailable
    fn store_conn(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            error!("[DB] Database mutex poisoned: {}", e);
            StoreError::Unavailable(format!("database mutex poisoned: {}", e))
        })
    }

    pub fn new(db_path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(db_path)?;

        // GUARD: detect corruption before touching the schema
        let integrity: String = conn
            .query_row("PRAGMA integrity_check", [], |r| r.get(0))
            .map_err(|e| InvalidParameterName(format!("Integrity check failed: {}", e)))?;
        if integrity.to_lowercase() != "ok" {
            return Err(InvalidParameterName(format!(
                "Database corruption detected: {}",
                integrity
            )));
        }

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| {
                warn!(
                    "[DB] Failed to enable WAL mode: {}. Continuing with default journal mode.",
                    e
                );
            })
            .ok();
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let _ = conn.pragma_update(None, "temp_store", "MEMORY");

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Current schema version (PRAGMA user_version). Bump when adding migrations.
    const SCHEMA_VERSION: i32 = 1;

    fn run_migrations(&self) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        let current: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;

        if current < 1 {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS daily_records (
                day TEXT PRIMARY KEY,
                work_minutes INTEGER NOT NULL DEFAULT 0,
                rest_minutes INTEGER NOT NULL DEFAULT 0,
                tasks_completed INTEGER NOT NULL DEFAULT 0,
                tasks_total INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS app_meta (key TEXT PRIMARY KEY, value TEXT)",
                [],
            )?;
            info!("[DB] Schema created (version {})", Self::SCHEMA_VERSION);
        }

        conn.pragma_update(None, "user_version", Self::SCHEMA_VERSION)?;
        Ok(())
    }

    /// Read a value from the local key-value table
    pub fn get_app_meta(&self, key: &str) -> SqliteResult<Option<String>> {
        let conn = self.lock_conn()?;
        conn.query_row(
            "SELECT value FROM app_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
    }

    pub fn set_app_meta(&self, key: &str, value: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO app_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )
        .map_err(|e| {
            log_io_error_if_any("set_app_meta", &e);
            e
        })?;
        Ok(())
    }

    pub fn delete_app_meta(&self, key: &str) -> SqliteResult<()> {
        let conn = self.lock_conn()?;
        conn.execute("DELETE FROM app_meta WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Delete `key` only while it still holds `value`. Returns whether a row was removed.
    pub fn delete_app_meta_if(&self, key: &str, value: &str) -> SqliteResult<bool> {
        let conn = self.lock_conn()?;
        let removed = conn.execute(
            "DELETE FROM app_meta WHERE key = ?1 AND value = ?2",
            params![key, value],
        )?;
        Ok(removed > 0)
    }
}

impl DailyRecordStore for Database {
    fn ensure_record_file(&self) -> StoreResult<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn ensure_day_exists(&self, day: NaiveDate) -> StoreResult<bool> {
        let conn = self.store_conn()?;
        let inserted = conn.execute(
            INSERT_EMPTY_DAY,
            params![storage_date(day), Utc::now().timestamp()],
        )?;
        if inserted > 0 {
            info!("[DB] Created record for {}", storage_date(day));
        }
        Ok(inserted == 0)
    }

    fn add_day(&self, day: NaiveDate) -> StoreResult<()> {
        self.ensure_day_exists(day)?;
        Ok(())
    }

    fn increment_time(&self, day: NaiveDate, label: PhaseLabel) -> StoreResult<()> {
        let update = match label {
            PhaseLabel::Work => {
                "UPDATE daily_records SET work_minutes = work_minutes + 1, updated_at = ?2 WHERE day = ?1"
            }
            PhaseLabel::Rest => {
                "UPDATE daily_records SET rest_minutes = rest_minutes + 1, updated_at = ?2 WHERE day = ?1"
            }
        };
        let day_str = storage_date(day);
        let now = Utc::now().timestamp();

        let conn = self.store_conn()?;
        in_transaction(&conn, "increment_time", |conn| {
            conn.execute(INSERT_EMPTY_DAY, params![day_str, now])?;
            conn.execute(update, params![day_str, now])
        })?;
        Ok(())
    }

    fn set_task_counts(&self, day: NaiveDate, completed: u32, total: u32) -> StoreResult<()> {
        let conn = self.store_conn()?;
        let now = Utc::now().timestamp();
        conn.execute(
            "INSERT INTO daily_records
                (day, work_minutes, rest_minutes, tasks_completed, tasks_total, created_at, updated_at)
             VALUES (?1, 0, 0, ?2, ?3, ?4, ?4)
             ON CONFLICT(day) DO UPDATE SET
                tasks_completed = ?2,
                tasks_total = ?3,
                updated_at = ?4",
            params![storage_date(day), completed, total, now],
        )
        .map_err(|e| {
            log_io_error_if_any("set_task_counts", &e);
            e
        })?;
        Ok(())
    }

    fn get_record(&self, day: NaiveDate) -> StoreResult<Option<DailyRecord>> {
        let conn = self.store_conn()?;
        let record = conn
            .query_row(
                "SELECT work_minutes, rest_minutes, tasks_completed, tasks_total
                 FROM daily_records WHERE day = ?1",
                params![storage_date(day)],
                |row| {
                    Ok(DailyRecord {
                        work_minutes: row.get(0)?,
                        rest_minutes: row.get(1)?,
                        tasks_completed: row.get(2)?,
                        tasks_total: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn get_all_records(&self) -> StoreResult<BTreeMap<NaiveDate, DailyRecord>> {
        let conn = self.store_conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, work_minutes, rest_minutes, tasks_completed, tasks_total
             FROM daily_records",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                DailyRecord {
                    work_minutes: row.get(1)?,
                    rest_minutes: row.get(2)?,
                    tasks_completed: row.get(3)?,
                    tasks_total: row.get(4)?,
                },
            ))
        })?;

        let mut records = BTreeMap::new();
        for row in rows {
            let (day_str, record) = row?;
            match NaiveDate::parse_from_str(&day_str, STORAGE_DATE_FORMAT) {
                Ok(day) => {
                    records.insert(day, record);
                }
                Err(e) => warn!("[DB] Skipping record with malformed day '{}': {}", day_str, e),
            }
        }
        Ok(records)
    }
}
