//! Database layer for groundwork.
//!
//! A thin SQLite handle the provisioner runs against before any service
//! connection pool exists. Bootstrap-owned state is limited to the versioned
//! capability registry and the annotations table; schema ownership for
//! everything else belongs entirely to the downstream service.

mod schema;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension};

use crate::errors::{GroundworkError, GroundworkResult};

/// Helper macro to convert rusqlite errors to GroundworkError.
macro_rules! db_err {
    ($result:expr) => {
        $result.map_err(|e| crate::errors::GroundworkError::Database(e.to_string()))
    };
}

pub(crate) use db_err;

/// SQLite database handle.
///
/// Thread-safe via `parking_lot::Mutex`. The provisioner holds this handle
/// with exclusive effective access; it exists before the service's own pool.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database.
    pub fn open(db_path: &Path) -> GroundworkResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = db_err!(Connection::open(db_path))?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database. Used by tests and throwaway runs.
    pub fn open_in_memory() -> GroundworkResult<Self> {
        let conn = db_err!(Connection::open_in_memory())?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> GroundworkResult<Self> {
        // Connection configuration:
        // - WAL mode: better concurrent read performance for the service
        // - FULL sync: fsync after each transaction
        // - Foreign keys: referential integrity for service-owned schema
        // - Busy timeout: tolerate a slow checkpoint during first start
        db_err!(conn.execute_batch(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=FULL;
            PRAGMA foreign_keys=ON;
            PRAGMA busy_timeout=100000;
            "
        ))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquire the database connection.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    fn init_schema(conn: &Connection) -> GroundworkResult<()> {
        for sql in schema::all_schemas() {
            db_err!(conn.execute_batch(sql))?;
        }

        let current_version: Option<i32> = db_err!(
            conn.query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
        )?;

        match current_version {
            None => {
                let now = Utc::now().to_rfc3339();
                db_err!(conn.execute(
                    "INSERT INTO schema_version (id, version, updated_at) VALUES (1, ?1, ?2)",
                    rusqlite::params![schema::SCHEMA_VERSION, now],
                ))?;
                tracing::info!(
                    "Initialized bootstrap schema version {}",
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) if v < schema::SCHEMA_VERSION => {
                tracing::warn!(
                    "Bootstrap schema version {} is older than current {}. Migrations not yet implemented.",
                    v,
                    schema::SCHEMA_VERSION
                );
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(GroundworkError::Database(format!(
                    "Bootstrap schema version {} is newer than supported {}. Please upgrade groundwork.",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(_) => {}
        }

        Ok(())
    }

    /// Registered version for a capability, if any.
    pub fn capability_version(&self, name: &str) -> GroundworkResult<Option<i64>> {
        let conn = self.conn();
        db_err!(
            conn.query_row(
                "SELECT version FROM capabilities WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()
        )
    }

    /// Record a capability in the registry. Upsert: the first install
    /// timestamp is preserved, the version and update timestamp move.
    pub fn record_capability(&self, name: &str, version: i64) -> GroundworkResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        db_err!(conn.execute(
            "INSERT INTO capabilities (name, version, installed_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 version = excluded.version,
                 updated_at = excluded.updated_at",
            rusqlite::params![name, version, now],
        ))?;
        Ok(())
    }

    /// All registered capabilities with their versions, sorted by name.
    pub fn installed_capabilities(&self) -> GroundworkResult<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = db_err!(
            conn.prepare("SELECT name, version FROM capabilities ORDER BY name")
        )?;
        let rows = db_err!(
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        )?;
        let mut out = Vec::new();
        for row in rows {
            out.push(db_err!(row)?);
        }
        Ok(out)
    }

    /// Record a descriptive annotation for a subject.
    ///
    /// Callers treat failures here as non-fatal; the error variant exists so
    /// they can log the reason.
    pub fn record_annotation(&self, subject: &str, note: &str) -> GroundworkResult<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO annotations (subject, note, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(subject) DO UPDATE SET note = excluded.note",
            rusqlite::params![subject, note, now],
        )
        .map_err(|e| GroundworkError::Annotation(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_db_open() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let _db = Database::open(&db_path).unwrap();
    }

    #[test]
    fn test_reopen_existing() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        {
            let db = Database::open(&db_path).unwrap();
            db.record_capability("uuid-generation", 1).unwrap();
        }
        let db = Database::open(&db_path).unwrap();
        assert_eq!(db.capability_version("uuid-generation").unwrap(), Some(1));
    }

    #[test]
    fn test_record_capability_upsert() {
        let db = Database::open_in_memory().unwrap();
        db.record_capability("vector-similarity", 1).unwrap();
        db.record_capability("vector-similarity", 2).unwrap();
        assert_eq!(db.capability_version("vector-similarity").unwrap(), Some(2));
        assert_eq!(
            db.installed_capabilities().unwrap(),
            vec![("vector-similarity".to_string(), 2)]
        );
    }

    #[test]
    fn test_newer_schema_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        {
            let db = Database::open(&db_path).unwrap();
            let conn = db.conn();
            conn.execute("UPDATE schema_version SET version = 999 WHERE id = 1", [])
                .unwrap();
        }
        let err = Database::open(&db_path).unwrap_err();
        assert!(matches!(err, GroundworkError::Database(_)));
    }

    #[test]
    fn test_annotation_upsert() {
        let db = Database::open_in_memory().unwrap();
        db.record_annotation("uuid-generation", "first note").unwrap();
        db.record_annotation("uuid-generation", "second note").unwrap();
        let conn = db.conn();
        let note: String = conn
            .query_row(
                "SELECT note FROM annotations WHERE subject = 'uuid-generation'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(note, "second note");
    }
}
