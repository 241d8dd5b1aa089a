//! Database module for persistent storage.
//!
//! Uses rusqlite (SQLite) behind a single connection. All access is
//! serialized through an async mutex so a provisioning transaction can hold
//! the connection across `.await` points while files are copied.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio::sync::{Mutex, OwnedMutexGuard};

pub mod artifact_repo;
pub mod error;
pub mod file_repo;
pub mod job_repo;
pub mod migrations;
pub mod project_repo;
pub mod records;
pub mod store;

pub use error::DatabaseError;
pub use records::*;
pub use store::{DetachOutcome, ProjectStore};

/// Milliseconds a writer waits for a competing connection before failing.
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Database handle wrapping a single rusqlite connection.
///
/// Cloning is cheap (inner `Arc`). SQLite serializes writers anyway, so one
/// connection is enough for a single local process.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database at the given path and runs all
    /// pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DatabaseError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;

        migrations::run_all(&conn)?;

        log::info!("Database opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database for testing. Runs all migrations.
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        migrations::run_all(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Provides locked access to the underlying connection.
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// Runs `f` inside an immediate transaction. Any error rolls back.
    pub async fn with_transaction<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let conn = self.conn.lock().await;
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Opens a long-lived write transaction that owns the connection until
    /// it is committed or rolled back.
    pub async fn begin(&self) -> Result<StoreTransaction, DatabaseError> {
        let conn = self.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        log::debug!("Store transaction opened");
        Ok(StoreTransaction {
            conn,
            finished: false,
        })
    }
}

/// An open `BEGIN IMMEDIATE` transaction holding the connection lock.
///
/// Callers finish it with [`StoreTransaction::commit`] or
/// [`StoreTransaction::rollback`]. Dropping an unfinished transaction rolls
/// it back and logs a warning.
pub struct StoreTransaction {
    conn: OwnedMutexGuard<Connection>,
    finished: bool,
}

impl StoreTransaction {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn commit(mut self) -> Result<(), DatabaseError> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // A failed COMMIT can leave the transaction open.
            if !self.conn.is_autocommit() {
                if let Err(rollback_err) = self.conn.execute_batch("ROLLBACK") {
                    log::warn!("Rollback after failed commit also failed: {}", rollback_err);
                }
            }
            return Err(e.into());
        }
        log::debug!("Store transaction committed");
        Ok(())
    }

    pub fn rollback(mut self) -> Result<(), DatabaseError> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        log::debug!("Store transaction rolled back");
        Ok(())
    }
}

impl Drop for StoreTransaction {
    fn drop(&mut self) {
        if self.finished || self.conn.is_autocommit() {
            return;
        }
        log::warn!("Store transaction dropped without commit; rolling back");
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            log::error!("Failed to roll back abandoned transaction: {}", e);
        }
    }
}

/// Returns the canonical database path: `~/.linguaforge/linguaforge.db`.
pub fn default_database_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".linguaforge").join("linguaforge.db"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_projects(conn: &Connection) -> Result<u32, DatabaseError> {
        Ok(conn.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))?)
    }

    fn insert_project(conn: &Connection, id: &str) -> Result<(), DatabaseError> {
        conn.execute(
            "INSERT INTO projects (project_id, name, created_at, updated_at, owner_id)
             VALUES (?1, 'Test', '2026-01-01T00:00:00.000Z', '2026-01-01T00:00:00.000Z', 'owner')",
            [id],
        )?;
        Ok(())
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            let fk: u32 = conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?;
            assert_eq!(fk, 1);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_open_file_db() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
            assert_eq!(mode.to_lowercase(), "wal");
            Ok(())
        })
        .await
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_default_database_path() {
        let path = default_database_path().unwrap();
        assert!(path.ends_with("linguaforge.db"));
        assert!(path.to_string_lossy().contains(".linguaforge"));
    }

    #[tokio::test]
    async fn test_with_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), DatabaseError> = db
            .with_transaction(|conn| {
                insert_project(conn, "p1")?;
                Err(DatabaseError::ConstraintViolation("forced".into()))
            })
            .await;
        assert!(result.is_err());

        let count = db.with_conn(count_projects).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_store_transaction_commit_and_rollback() {
        let db = Database::open_in_memory().unwrap();

        let tx = db.begin().await.unwrap();
        insert_project(tx.conn(), "kept").unwrap();
        tx.commit().unwrap();

        let tx = db.begin().await.unwrap();
        insert_project(tx.conn(), "discarded").unwrap();
        tx.rollback().unwrap();

        assert_eq!(db.with_conn(count_projects).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        {
            let tx = db.begin().await.unwrap();
            insert_project(tx.conn(), "abandoned").unwrap();
        }
        assert_eq!(db.with_conn(count_projects).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_database_is_clone() {
        let db = Database::open_in_memory().unwrap();
        let db2 = db.clone();
        db.with_conn(|conn| insert_project(conn, "shared")).await.unwrap();
        assert_eq!(db2.with_conn(count_projects).await.unwrap(), 1);
    }
}
