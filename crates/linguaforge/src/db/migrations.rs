//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies pending
//! ones in order, each inside its own transaction.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_projects_tables",
        sql: include_str!("sql/001_create_projects.sql"),
    },
    Migration {
        version: 2,
        description: "create_file_tables",
        sql: include_str!("sql/002_create_files.sql"),
    },
    Migration {
        version: 3,
        description: "create_artifacts_and_jobs_tables",
        sql: include_str!("sql/003_create_artifacts_and_jobs.sql"),
    },
    Migration {
        version: 4,
        description: "create_integrity_triggers",
        sql: include_str!("sql/004_create_triggers.sql"),
    },
    Migration {
        version: 5,
        description: "add_project_folder_name",
        sql: include_str!("sql/005_add_project_folder.sql"),
    },
];

/// Highest schema version known to this build.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = current_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
        tx.commit()?;
    }

    Ok(())
}

/// Returns the highest applied migration version, or 0 on a fresh database.
pub fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'trigger') AND name = ?1",
            [name],
            |r| r.get::<_, u32>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_run_all_creates_schema() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        for table in [
            "projects",
            "project_subjects",
            "project_language_pairs",
            "file_info",
            "project_files",
            "file_language_pairs",
            "artifacts",
            "jobs",
            "trg_file_language_pairs_subset_insert",
            "trg_projects_touch_updated_at",
        ] {
            assert!(table_exists(&conn, table), "missing {table}");
        }
        assert_eq!(current_version(&conn).unwrap(), latest_version());
    }

    #[test]
    fn test_folder_names_are_unique_when_set() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        let insert = |id: &str, folder: Option<&str>| {
            conn.execute(
                "INSERT INTO projects (project_id, name, created_at, updated_at, owner_id, folder_name)
                 VALUES (?1, 'P', 'now', 'now', 'owner', ?2)",
                rusqlite::params![id, folder],
            )
        };
        insert("a", None).unwrap();
        insert("b", None).unwrap();
        insert("c", Some("acme")).unwrap();
        assert!(insert("d", Some("acme")).is_err());
    }

    #[test]
    fn test_run_all_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let count: u32 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as u32);
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }
}
