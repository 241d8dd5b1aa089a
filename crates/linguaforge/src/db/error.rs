//! Database error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from database operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error from rusqlite.
    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// A uniqueness, foreign-key, check or trigger constraint rejected a write.
    #[error("{0}")]
    ConstraintViolation(String),

    /// IO error when creating directories or files.
    #[error("IO error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A migration failed to apply.
    #[error("Migration failed at version {version}: {reason}")]
    Migration { version: u32, reason: String },

    /// The requested row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match constraint_message(&err) {
            Some(message) => DatabaseError::ConstraintViolation(message),
            None => DatabaseError::Sqlite(err),
        }
    }
}

impl DatabaseError {
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DatabaseError::ConstraintViolation(_))
    }
}

/// Extracts a readable message from a SQLite constraint failure.
fn constraint_message(err: &rusqlite::Error) -> Option<String> {
    match err {
        rusqlite::Error::SqliteFailure(code, raw)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Some(describe_constraint(raw.as_deref().unwrap_or_default()))
        }
        _ => None,
    }
}

fn describe_constraint(raw: &str) -> String {
    let unique = raw.contains("UNIQUE constraint failed") || raw.contains("PRIMARY KEY");

    if unique && raw.contains("project_language_pairs") {
        return "duplicate language pair".to_string();
    }
    if unique && raw.contains("project_subjects") {
        return "duplicate subject".to_string();
    }
    if unique && raw.contains("file_language_pairs") {
        return "duplicate file language pair".to_string();
    }
    if raw.contains("owner_id") {
        return "owner is required".to_string();
    }
    if raw.contains("FOREIGN KEY constraint failed") {
        return "referenced record does not exist".to_string();
    }
    // Trigger RAISE messages are already written for humans.
    if !raw.contains("constraint failed") && !raw.is_empty() {
        return raw.to_string();
    }
    format!("constraint violation: {raw}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_unique_violations() {
        assert_eq!(
            describe_constraint(
                "UNIQUE constraint failed: project_language_pairs.project_id, project_language_pairs.source_lang, project_language_pairs.target_lang"
            ),
            "duplicate language pair"
        );
        assert_eq!(
            describe_constraint("UNIQUE constraint failed: project_subjects.project_id, project_subjects.subject"),
            "duplicate subject"
        );
    }

    #[test]
    fn test_describe_owner_and_foreign_key() {
        assert_eq!(
            describe_constraint("NOT NULL constraint failed: projects.owner_id"),
            "owner is required"
        );
        assert_eq!(
            describe_constraint("FOREIGN KEY constraint failed"),
            "referenced record does not exist"
        );
    }

    #[test]
    fn test_trigger_message_passes_through() {
        let msg = "file language pair must match existing project language pair";
        assert_eq!(describe_constraint(msg), msg);
    }

    #[test]
    fn test_unrecognized_constraint_keeps_raw_text() {
        assert_eq!(
            describe_constraint("CHECK constraint failed: status IN ('pending')"),
            "constraint violation: CHECK constraint failed: status IN ('pending')"
        );
    }
}
