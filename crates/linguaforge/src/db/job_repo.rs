//! Job repository: CRUD operations for the `jobs` table.
//!
//! A job is identified by `(artifact_id, job_type)`.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::records::{JobRecord, JobStatusUpdate, NewJob, WorkStatus};
use super::DatabaseError;

/// Inserts a job or resets an existing one to the given status.
pub fn upsert(conn: &Connection, job: &NewJob, now: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO jobs (artifact_id, job_type, project_id, status, error_log, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)
         ON CONFLICT(artifact_id, job_type) DO UPDATE SET
            status = excluded.status,
            error_log = NULL",
        params![
            job.artifact_id.to_string(),
            job.job_type,
            job.project_id.to_string(),
            job.status,
            now,
        ],
    )?;
    Ok(())
}

/// Moves a job to a new status. A `None` error log clears the stored one
/// only when the job is re-queued.
pub fn update_status(conn: &Connection, update: &JobStatusUpdate) -> Result<JobRecord, DatabaseError> {
    let current = find(conn, update.artifact_id, &update.job_type)?.ok_or_else(|| {
        DatabaseError::NotFound {
            entity: "job",
            id: format!("{}/{}", update.artifact_id, update.job_type),
        }
    })?;

    if !current.status.can_transition_to(update.status) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "invalid status transition from {} to {} for job {}/{}",
            current.status, update.status, update.artifact_id, update.job_type
        )));
    }

    let error_log = match (&update.error_log, update.status) {
        (Some(log), _) => Some(log.clone()),
        (None, WorkStatus::Pending) => None,
        (None, _) => current.error_log,
    };

    conn.execute(
        "UPDATE jobs SET status = ?3, error_log = ?4 WHERE artifact_id = ?1 AND job_type = ?2",
        params![
            update.artifact_id.to_string(),
            update.job_type,
            update.status,
            error_log,
        ],
    )?;

    find(conn, update.artifact_id, &update.job_type)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "job",
        id: format!("{}/{}", update.artifact_id, update.job_type),
    })
}

/// Finds a job by its identity.
pub fn find(conn: &Connection, artifact_id: Uuid, job_type: &str) -> Result<Option<JobRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM jobs WHERE artifact_id = ?1 AND job_type = ?2",
            params![artifact_id.to_string(), job_type],
            JobRecord::from_row,
        )
        .optional()?;
    Ok(row)
}

/// Lists a project's jobs, oldest first.
pub fn list_for_project(conn: &Connection, project_id: Uuid) -> Result<Vec<JobRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM jobs WHERE project_id = ?1 ORDER BY created_at ASC, artifact_id ASC",
    )?;
    let rows = stmt
        .query_map(params![project_id.to_string()], JobRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, artifact_id: Uuid, job_type: &str) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM jobs WHERE artifact_id = ?1 AND job_type = ?2",
        params![artifact_id.to_string(), job_type],
    )?;
    Ok(changed > 0)
}
