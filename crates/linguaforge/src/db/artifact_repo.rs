//! Artifact repository: conversion outputs and their status.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::records::{ArtifactRecord, ArtifactStatusUpdate, NewArtifact};
use super::DatabaseError;

/// Inserts an artifact or resets the mutable fields of an existing one.
pub fn upsert(conn: &Connection, artifact: &NewArtifact, now: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO artifacts (artifact_id, project_id, file_id, artifact_type, source_lang,
         target_lang, rel_path, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
         ON CONFLICT(artifact_id) DO UPDATE SET
            artifact_type = excluded.artifact_type,
            source_lang = excluded.source_lang,
            target_lang = excluded.target_lang,
            rel_path = excluded.rel_path,
            status = excluded.status",
        params![
            artifact.artifact_id.to_string(),
            artifact.project_id.to_string(),
            artifact.file_id.to_string(),
            artifact.artifact_type,
            artifact.source_lang,
            artifact.target_lang,
            artifact.rel_path,
            artifact.status,
            now,
        ],
    )?;
    Ok(())
}

/// Moves an artifact to a new status. Counts left as `None` keep their
/// stored values.
pub fn update_status(
    conn: &Connection,
    update: &ArtifactStatusUpdate,
) -> Result<ArtifactRecord, DatabaseError> {
    let current = find_by_id(conn, update.artifact_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "artifact",
        id: update.artifact_id.to_string(),
    })?;

    if !current.status.can_transition_to(update.status) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "invalid status transition from {} to {} for artifact {}",
            current.status, update.status, update.artifact_id
        )));
    }

    conn.execute(
        "UPDATE artifacts SET status = ?2,
            size_bytes = COALESCE(?3, size_bytes),
            segment_count = COALESCE(?4, segment_count),
            token_count = COALESCE(?5, token_count)
         WHERE artifact_id = ?1",
        params![
            update.artifact_id.to_string(),
            update.status,
            update.size_bytes,
            update.segment_count,
            update.token_count,
        ],
    )?;

    find_by_id(conn, update.artifact_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "artifact",
        id: update.artifact_id.to_string(),
    })
}

pub fn find_by_id(conn: &Connection, artifact_id: Uuid) -> Result<Option<ArtifactRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM artifacts WHERE artifact_id = ?1",
            params![artifact_id.to_string()],
            ArtifactRecord::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_for_file(
    conn: &Connection,
    project_id: Uuid,
    file_id: Uuid,
) -> Result<Vec<ArtifactRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM artifacts WHERE project_id = ?1 AND file_id = ?2
         ORDER BY source_lang, target_lang, created_at",
    )?;
    let rows = stmt
        .query_map(
            params![project_id.to_string(), file_id.to_string()],
            ArtifactRecord::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete(conn: &Connection, artifact_id: Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM artifacts WHERE artifact_id = ?1",
        params![artifact_id.to_string()],
    )?;
    Ok(changed > 0)
}
