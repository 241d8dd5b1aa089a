//! File repository: shared `file_info` rows, per-project links and file
//! language pairs.
//!
//! `file_info` rows are reference counted by their links. Nothing here
//! deletes one while a `project_files` row still points at it.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::records::{
    FileInfoRecord, LanguagePair, NewFileInfo, NewProjectFile, ProjectFileBundle, ProjectFileLink,
};
use super::{artifact_repo, DatabaseError};

/// Inserts or refreshes a shared file record.
pub fn upsert_info(conn: &Connection, info: &NewFileInfo, now: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO file_info (file_id, ext, kind, size_bytes, segment_count, token_count,
         notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(file_id) DO UPDATE SET
            ext = excluded.ext,
            kind = excluded.kind,
            size_bytes = excluded.size_bytes,
            segment_count = COALESCE(excluded.segment_count, file_info.segment_count),
            token_count = COALESCE(excluded.token_count, file_info.token_count),
            notes = COALESCE(excluded.notes, file_info.notes)",
        params![
            info.file_id.to_string(),
            info.ext.trim().trim_start_matches('.').to_lowercase(),
            info.kind,
            info.size_bytes,
            info.segment_count,
            info.token_count,
            info.notes,
            now,
        ],
    )?;
    Ok(())
}

/// Inserts or refreshes the link between a project and a file.
pub fn upsert_link(
    conn: &Connection,
    project_id: Uuid,
    file_id: Uuid,
    link: &NewProjectFile,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO project_files (project_id, file_id, filename, stored_at, stored_on, role)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(project_id, file_id) DO UPDATE SET
            filename = excluded.filename,
            stored_at = excluded.stored_at,
            role = excluded.role",
        params![
            project_id.to_string(),
            file_id.to_string(),
            link.filename,
            link.stored_at,
            now,
            link.role,
        ],
    )?;
    Ok(())
}

/// Replaces a file's language pairs. Pairs outside the project's set are
/// rejected by trigger.
pub fn replace_language_pairs(
    conn: &Connection,
    project_id: Uuid,
    file_id: Uuid,
    pairs: &[LanguagePair],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM file_language_pairs WHERE project_id = ?1 AND file_id = ?2",
        params![project_id.to_string(), file_id.to_string()],
    )?;

    let mut stmt = conn.prepare(
        "INSERT INTO file_language_pairs (project_id, file_id, source_lang, target_lang)
         VALUES (?1, ?2, ?3, ?4)",
    )?;
    for pair in pairs {
        stmt.execute(params![
            project_id.to_string(),
            file_id.to_string(),
            pair.source_lang.trim(),
            pair.target_lang.trim()
        ])?;
    }
    Ok(())
}

pub fn find_info(conn: &Connection, file_id: Uuid) -> Result<Option<FileInfoRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM file_info WHERE file_id = ?1",
            params![file_id.to_string()],
            FileInfoRecord::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn find_link(
    conn: &Connection,
    project_id: Uuid,
    file_id: Uuid,
) -> Result<Option<ProjectFileLink>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM project_files WHERE project_id = ?1 AND file_id = ?2",
            params![project_id.to_string(), file_id.to_string()],
            ProjectFileLink::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_links(conn: &Connection, project_id: Uuid) -> Result<Vec<ProjectFileLink>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT * FROM project_files WHERE project_id = ?1 ORDER BY stored_on, filename",
    )?;
    let rows = stmt
        .query_map(params![project_id.to_string()], ProjectFileLink::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_language_pairs(
    conn: &Connection,
    project_id: Uuid,
    file_id: Uuid,
) -> Result<Vec<LanguagePair>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT source_lang, target_lang FROM file_language_pairs
         WHERE project_id = ?1 AND file_id = ?2 ORDER BY source_lang, target_lang",
    )?;
    let rows = stmt
        .query_map(params![project_id.to_string(), file_id.to_string()], |r| {
            Ok(LanguagePair::new(
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Number of projects linking to a file.
pub fn link_count(conn: &Connection, file_id: Uuid) -> Result<u32, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM project_files WHERE file_id = ?1",
        params![file_id.to_string()],
        |r| r.get(0),
    )?;
    Ok(count)
}

/// Removes one link. Artifacts, jobs and file pairs for the link cascade.
pub fn delete_link(conn: &Connection, project_id: Uuid, file_id: Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM project_files WHERE project_id = ?1 AND file_id = ?2",
        params![project_id.to_string(), file_id.to_string()],
    )?;
    Ok(changed > 0)
}

/// Deletes the `file_info` row when no link references it any more.
pub fn delete_info_if_unreferenced(conn: &Connection, file_id: Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM file_info
         WHERE file_id = ?1
           AND NOT EXISTS (SELECT 1 FROM project_files WHERE file_id = ?1)",
        params![file_id.to_string()],
    )?;
    if changed > 0 {
        log::debug!("Removed unreferenced file_info {}", file_id);
    }
    Ok(changed > 0)
}

pub fn fetch_file_bundle(
    conn: &Connection,
    project_id: Uuid,
    file_id: Uuid,
) -> Result<Option<ProjectFileBundle>, DatabaseError> {
    let Some(link) = find_link(conn, project_id, file_id)? else {
        return Ok(None);
    };
    let info = find_info(conn, file_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "file_info",
        id: file_id.to_string(),
    })?;

    Ok(Some(ProjectFileBundle {
        language_pairs: list_language_pairs(conn, project_id, file_id)?,
        artifacts: artifact_repo::list_for_file(conn, project_id, file_id)?,
        link,
        info,
    }))
}
