//! Project repository: `projects`, `project_subjects` and `project_language_pairs`.
//!
//! Functions take a plain `&Connection` so they run equally inside a
//! provisioning transaction or a one-off `with_transaction` call.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::records::{LanguagePair, NewProject, ProjectBundle, ProjectRecord, ProjectUpdate};
use super::{file_repo, job_repo, DatabaseError};

/// Inserts the project row only.
pub fn insert(
    conn: &Connection,
    project_id: Uuid,
    args: &NewProject,
    now: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO projects (project_id, name, created_at, updated_at, status, owner_id,
         client_id, project_type, notes, folder_name)
         VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            project_id.to_string(),
            args.name.trim(),
            now,
            args.status,
            args.owner_id.trim(),
            args.client_id,
            args.project_type.trim(),
            args.notes,
            args.folder_name.as_deref().map(str::trim),
        ],
    )?;
    Ok(())
}

pub fn insert_subjects(
    conn: &Connection,
    project_id: Uuid,
    subjects: &[String],
) -> Result<(), DatabaseError> {
    let mut stmt =
        conn.prepare("INSERT INTO project_subjects (project_id, subject) VALUES (?1, ?2)")?;
    for subject in subjects {
        stmt.execute(params![project_id.to_string(), subject.trim()])?;
    }
    Ok(())
}

pub fn insert_language_pairs(
    conn: &Connection,
    project_id: Uuid,
    pairs: &[LanguagePair],
) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO project_language_pairs (project_id, source_lang, target_lang)
         VALUES (?1, ?2, ?3)",
    )?;
    for pair in pairs {
        stmt.execute(params![
            project_id.to_string(),
            pair.source_lang.trim(),
            pair.target_lang.trim()
        ])?;
    }
    Ok(())
}

/// Replaces all subjects. Duplicates in `subjects` fail the unique constraint.
pub fn replace_subjects(
    conn: &Connection,
    project_id: Uuid,
    subjects: &[String],
) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM project_subjects WHERE project_id = ?1",
        params![project_id.to_string()],
    )?;
    insert_subjects(conn, project_id, subjects)
}

/// Replaces the pair set. Pairs that stay are left untouched so file pairs
/// referencing them survive; removed pairs cascade to file pairs.
pub fn replace_language_pairs(
    conn: &Connection,
    project_id: Uuid,
    pairs: &[LanguagePair],
) -> Result<(), DatabaseError> {
    let pairs = LanguagePair::normalize_all(pairs);
    let existing = list_language_pairs(conn, project_id)?;

    let mut delete = conn.prepare(
        "DELETE FROM project_language_pairs
         WHERE project_id = ?1 AND source_lang = ?2 AND target_lang = ?3",
    )?;
    for pair in existing.iter().filter(|p| !pairs.contains(p)) {
        delete.execute(params![
            project_id.to_string(),
            pair.source_lang,
            pair.target_lang
        ])?;
    }

    let added: Vec<LanguagePair> = pairs
        .iter()
        .filter(|p| !existing.contains(p))
        .cloned()
        .collect();
    insert_language_pairs(conn, project_id, &added)
}

pub fn find_by_id(conn: &Connection, project_id: Uuid) -> Result<Option<ProjectRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT * FROM projects WHERE project_id = ?1",
            params![project_id.to_string()],
            ProjectRecord::from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn exists(conn: &Connection, project_id: Uuid) -> Result<bool, DatabaseError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM projects WHERE project_id = ?1",
            params![project_id.to_string()],
            |r| r.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Lists projects, most recently updated first.
pub fn list(conn: &Connection) -> Result<Vec<ProjectRecord>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY updated_at DESC, name ASC")?;
    let rows = stmt
        .query_map([], ProjectRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn list_subjects(conn: &Connection, project_id: Uuid) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn
        .prepare("SELECT subject FROM project_subjects WHERE project_id = ?1 ORDER BY subject")?;
    let rows = stmt
        .query_map(params![project_id.to_string()], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(rows)
}

pub fn list_language_pairs(
    conn: &Connection,
    project_id: Uuid,
) -> Result<Vec<LanguagePair>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT source_lang, target_lang FROM project_language_pairs
         WHERE project_id = ?1 ORDER BY source_lang, target_lang",
    )?;
    let rows = stmt
        .query_map(params![project_id.to_string()], |r| {
            Ok(LanguagePair::new(
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Applies the scalar fields of `update`. Returns false when the project
/// does not exist. `updated_at` is refreshed by trigger.
pub fn update_fields(
    conn: &Connection,
    project_id: Uuid,
    update: &ProjectUpdate,
) -> Result<bool, DatabaseError> {
    let mut assignments = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref name) = update.name {
        assignments.push(format!("name = ?{}", param_values.len() + 1));
        param_values.push(Box::new(name.trim().to_string()));
    }
    if let Some(status) = update.status {
        assignments.push(format!("status = ?{}", param_values.len() + 1));
        param_values.push(Box::new(status));
    }
    if let Some(ref owner_id) = update.owner_id {
        assignments.push(format!("owner_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(owner_id.trim().to_string()));
    }
    if let Some(ref client_id) = update.client_id {
        assignments.push(format!("client_id = ?{}", param_values.len() + 1));
        param_values.push(Box::new(client_id.clone()));
    }
    if let Some(ref project_type) = update.project_type {
        assignments.push(format!("project_type = ?{}", param_values.len() + 1));
        param_values.push(Box::new(project_type.trim().to_string()));
    }
    if let Some(ref notes) = update.notes {
        assignments.push(format!("notes = ?{}", param_values.len() + 1));
        param_values.push(Box::new(notes.clone()));
    }

    // Child-only updates still count as a mutation of the project.
    if assignments.is_empty() {
        assignments.push("updated_at = updated_at".to_string());
    }

    param_values.push(Box::new(project_id.to_string()));
    let sql = format!(
        "UPDATE projects SET {} WHERE project_id = ?{}",
        assignments.join(", "),
        param_values.len()
    );

    let params_ref: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| p.as_ref()).collect();
    let changed = conn.execute(&sql, params_ref.as_slice())?;
    Ok(changed > 0)
}

/// Deletes the project row; children cascade. Shared `file_info` rows are
/// not touched here.
pub fn delete(conn: &Connection, project_id: Uuid) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "DELETE FROM projects WHERE project_id = ?1",
        params![project_id.to_string()],
    )?;
    Ok(changed > 0)
}

/// Reads the project with all child rows.
pub fn fetch_bundle(conn: &Connection, project_id: Uuid) -> Result<Option<ProjectBundle>, DatabaseError> {
    let Some(project) = find_by_id(conn, project_id)? else {
        return Ok(None);
    };

    let mut files = Vec::new();
    for link in file_repo::list_links(conn, project_id)? {
        if let Some(bundle) = file_repo::fetch_file_bundle(conn, project_id, link.file_id)? {
            files.push(bundle);
        }
    }

    Ok(Some(ProjectBundle {
        subjects: list_subjects(conn, project_id)?,
        language_pairs: list_language_pairs(conn, project_id)?,
        jobs: job_repo::list_for_project(conn, project_id)?,
        files,
        project,
    }))
}
