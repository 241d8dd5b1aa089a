//! `ProjectStore`: the only mutator of project rows once a project exists.
//!
//! Every async method runs in its own immediate transaction. The
//! `StoreTransaction` methods run against an already open provisioning
//! transaction and never commit on their own.

use std::collections::HashSet;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::records::{
    now_timestamp, ArtifactRecord, ArtifactStatusUpdate, JobRecord, JobStatusUpdate, LanguagePair,
    NewArtifact, NewFileInfo, NewJob, NewProject, NewProjectFile, ProjectBundle, ProjectFileBundle,
    ProjectRecord, ProjectUpdate,
};
use super::{artifact_repo, file_repo, job_repo, project_repo};
use super::{Database, DatabaseError, StoreTransaction};

/// Result of removing a file from a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachOutcome {
    pub link_removed: bool,
    /// True when this was the last link and the shared record was deleted.
    pub file_info_removed: bool,
}

#[derive(Clone)]
pub struct ProjectStore {
    db: Database,
}

impl ProjectStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Opens the provisioning transaction.
    pub async fn begin(&self) -> Result<StoreTransaction, DatabaseError> {
        self.db.begin().await
    }

    pub async fn create_project(&self, args: &NewProject) -> Result<ProjectBundle, DatabaseError> {
        self.db
            .with_transaction(|conn| create_project(conn, args))
            .await
    }

    pub async fn attach_file(
        &self,
        project_id: Uuid,
        info: &NewFileInfo,
        link: &NewProjectFile,
        language_pairs: &[LanguagePair],
    ) -> Result<ProjectFileBundle, DatabaseError> {
        self.db
            .with_transaction(|conn| attach_file(conn, project_id, info, link, language_pairs))
            .await
    }

    pub async fn detach_file(
        &self,
        project_id: Uuid,
        file_id: Uuid,
    ) -> Result<DetachOutcome, DatabaseError> {
        self.db
            .with_transaction(|conn| {
                let link_removed = file_repo::delete_link(conn, project_id, file_id)?;
                let file_info_removed = file_repo::delete_info_if_unreferenced(conn, file_id)?;
                Ok(DetachOutcome {
                    link_removed,
                    file_info_removed,
                })
            })
            .await
    }

    pub async fn update_project(
        &self,
        project_id: Uuid,
        update: &ProjectUpdate,
    ) -> Result<ProjectBundle, DatabaseError> {
        self.db
            .with_transaction(|conn| update_project(conn, project_id, update))
            .await
    }

    /// Deletes a project and every child row, then removes shared file
    /// records that no other project links to.
    pub async fn delete_project(&self, project_id: Uuid) -> Result<bool, DatabaseError> {
        self.db
            .with_transaction(|conn| {
                let file_ids: Vec<Uuid> = file_repo::list_links(conn, project_id)?
                    .into_iter()
                    .map(|link| link.file_id)
                    .collect();
                if !project_repo::delete(conn, project_id)? {
                    return Ok(false);
                }
                let mut pruned = 0;
                for file_id in file_ids {
                    if file_repo::delete_info_if_unreferenced(conn, file_id)? {
                        pruned += 1;
                    }
                }
                log::info!(
                    "Deleted project {} ({} shared file records pruned)",
                    project_id,
                    pruned
                );
                Ok(true)
            })
            .await
    }

    pub async fn get_project_bundle(
        &self,
        project_id: Uuid,
    ) -> Result<Option<ProjectBundle>, DatabaseError> {
        self.db
            .with_conn(|conn| project_repo::fetch_bundle(conn, project_id))
            .await
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>, DatabaseError> {
        self.db.with_conn(project_repo::list).await
    }

    pub async fn upsert_artifact(&self, artifact: &NewArtifact) -> Result<(), DatabaseError> {
        self.db
            .with_transaction(|conn| artifact_repo::upsert(conn, artifact, &now_timestamp()))
            .await
    }

    pub async fn update_artifact_status(
        &self,
        update: &ArtifactStatusUpdate,
    ) -> Result<ArtifactRecord, DatabaseError> {
        self.db
            .with_transaction(|conn| artifact_repo::update_status(conn, update))
            .await
    }

    pub async fn find_artifact(&self, artifact_id: Uuid) -> Result<Option<ArtifactRecord>, DatabaseError> {
        self.db
            .with_conn(|conn| artifact_repo::find_by_id(conn, artifact_id))
            .await
    }

    pub async fn list_artifacts_for_file(
        &self,
        project_id: Uuid,
        file_id: Uuid,
    ) -> Result<Vec<ArtifactRecord>, DatabaseError> {
        self.db
            .with_conn(|conn| artifact_repo::list_for_file(conn, project_id, file_id))
            .await
    }

    pub async fn delete_artifact(&self, artifact_id: Uuid) -> Result<bool, DatabaseError> {
        self.db
            .with_transaction(|conn| artifact_repo::delete(conn, artifact_id))
            .await
    }

    pub async fn upsert_job(&self, job: &NewJob) -> Result<(), DatabaseError> {
        self.db
            .with_transaction(|conn| job_repo::upsert(conn, job, &now_timestamp()))
            .await
    }

    pub async fn update_job_status(&self, update: &JobStatusUpdate) -> Result<JobRecord, DatabaseError> {
        self.db
            .with_transaction(|conn| job_repo::update_status(conn, update))
            .await
    }

    pub async fn find_job(&self, artifact_id: Uuid, job_type: &str) -> Result<Option<JobRecord>, DatabaseError> {
        self.db
            .with_conn(|conn| job_repo::find(conn, artifact_id, job_type))
            .await
    }

    pub async fn list_jobs_for_project(&self, project_id: Uuid) -> Result<Vec<JobRecord>, DatabaseError> {
        self.db
            .with_conn(|conn| job_repo::list_for_project(conn, project_id))
            .await
    }

    pub async fn delete_job(&self, artifact_id: Uuid, job_type: &str) -> Result<bool, DatabaseError> {
        self.db
            .with_transaction(|conn| job_repo::delete(conn, artifact_id, job_type))
            .await
    }
}

impl StoreTransaction {
    pub fn create_project(&self, args: &NewProject) -> Result<ProjectBundle, DatabaseError> {
        create_project(self.conn(), args)
    }

    pub fn attach_file(
        &self,
        project_id: Uuid,
        info: &NewFileInfo,
        link: &NewProjectFile,
        language_pairs: &[LanguagePair],
    ) -> Result<ProjectFileBundle, DatabaseError> {
        attach_file(self.conn(), project_id, info, link, language_pairs)
    }

    pub fn upsert_artifact(&self, artifact: &NewArtifact) -> Result<(), DatabaseError> {
        artifact_repo::upsert(self.conn(), artifact, &now_timestamp())
    }

    pub fn upsert_job(&self, job: &NewJob) -> Result<(), DatabaseError> {
        job_repo::upsert(self.conn(), job, &now_timestamp())
    }

    pub fn project_bundle(&self, project_id: Uuid) -> Result<ProjectBundle, DatabaseError> {
        fetch_existing_bundle(self.conn(), project_id)
    }
}

fn create_project(conn: &Connection, args: &NewProject) -> Result<ProjectBundle, DatabaseError> {
    validate_new_project(args)?;

    let project_id = Uuid::new_v4();
    project_repo::insert(conn, project_id, args, &now_timestamp())?;
    project_repo::insert_subjects(conn, project_id, &args.subjects)?;
    project_repo::insert_language_pairs(conn, project_id, &args.language_pairs)?;

    log::debug!(
        "Inserted project {} with {} language pair(s)",
        project_id,
        args.language_pairs.len()
    );

    fetch_existing_bundle(conn, project_id)
}

fn attach_file(
    conn: &Connection,
    project_id: Uuid,
    info: &NewFileInfo,
    link: &NewProjectFile,
    language_pairs: &[LanguagePair],
) -> Result<ProjectFileBundle, DatabaseError> {
    let language_pairs = LanguagePair::normalize_all(language_pairs);
    if link.role.requires_language_pairs() && language_pairs.is_empty() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "{} files require at least one language pair",
            link.role.as_str()
        )));
    }
    if has_duplicates(&language_pairs) {
        return Err(DatabaseError::ConstraintViolation(
            "duplicate file language pair".to_string(),
        ));
    }
    if !project_repo::exists(conn, project_id)? {
        return Err(DatabaseError::NotFound {
            entity: "project",
            id: project_id.to_string(),
        });
    }

    let project_pairs = project_repo::list_language_pairs(conn, project_id)?;
    if let Some(pair) = language_pairs.iter().find(|p| !project_pairs.contains(p)) {
        log::debug!("Rejecting file pair {} outside project {}", pair, project_id);
        return Err(DatabaseError::ConstraintViolation(
            "file language pair must match existing project language pair".to_string(),
        ));
    }

    let now = now_timestamp();
    file_repo::upsert_info(conn, info, &now)?;
    file_repo::upsert_link(conn, project_id, info.file_id, link, &now)?;
    file_repo::replace_language_pairs(conn, project_id, info.file_id, &language_pairs)?;

    file_repo::fetch_file_bundle(conn, project_id, info.file_id)?.ok_or_else(|| {
        DatabaseError::NotFound {
            entity: "project file",
            id: info.file_id.to_string(),
        }
    })
}

fn update_project(
    conn: &Connection,
    project_id: Uuid,
    update: &ProjectUpdate,
) -> Result<ProjectBundle, DatabaseError> {
    if let Some(ref name) = update.name {
        require_text(name, "project name is required")?;
    }
    if let Some(ref owner_id) = update.owner_id {
        require_text(owner_id, "owner is required")?;
    }
    if let Some(ref pairs) = update.language_pairs {
        validate_language_pairs(pairs)?;
    }

    if !project_repo::update_fields(conn, project_id, update)? {
        return Err(DatabaseError::NotFound {
            entity: "project",
            id: project_id.to_string(),
        });
    }
    if let Some(ref subjects) = update.subjects {
        project_repo::replace_subjects(conn, project_id, subjects)?;
    }
    if let Some(ref pairs) = update.language_pairs {
        project_repo::replace_language_pairs(conn, project_id, pairs)?;
    }

    fetch_existing_bundle(conn, project_id)
}

fn fetch_existing_bundle(conn: &Connection, project_id: Uuid) -> Result<ProjectBundle, DatabaseError> {
    project_repo::fetch_bundle(conn, project_id)?.ok_or_else(|| DatabaseError::NotFound {
        entity: "project",
        id: project_id.to_string(),
    })
}

fn validate_new_project(args: &NewProject) -> Result<(), DatabaseError> {
    require_text(&args.name, "project name is required")?;
    require_text(&args.owner_id, "owner is required")?;
    require_text(&args.project_type, "project type is required")?;
    validate_language_pairs(&args.language_pairs)
}

/// Empty sets and blank locales are rejected here; duplicates are left to
/// the unique constraint so the transaction rolls back.
fn validate_language_pairs(pairs: &[LanguagePair]) -> Result<(), DatabaseError> {
    if pairs.is_empty() {
        return Err(DatabaseError::ConstraintViolation(
            "project requires at least one language pair".to_string(),
        ));
    }
    if pairs
        .iter()
        .any(|p| p.source_lang.trim().is_empty() || p.target_lang.trim().is_empty())
    {
        return Err(DatabaseError::ConstraintViolation(
            "language pair locales must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn require_text(value: &str, message: &str) -> Result<(), DatabaseError> {
    if value.trim().is_empty() {
        return Err(DatabaseError::ConstraintViolation(message.to_string()));
    }
    Ok(())
}

fn has_duplicates(pairs: &[LanguagePair]) -> bool {
    let mut seen = HashSet::new();
    pairs.iter().any(|p| !seen.insert(p))
}
