//! Operations on projects that already exist: adding files, rebuilding the
//! conversion plan, and removing files or whole projects.
//!
//! Adding files follows the provisioning contract: one transaction, and a
//! guard over the existing folder that removes only what this call created.
//! Removals delete rows first; leftover files are cleaned up best-effort.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::conversion::{plan_for_bundle, ConversionOptions, ConversionTask};
use crate::db::records::{LanguagePair, ProjectBundle, WorkStatus};
use crate::db::{DetachOutcome, StoreTransaction};
use crate::error::ForgeError;
use crate::sanitize::{redact_path, stored_path};
use crate::storage::{discard_paths, CleanupReport, IngestedAsset, ScaffoldGuard};

use super::orchestrator::{
    advance, check_cancelled, enter, failed, ingest_and_attach, roll_back, seed_plan,
    ProvisioningOrchestrator,
};
use super::progress::{ProvisionEvent, ProvisionProgress};
use super::request::{AddAssetsRequest, ProvisionFailure, ProvisionOutcome};
use super::state::ProvisionState;

/// A stored processable file whose source is gone from the project folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityAlert {
    pub file_id: Uuid,
    pub filename: String,
    pub stored_at: String,
}

/// Work queued by [`ProvisioningOrchestrator::ensure_conversion_plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionPlan {
    pub project_id: Uuid,
    pub project_dir: PathBuf,
    /// Tasks whose jobs are pending after the call.
    pub tasks: Vec<ConversionTask>,
    /// Artifacts left alone: running, or completed with output on disk.
    pub skipped: Vec<Uuid>,
    pub alerts: Vec<IntegrityAlert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRemoval {
    pub detach: DetachOutcome,
    pub cleanup: CleanupReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRemoval {
    pub rows_deleted: bool,
    pub folder_removed: bool,
}

impl ProvisioningOrchestrator {
    /// Copies assets into an existing project and seeds their conversions.
    ///
    /// Runs Validating, IngestingAssets, SeedingConversionJobs, Committed.
    /// On failure the transaction rolls back and only the files and folders
    /// this call created are removed.
    pub async fn add_assets(
        &self,
        request: &AddAssetsRequest,
        cancel: &CancellationToken,
        progress: &dyn ProvisionProgress,
    ) -> Result<ProvisionOutcome, ProvisionFailure> {
        let span = info_span!(
            "add_assets",
            project_id = %request.project_id,
            assets = request.assets.len(),
        );
        self.add_assets_inner(request, cancel, progress)
            .instrument(span)
            .await
    }

    async fn add_assets_inner(
        &self,
        request: &AddAssetsRequest,
        cancel: &CancellationToken,
        progress: &dyn ProvisionProgress,
    ) -> Result<ProvisionOutcome, ProvisionFailure> {
        let mut state = ProvisionState::Validating;
        enter(progress, state);
        if let Err(e) = request.validate() {
            return Err(failed(progress, state, e));
        }
        let bundle = self
            .existing_bundle(request.project_id)
            .await
            .map_err(|e| failed(progress, state, e))?;
        let pairs = pairs_for_assets(&bundle, request.language_pairs.as_deref())
            .map_err(|e| failed(progress, state, e))?;
        let project_dir = self
            .scaffolder()
            .locate(&bundle)
            .await
            .map_err(|e| failed(progress, state, e.into()))?;
        if cancel.is_cancelled() {
            return Err(failed(progress, state, ForgeError::Cancelled));
        }

        let mut guard = ScaffoldGuard::adopt(project_dir);
        let mut tx = match self.store().begin().await {
            Ok(tx) => tx,
            Err(e) => return Err(roll_back(progress, state, None, guard, e.into()).await),
        };

        let staged = match self
            .stage_additions(&mut tx, request, &pairs, &mut guard, cancel, progress, &mut state)
            .await
        {
            Ok(staged) => staged,
            Err(e) => return Err(roll_back(progress, state, Some(tx), guard, e).await),
        };

        if let Err(e) = tx.commit() {
            return Err(roll_back(progress, state, None, guard, e.into()).await);
        }
        let project_dir = guard.disarm();

        let (bundle, assets, plan) = staged;
        enter(progress, ProvisionState::Committed);
        progress.report(ProvisionEvent::Committed {
            project_id: request.project_id,
        });
        tracing::info!(
            project_id = %request.project_id,
            files = assets.len(),
            tasks = plan.len(),
            "Assets added to project"
        );

        Ok(ProvisionOutcome {
            bundle,
            project_dir,
            assets,
            plan,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage_additions(
        &self,
        tx: &mut StoreTransaction,
        request: &AddAssetsRequest,
        pairs: &[LanguagePair],
        guard: &mut ScaffoldGuard,
        cancel: &CancellationToken,
        progress: &dyn ProvisionProgress,
        state: &mut ProvisionState,
    ) -> Result<(ProjectBundle, Vec<IngestedAsset>, Vec<ConversionTask>), ForgeError> {
        advance(progress, state, ProvisionState::IngestingAssets);
        let project_dir = guard.project_dir().to_path_buf();
        let assets = ingest_and_attach(
            tx,
            request.project_id,
            &project_dir,
            &request.assets,
            pairs,
            guard,
            progress,
        )
        .await?;

        check_cancelled(cancel)?;
        advance(progress, state, ProvisionState::SeedingConversionJobs);
        let bundle = tx.project_bundle(request.project_id)?;
        let options = self.options_with_default(&request.conversion);
        let new_ids: Vec<Uuid> = assets.iter().map(|a| a.file_id).collect();
        let draft_ids: HashMap<Uuid, &str> = assets
            .iter()
            .map(|a| (a.file_id, a.draft_id.as_str()))
            .collect();

        // Planned against the whole bundle so output names never collide
        // with files the project already has.
        let mut plan = plan_for_bundle(&bundle, &project_dir, Some(&new_ids), &options);
        for task in &mut plan {
            if let Some(draft_id) = draft_ids.get(&task.file_id) {
                task.draft_id = (*draft_id).to_string();
            }
        }
        seed_plan(tx, &plan, guard).await?;

        let bundle = tx.project_bundle(request.project_id)?;
        Ok((bundle, assets, plan))
    }

    /// Rebuilds the conversion plan of a stored project and queues the work
    /// that is still open.
    ///
    /// Missing artifacts and jobs are created. Failed and cancelled jobs are
    /// re-queued, as are completed ones whose output file is gone. Files
    /// whose source is missing are reported instead of planned.
    pub async fn ensure_conversion_plan(
        &self,
        project_id: Uuid,
        only: Option<&[Uuid]>,
        options: &ConversionOptions,
    ) -> Result<ConversionPlan, ForgeError> {
        let span = info_span!("ensure_conversion_plan", project_id = %project_id);
        self.ensure_conversion_plan_inner(project_id, only, options)
            .instrument(span)
            .await
    }

    async fn ensure_conversion_plan_inner(
        &self,
        project_id: Uuid,
        only: Option<&[Uuid]>,
        options: &ConversionOptions,
    ) -> Result<ConversionPlan, ForgeError> {
        let bundle = self.existing_bundle(project_id).await?;
        let project_dir = self.scaffolder().locate(&bundle).await?;
        let options = self.options_with_default(options);
        let planned = plan_for_bundle(&bundle, &project_dir, only, &options);

        let mut alerts: Vec<IntegrityAlert> = Vec::new();
        let mut skipped = Vec::new();
        let mut tasks = Vec::new();
        for task in planned {
            if alerts.iter().any(|a| a.file_id == task.file_id) {
                continue;
            }
            if !is_file(&task.source_path).await {
                if let Some(file) = bundle.file(task.file_id) {
                    tracing::warn!(
                        file = %redact_path(&task.source_path),
                        "Stored source file is missing"
                    );
                    alerts.push(IntegrityAlert {
                        file_id: task.file_id,
                        filename: file.link.filename.clone(),
                        stored_at: file.link.stored_at.clone(),
                    });
                }
                continue;
            }

            let status = bundle
                .jobs
                .iter()
                .find(|j| j.artifact_id == task.artifact_id && j.job_type == task.job_type)
                .map(|j| j.status);
            let keep = match status {
                Some(WorkStatus::Running) => true,
                Some(WorkStatus::Completed) => is_file(&task.xliff_abs_path).await,
                _ => false,
            };
            if keep {
                skipped.push(task.artifact_id);
            } else {
                tasks.push(task);
            }
        }

        let mut guard = ScaffoldGuard::adopt(project_dir);
        let mut tx = match self.store().begin().await {
            Ok(tx) => tx,
            Err(e) => {
                guard.cleanup().await;
                return Err(e.into());
            }
        };
        if let Err(e) = seed_plan(&mut tx, &tasks, &mut guard).await {
            if let Err(rollback) = tx.rollback() {
                tracing::error!(error = %rollback, "Transaction rollback failed");
            }
            guard.cleanup().await;
            return Err(e);
        }
        if let Err(e) = tx.commit() {
            guard.cleanup().await;
            return Err(e.into());
        }
        let project_dir = guard.disarm();

        tracing::info!(
            queued = tasks.len(),
            skipped = skipped.len(),
            alerts = alerts.len(),
            "Conversion plan ensured"
        );
        Ok(ConversionPlan {
            project_id,
            project_dir,
            tasks,
            skipped,
            alerts,
        })
    }

    /// Detaches a file from a project, then removes its stored copy and
    /// conversion outputs from the project folder.
    pub async fn remove_file(&self, project_id: Uuid, file_id: Uuid) -> Result<FileRemoval, ForgeError> {
        let bundle = self.existing_bundle(project_id).await?;
        let Some(file) = bundle.file(file_id) else {
            return Err(ForgeError::Validation(format!(
                "file {file_id} is not part of project {project_id}"
            )));
        };

        let leftovers = match self.scaffolder().locate(&bundle).await {
            Ok(project_dir) => {
                let mut paths = vec![stored_path(&project_dir, &file.link.stored_at)];
                paths.extend(
                    file.artifacts
                        .iter()
                        .filter_map(|a| a.rel_path.as_deref())
                        .map(|rel| stored_path(&project_dir, rel)),
                );
                paths
            }
            Err(e) => {
                tracing::warn!(error = %e, "Project folder not found; only rows are removed");
                Vec::new()
            }
        };

        let detach = self.store().detach_file(project_id, file_id).await?;
        let cleanup = discard_paths(leftovers).await;
        tracing::info!(
            project_id = %project_id,
            file_id = %file_id,
            removed = cleanup.removed,
            failed = cleanup.failed,
            "File removed from project"
        );
        Ok(FileRemoval { detach, cleanup })
    }

    /// Deletes a project's rows, then its folder. A folder that cannot be
    /// removed is logged and reported, never turned into an error.
    pub async fn delete_project(&self, project_id: Uuid) -> Result<ProjectRemoval, ForgeError> {
        let Some(bundle) = self.store().get_project_bundle(project_id).await? else {
            return Ok(ProjectRemoval {
                rows_deleted: false,
                folder_removed: false,
            });
        };
        let project_dir = match self.scaffolder().locate(&bundle).await {
            Ok(dir) => Some(dir),
            Err(e) => {
                tracing::warn!(error = %e, "Project folder not found; only rows are removed");
                None
            }
        };

        let rows_deleted = self.store().delete_project(project_id).await?;
        let folder_removed = match project_dir {
            Some(dir) if rows_deleted => match self.scaffolder().remove_project_dir(&dir).await {
                Ok(removed) => removed,
                Err(e) => {
                    tracing::error!(error = %e, "Project folder could not be removed");
                    false
                }
            },
            _ => false,
        };

        Ok(ProjectRemoval {
            rows_deleted,
            folder_removed,
        })
    }

    async fn existing_bundle(&self, project_id: Uuid) -> Result<ProjectBundle, ForgeError> {
        self.store()
            .get_project_bundle(project_id)
            .await?
            .ok_or_else(|| ForgeError::Validation(format!("project {project_id} not found")))
    }
}

/// Pairs given to new processable files: the requested ones, which must
/// all belong to the project, or every project pair.
fn pairs_for_assets(
    bundle: &ProjectBundle,
    requested: Option<&[LanguagePair]>,
) -> Result<Vec<LanguagePair>, ForgeError> {
    let Some(requested) = requested else {
        return Ok(bundle.language_pairs.clone());
    };
    let pairs = LanguagePair::normalize_all(requested);
    if let Some(pair) = pairs.iter().find(|p| !bundle.has_language_pair(p)) {
        return Err(ForgeError::Validation(format!(
            "language pair {pair} is not part of the project"
        )));
    }
    Ok(pairs)
}

async fn is_file(path: &std::path::Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}
