//! Creates a project's folders, rows and files as one unit.
//!
//! Every step after scaffolding runs inside a single store transaction.
//! Any failure rolls the transaction back and removes every path the
//! scaffold guard tracked, newest first. Cleanup problems are logged and
//! never replace the original error.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::config::Settings;
use crate::conversion::{
    pair_directories, plan_conversions, ConversionOptions, ConversionTask, XliffVersion,
};
use crate::db::records::{LanguagePair, NewFileInfo, NewProjectFile, ProjectBundle};
use crate::db::{ProjectStore, StoreTransaction};
use crate::error::ForgeError;
use crate::storage::scaffold::TRANSLATIONS_DIR;
use crate::storage::{AssetDescriptor, AssetIngestor, IngestedAsset, PathScaffolder, ScaffoldGuard};

use super::progress::{ProvisionEvent, ProvisionProgress};
use super::request::{ProvisionFailure, ProvisionOutcome, ProvisionRequest};
use super::state::ProvisionState;

/// Rows and files written inside the open transaction.
struct Staged {
    bundle: ProjectBundle,
    assets: Vec<IngestedAsset>,
    plan: Vec<ConversionTask>,
}

pub struct ProvisioningOrchestrator {
    store: ProjectStore,
    scaffolder: PathScaffolder,
    default_version: XliffVersion,
}

impl ProvisioningOrchestrator {
    pub fn new(store: ProjectStore, scaffolder: PathScaffolder) -> Self {
        Self {
            store,
            scaffolder,
            default_version: XliffVersion::default(),
        }
    }

    pub fn from_settings(store: ProjectStore, settings: &Settings) -> Self {
        Self {
            store,
            scaffolder: PathScaffolder::new(settings.projects_dir()),
            default_version: settings.default_xliff_version,
        }
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn scaffolder(&self) -> &PathScaffolder {
        &self.scaffolder
    }

    /// Request options with the configured XLIFF version filled in.
    pub(super) fn options_with_default(&self, options: &ConversionOptions) -> ConversionOptions {
        let mut options = options.clone();
        options.xliff_version = Some(options.xliff_version.unwrap_or(self.default_version));
        options
    }

    /// Folder name a request resolves to: the explicit name, or the first
    /// free slug of the project name.
    pub fn resolve_folder_name(&self, request: &ProvisionRequest) -> Result<String, ForgeError> {
        match request.folder_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => {
                self.scaffolder.ensure_available(name)?;
                Ok(name.to_string())
            }
            _ => Ok(self.scaffolder.suggest_folder_name(&request.project_name)?),
        }
    }

    /// Runs the whole provisioning flow.
    ///
    /// Cancellation is honoured before scaffolding, persisting, ingesting and
    /// seeding. Once the transaction commits the project exists and the
    /// token has no further effect.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
        progress: &dyn ProvisionProgress,
    ) -> Result<ProvisionOutcome, ProvisionFailure> {
        let span = info_span!(
            "provision",
            project = %request.project_name,
            assets = request.assets.len(),
            pairs = request.language_pairs.len(),
        );
        self.provision_inner(request, cancel, progress)
            .instrument(span)
            .await
    }

    async fn provision_inner(
        &self,
        request: &ProvisionRequest,
        cancel: &CancellationToken,
        progress: &dyn ProvisionProgress,
    ) -> Result<ProvisionOutcome, ProvisionFailure> {
        enter(progress, ProvisionState::Validating);
        let folder_name = request
            .validate()
            .and_then(|_| self.resolve_folder_name(request))
            .map_err(|e| failed(progress, ProvisionState::Validating, e))?;
        if cancel.is_cancelled() {
            return Err(failed(progress, ProvisionState::Validating, ForgeError::Cancelled));
        }

        enter(progress, ProvisionState::ScaffoldingDirectories);
        let mut guard = self
            .scaffolder
            .scaffold(&folder_name)
            .await
            .map_err(|e| failed(progress, ProvisionState::ScaffoldingDirectories, e.into()))?;
        let project_dir = guard.project_dir().to_path_buf();

        let mut state = ProvisionState::ScaffoldingDirectories;
        if cancel.is_cancelled() {
            return Err(roll_back(progress, state, None, guard, ForgeError::Cancelled).await);
        }

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => return Err(roll_back(progress, state, None, guard, e.into()).await),
        };

        let staged = match self
            .stage(&mut tx, request, &project_dir, &mut guard, cancel, progress, &mut state)
            .await
        {
            Ok(staged) => staged,
            Err(e) => return Err(roll_back(progress, state, Some(tx), guard, e).await),
        };

        if let Err(e) = tx.commit() {
            return Err(roll_back(progress, state, None, guard, e.into()).await);
        }
        let project_dir = guard.disarm();

        enter(progress, ProvisionState::Committed);
        progress.report(ProvisionEvent::Committed {
            project_id: staged.bundle.project.project_id,
        });
        tracing::info!(
            project_id = %staged.bundle.project.project_id,
            files = staged.assets.len(),
            tasks = staged.plan.len(),
            "Project provisioned"
        );

        Ok(ProvisionOutcome {
            bundle: staged.bundle,
            project_dir,
            assets: staged.assets,
            plan: staged.plan,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn stage(
        &self,
        tx: &mut StoreTransaction,
        request: &ProvisionRequest,
        project_dir: &Path,
        guard: &mut ScaffoldGuard,
        cancel: &CancellationToken,
        progress: &dyn ProvisionProgress,
        state: &mut ProvisionState,
    ) -> Result<Staged, ForgeError> {
        advance(progress, state, ProvisionState::PersistingProject);
        let mut new_project = request.new_project();
        new_project.folder_name = project_dir
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string);
        let created = tx.create_project(&new_project)?;
        let project_id = created.project.project_id;

        check_cancelled(cancel)?;
        advance(progress, state, ProvisionState::IngestingAssets);
        let requested_pairs = request.normalized_pairs();
        let assets = ingest_and_attach(
            tx,
            project_id,
            project_dir,
            &request.assets,
            &requested_pairs,
            guard,
            progress,
        )
        .await?;

        check_cancelled(cancel)?;
        advance(progress, state, ProvisionState::SeedingConversionJobs);
        let options = self.options_with_default(&request.conversion);
        let plan = plan_conversions(&created, project_dir, &assets, &requested_pairs, &options);

        let translations = project_dir.join(TRANSLATIONS_DIR);
        for dir_name in pair_directories(&requested_pairs) {
            guard.create_dir(translations.join(dir_name)).await?;
        }
        seed_plan(tx, &plan, guard).await?;

        let bundle = tx.project_bundle(project_id)?;
        Ok(Staged {
            bundle,
            assets,
            plan,
        })
    }
}

/// Copies assets into the project and links them. Processable files get
/// `pairs`; every other role gets none.
pub(super) async fn ingest_and_attach(
    tx: &mut StoreTransaction,
    project_id: Uuid,
    project_dir: &Path,
    descriptors: &[AssetDescriptor],
    pairs: &[LanguagePair],
    guard: &mut ScaffoldGuard,
    progress: &dyn ProvisionProgress,
) -> Result<Vec<IngestedAsset>, ForgeError> {
    let assets = AssetIngestor::new(project_dir).ingest(descriptors).await?;
    for asset in &assets {
        guard.track(asset.stored_abs_path.clone());
    }
    for asset in &assets {
        let file_pairs: &[LanguagePair] = if asset.role.requires_language_pairs() {
            pairs
        } else {
            &[]
        };
        tx.attach_file(
            project_id,
            &NewFileInfo {
                file_id: asset.file_id,
                ext: asset.ext.clone(),
                kind: asset.role,
                size_bytes: i64::try_from(asset.size_bytes).unwrap_or(i64::MAX),
                segment_count: None,
                token_count: None,
                notes: None,
            },
            &NewProjectFile {
                filename: asset.filename.clone(),
                stored_at: asset.stored_rel_path.clone(),
                role: asset.role,
            },
            file_pairs,
        )?;
        progress.report(ProvisionEvent::AssetStored {
            draft_id: asset.draft_id.clone(),
            stored_rel_path: asset.stored_rel_path.clone(),
        });
    }
    Ok(assets)
}

/// Creates the output folders of a plan and records its artifacts and
/// pending jobs.
pub(super) async fn seed_plan(
    tx: &mut StoreTransaction,
    plan: &[ConversionTask],
    guard: &mut ScaffoldGuard,
) -> Result<(), ForgeError> {
    let output_dirs: BTreeSet<PathBuf> = plan
        .iter()
        .filter_map(|task| task.xliff_abs_path.parent().map(Path::to_path_buf))
        .collect();
    for dir in output_dirs {
        guard.create_dir(dir).await?;
    }
    for task in plan {
        tx.upsert_artifact(&task.new_artifact())?;
        tx.upsert_job(&task.new_job())?;
    }
    Ok(())
}

pub(super) fn enter(progress: &dyn ProvisionProgress, state: ProvisionState) {
    tracing::debug!(state = %state, "Entering state");
    progress.report(ProvisionEvent::State { state });
}

pub(super) fn advance(progress: &dyn ProvisionProgress, current: &mut ProvisionState, next: ProvisionState) {
    *current = next;
    enter(progress, next);
}

pub(super) fn check_cancelled(cancel: &CancellationToken) -> Result<(), ForgeError> {
    if cancel.is_cancelled() {
        return Err(ForgeError::Cancelled);
    }
    Ok(())
}

/// Failure before anything needed undoing.
pub(super) fn failed(
    progress: &dyn ProvisionProgress,
    state: ProvisionState,
    error: ForgeError,
) -> ProvisionFailure {
    tracing::warn!(state = %state, kind = %error.kind(), "Provisioning failed: {}", error);
    progress.report(ProvisionEvent::Failed {
        state,
        rolled_back: false,
        error: error.user_message(),
    });
    ProvisionFailure {
        state,
        rolled_back: false,
        error,
    }
}

/// Rolls back the transaction (when still open) and removes tracked paths.
/// Both are attempted regardless of the other's result.
pub(super) async fn roll_back(
    progress: &dyn ProvisionProgress,
    state: ProvisionState,
    tx: Option<StoreTransaction>,
    guard: ScaffoldGuard,
    error: ForgeError,
) -> ProvisionFailure {
    tracing::warn!(state = %state, kind = %error.kind(), "Provisioning failed, rolling back: {}", error);

    if let Some(tx) = tx {
        if let Err(e) = tx.rollback() {
            tracing::error!(error = %e, "Transaction rollback failed");
        }
    }

    let report = guard.cleanup().await;
    if report.failed > 0 {
        tracing::error!(
            removed = report.removed,
            failed = report.failed,
            "Some project paths could not be removed"
        );
    }

    progress.report(ProvisionEvent::Failed {
        state,
        rolled_back: true,
        error: error.user_message(),
    });
    ProvisionFailure {
        state,
        rolled_back: true,
        error,
    }
}
