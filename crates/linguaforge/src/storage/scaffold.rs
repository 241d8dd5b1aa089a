//! Project folder scaffolding with an explicit cleanup guard.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::db::records::ProjectBundle;
use crate::error::StorageError;
use crate::sanitize::{self, slugify, validate_folder_name};

use super::run_blocking;

pub const TRANSLATIONS_DIR: &str = "Translations";
pub const REFERENCES_DIR: &str = "References";
pub const INSTRUCTIONS_DIR: &str = "Instructions";

/// Fixed subfolders created under every project root.
pub const PROJECT_SUBFOLDERS: [&str; 3] = [TRANSLATIONS_DIR, REFERENCES_DIR, INSTRUCTIONS_DIR];

/// Highest numeric suffix tried when suggesting a folder name.
const MAX_SUFFIX: u32 = 1000;

pub struct PathScaffolder {
    projects_root: PathBuf,
}

impl PathScaffolder {
    pub fn new<P: AsRef<Path>>(projects_root: P) -> Self {
        Self {
            projects_root: projects_root.as_ref().to_path_buf(),
        }
    }

    pub fn projects_root(&self) -> &Path {
        &self.projects_root
    }

    /// Absolute path of a project folder after validating its name.
    pub fn project_dir(&self, folder_name: &str) -> Result<PathBuf, StorageError> {
        let name = validate_folder_name(folder_name)?;
        Ok(self.projects_root.join(name))
    }

    /// Fails with `DestinationExists` when the folder is already taken.
    pub fn ensure_available(&self, folder_name: &str) -> Result<PathBuf, StorageError> {
        let dir = self.project_dir(folder_name)?;
        if std::fs::symlink_metadata(&dir).is_ok() {
            return Err(StorageError::DestinationExists(dir));
        }
        Ok(dir)
    }

    /// Suggests a free folder name for a display name: the slug itself, then
    /// `slug-2`, `slug-3`, ... Nothing is created, so repeated calls return
    /// the same answer until the folder appears on disk.
    pub fn suggest_folder_name(&self, display_name: &str) -> Result<String, StorageError> {
        let base = slugify(display_name);
        for counter in 1..=MAX_SUFFIX {
            let candidate = if counter == 1 {
                base.clone()
            } else {
                format!("{base}-{counter}")
            };
            if std::fs::symlink_metadata(self.projects_root.join(&candidate)).is_err() {
                return Ok(candidate);
            }
        }
        Err(StorageError::DestinationExists(self.projects_root.join(base)))
    }

    /// Creates `{root}/{folder}` and its fixed subfolders.
    ///
    /// On failure everything created by this call is removed before the
    /// error is returned. On success the caller owns the returned guard and
    /// must either [`ScaffoldGuard::disarm`] or [`ScaffoldGuard::cleanup`] it.
    pub async fn scaffold(&self, folder_name: &str) -> Result<ScaffoldGuard, StorageError> {
        let project_dir = self.project_dir(folder_name)?;
        let projects_root = self.projects_root.clone();

        let target = project_dir.clone();

        let created = run_blocking(move || create_scaffold(&projects_root, &target)).await?;

        log::info!(
            "Scaffolded project folder '{}'",
            sanitize::redact_path(&project_dir)
        );

        Ok(ScaffoldGuard {
            project_dir,
            created,
        })
    }

    /// Folder of a stored project.
    ///
    /// Uses the recorded folder name. Rows written before folder names were
    /// recorded fall back to the first folder under the root that holds
    /// every stored file of the project.
    pub async fn locate(&self, bundle: &ProjectBundle) -> Result<PathBuf, StorageError> {
        let projects_root = self.projects_root.clone();
        let project_id = bundle.project.project_id;
        let folder_name = bundle.project.folder_name.clone();
        let stored: Vec<String> = bundle.files.iter().map(|f| f.link.stored_at.clone()).collect();

        run_blocking(move || {
            if let Some(name) = folder_name {
                let dir = projects_root.join(validate_folder_name(&name)?);
                return if dir.is_dir() {
                    Ok(dir)
                } else {
                    Err(StorageError::ProjectFolderMissing(project_id))
                };
            }
            if stored.is_empty() {
                return Err(StorageError::ProjectFolderMissing(project_id));
            }

            let entries = std::fs::read_dir(&projects_root).map_err(|e| StorageError::ReadMetadata {
                path: projects_root.clone(),
                source: e,
            })?;
            let mut candidates: Vec<PathBuf> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect();
            candidates.sort();

            candidates
                .into_iter()
                .find(|dir| {
                    stored
                        .iter()
                        .all(|rel| sanitize::stored_path(dir, rel).is_file())
                })
                .ok_or(StorageError::ProjectFolderMissing(project_id))
        })
        .await
    }

    /// Removes a whole project folder. Only direct children of the projects
    /// root are accepted. Returns false when the folder was already gone.
    pub async fn remove_project_dir(&self, project_dir: &Path) -> Result<bool, StorageError> {
        if project_dir.parent() != Some(self.projects_root.as_path())
            || project_dir.file_name().is_none()
        {
            return Err(StorageError::OutsideProjectsRoot(project_dir.to_path_buf()));
        }

        let target = project_dir.to_path_buf();
        let removed = run_blocking(move || match std::fs::remove_dir_all(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::RemovePath {
                path: target.clone(),
                source: e,
            }),
        })
        .await?;

        log::info!(
            "Removed project folder '{}' (existed: {})",
            sanitize::redact_path(project_dir),
            removed
        );
        Ok(removed)
    }
}

fn create_scaffold(projects_root: &Path, project_dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    std::fs::create_dir_all(projects_root).map_err(|e| StorageError::CreateDirectory {
        path: projects_root.to_path_buf(),
        source: e,
    })?;

    // create_dir (not create_dir_all) so an existing folder is never adopted.
    if let Err(e) = std::fs::create_dir(project_dir) {
        return Err(if e.kind() == std::io::ErrorKind::AlreadyExists {
            StorageError::DestinationExists(project_dir.to_path_buf())
        } else {
            StorageError::CreateDirectory {
                path: project_dir.to_path_buf(),
                source: e,
            }
        });
    }

    let mut created = vec![project_dir.to_path_buf()];
    for sub in PROJECT_SUBFOLDERS {
        let path = project_dir.join(sub);
        if let Err(e) = std::fs::create_dir(&path) {
            remove_paths(&created);
            return Err(StorageError::CreateDirectory { path, source: e });
        }
        created.push(path);
    }

    Ok(created)
}

/// Outcome of a best-effort cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub removed: usize,
    pub failed: usize,
}

/// Paths created for a project that is not yet committed.
///
/// There is no drop-based cleanup: every exit path must call either
/// [`cleanup`](Self::cleanup) or [`disarm`](Self::disarm).
#[must_use = "a scaffold guard must be cleaned up or disarmed"]
#[derive(Debug)]
pub struct ScaffoldGuard {
    project_dir: PathBuf,
    created: Vec<PathBuf>,
}

impl ScaffoldGuard {
    /// Guard over an existing project folder. The folder itself is never
    /// removed; only paths tracked from here on are.
    pub fn adopt(project_dir: PathBuf) -> Self {
        Self {
            project_dir,
            created: Vec::new(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Paths in creation order.
    pub fn tracked(&self) -> &[PathBuf] {
        &self.created
    }

    /// Adds a path created by someone else (e.g. a copied asset).
    pub fn track(&mut self, path: PathBuf) {
        self.created.push(path);
    }

    /// Creates a directory and all missing parents, tracking each one
    /// actually created.
    pub async fn create_dir(&mut self, path: PathBuf) -> Result<(), StorageError> {
        let new_dirs = run_blocking(move || {
            let mut missing = Vec::new();
            let mut cursor = Some(path.as_path());
            while let Some(dir) = cursor {
                if dir.exists() {
                    break;
                }
                missing.push(dir.to_path_buf());
                cursor = dir.parent();
            }
            std::fs::create_dir_all(&path).map_err(|e| StorageError::CreateDirectory {
                path: path.clone(),
                source: e,
            })?;
            missing.reverse();
            Ok(missing)
        })
        .await?;

        self.created.extend(new_dirs);
        Ok(())
    }

    /// Removes every tracked path, newest first. Failures are logged and
    /// counted, never returned.
    pub async fn cleanup(self) -> CleanupReport {
        let project_dir = self.project_dir.clone();
        let created = self.created;
        let result = run_blocking(move || Ok(remove_paths(&created))).await;

        match result {
            Ok(report) => {
                log::info!(
                    "Rolled back scaffold '{}' ({} removed, {} failed)",
                    sanitize::redact_path(&project_dir),
                    report.removed,
                    report.failed
                );
                report
            }
            Err(e) => {
                log::error!("Scaffold cleanup task failed: {}", e);
                CleanupReport {
                    removed: 0,
                    failed: 1,
                }
            }
        }
    }

    /// Hands the folders over to the committed project.
    pub fn disarm(self) -> PathBuf {
        log::debug!(
            "Scaffold guard disarmed for '{}'",
            sanitize::redact_path(&self.project_dir)
        );
        self.project_dir
    }
}

/// Best-effort removal of files and folders that outlived their rows.
pub async fn discard_paths(paths: Vec<PathBuf>) -> CleanupReport {
    let count = paths.len();
    match run_blocking(move || Ok(remove_paths(&paths))).await {
        Ok(report) => report,
        Err(e) => {
            log::error!("Path removal task failed: {}", e);
            CleanupReport {
                removed: 0,
                failed: count,
            }
        }
    }
}

/// Removes paths in reverse order. Already-missing paths count as removed.
fn remove_paths(paths: &[PathBuf]) -> CleanupReport {
    let mut report = CleanupReport::default();
    for path in paths.iter().rev() {
        let result = match std::fs::symlink_metadata(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
            Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
            Ok(_) => std::fs::remove_file(path),
        };
        match result {
            Ok(()) => report.removed += 1,
            Err(e) => {
                report.failed += 1;
                let err = StorageError::RemovePath {
                    path: path.clone(),
                    source: e,
                };
                log::warn!("Cleanup failed: {}", err);
            }
        }
    }
    report
}
