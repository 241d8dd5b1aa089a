//! Copies staged assets into a project's role-specific subfolders.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::records::FileRole;
use crate::error::{ForgeError, StorageError};
use crate::sanitize::{destination_filename, redact_path};

use super::scaffold::{INSTRUCTIONS_DIR, REFERENCES_DIR, TRANSLATIONS_DIR};
use super::run_blocking;

/// A staged file the caller wants copied into the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetDescriptor {
    /// Caller-side id used to report per-file results.
    pub draft_id: String,
    pub source_path: PathBuf,
    /// Display name; becomes the stored filename.
    pub name: String,
    #[serde(default)]
    pub extension: String,
    pub role: FileRole,
}

/// A file copied into the project tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedAsset {
    pub draft_id: String,
    pub file_id: Uuid,
    pub role: FileRole,
    pub filename: String,
    /// Lowercase extension without the dot; empty when none.
    pub ext: String,
    /// Relative to the project root, `/`-separated.
    pub stored_rel_path: String,
    pub stored_abs_path: PathBuf,
    pub size_bytes: u64,
}

/// Subfolder receiving files of a role.
pub fn subfolder_for(role: FileRole) -> &'static str {
    match role {
        FileRole::Processable => TRANSLATIONS_DIR,
        FileRole::Reference | FileRole::Image | FileRole::Ocr => REFERENCES_DIR,
        FileRole::Instructions => INSTRUCTIONS_DIR,
    }
}

pub struct AssetIngestor {
    project_dir: PathBuf,
}

impl AssetIngestor {
    pub fn new<P: AsRef<Path>>(project_dir: P) -> Self {
        Self {
            project_dir: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Copies every asset in order. The first failure removes the files
    /// copied by this call and returns `PartialIngestion` naming the asset.
    pub async fn ingest(&self, assets: &[AssetDescriptor]) -> Result<Vec<IngestedAsset>, ForgeError> {
        let mut ingested: Vec<IngestedAsset> = Vec::with_capacity(assets.len());

        for asset in assets {
            let project_dir = self.project_dir.clone();
            let descriptor = asset.clone();
            match run_blocking(move || copy_asset(&project_dir, &descriptor)).await {
                Ok(copied) => {
                    log::debug!(
                        "Copied asset {} to {}",
                        copied.draft_id,
                        copied.stored_rel_path
                    );
                    ingested.push(copied);
                }
                Err(source) => {
                    log::warn!(
                        "Ingestion of '{}' failed: {}; removing {} copied file(s)",
                        redact_path(&asset.source_path),
                        source,
                        ingested.len()
                    );
                    let copied: Vec<PathBuf> =
                        ingested.iter().map(|a| a.stored_abs_path.clone()).collect();
                    if let Err(e) = run_blocking(move || {
                        remove_files(&copied);
                        Ok(())
                    })
                    .await
                    {
                        log::error!("Copied-file cleanup task failed: {}", e);
                    }
                    return Err(ForgeError::PartialIngestion {
                        draft_id: asset.draft_id.clone(),
                        source,
                    });
                }
            }
        }

        Ok(ingested)
    }
}

fn copy_asset(project_dir: &Path, asset: &AssetDescriptor) -> Result<IngestedAsset, StorageError> {
    let metadata = std::fs::metadata(&asset.source_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::SourceNotFound(asset.source_path.clone())
        } else {
            StorageError::ReadMetadata {
                path: asset.source_path.clone(),
                source: e,
            }
        }
    })?;
    if !metadata.is_file() {
        return Err(StorageError::NotAFile(asset.source_path.clone()));
    }

    let filename = destination_filename(&asset.name, &asset.extension);
    if filename.is_empty() || filename == "." || filename == ".." {
        return Err(StorageError::InvalidName {
            name: asset.name.clone(),
            reason: "asset name cannot be empty".to_string(),
        });
    }

    // Pair folders share `Translations/` and never contain a dot.
    if asset.role == FileRole::Processable && Path::new(&filename).extension().is_none() {
        return Err(StorageError::InvalidName {
            name: filename,
            reason: "processable files need an extension".to_string(),
        });
    }

    let subfolder = subfolder_for(asset.role);
    let destination = project_dir.join(subfolder).join(&filename);

    // create_new fails atomically when the destination already exists.
    let mut target = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&destination)
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(StorageError::DestinationExists(destination));
        }
        Err(e) => {
            return Err(StorageError::CopyFile {
                from: asset.source_path.clone(),
                to: destination,
                source: e,
            });
        }
    };

    let copy_result = File::open(&asset.source_path)
        .and_then(|mut source| std::io::copy(&mut source, &mut target));
    let size_bytes = match copy_result {
        Ok(bytes) => bytes,
        Err(e) => {
            drop(target);
            let _ = std::fs::remove_file(&destination);
            return Err(StorageError::CopyFile {
                from: asset.source_path.clone(),
                to: destination,
                source: e,
            });
        }
    };

    let ext = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_lowercase();

    Ok(IngestedAsset {
        draft_id: asset.draft_id.clone(),
        file_id: Uuid::new_v4(),
        role: asset.role,
        stored_rel_path: format!("{subfolder}/{filename}"),
        stored_abs_path: destination,
        filename,
        ext,
        size_bytes,
    })
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths.iter().rev() {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Failed to remove copied file '{}': {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PROJECT_SUBFOLDERS;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        staging: PathBuf,
        project_dir: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("staging");
        let project_dir = temp.path().join("project");
        std::fs::create_dir_all(&staging).unwrap();
        for sub in PROJECT_SUBFOLDERS {
            std::fs::create_dir_all(project_dir.join(sub)).unwrap();
        }
        Fixture {
            _temp: temp,
            staging,
            project_dir,
        }
    }

    fn staged(fx: &Fixture, draft_id: &str, file: &str, role: FileRole) -> AssetDescriptor {
        let source_path = fx.staging.join(file);
        std::fs::write(&source_path, format!("content of {file}")).unwrap();
        let (name, extension) = file.rsplit_once('.').unwrap_or((file, ""));
        AssetDescriptor {
            draft_id: draft_id.to_string(),
            source_path,
            name: name.to_string(),
            extension: extension.to_string(),
            role,
        }
    }

    #[test]
    fn test_subfolder_for_roles() {
        assert_eq!(subfolder_for(FileRole::Processable), "Translations");
        assert_eq!(subfolder_for(FileRole::Reference), "References");
        assert_eq!(subfolder_for(FileRole::Image), "References");
        assert_eq!(subfolder_for(FileRole::Ocr), "References");
        assert_eq!(subfolder_for(FileRole::Instructions), "Instructions");
    }

    #[tokio::test]
    async fn test_ingest_copies_by_role_in_order() {
        let fx = fixture();
        let assets = vec![
            staged(&fx, "d1", "brochure.docx", FileRole::Processable),
            staged(&fx, "d2", "glossary.pdf", FileRole::Reference),
            staged(&fx, "d3", "style.txt", FileRole::Instructions),
        ];

        let ingested = AssetIngestor::new(&fx.project_dir).ingest(&assets).await.unwrap();
        let draft_ids: Vec<&str> = ingested.iter().map(|a| a.draft_id.as_str()).collect();
        assert_eq!(draft_ids, vec!["d1", "d2", "d3"]);

        assert_eq!(ingested[0].stored_rel_path, "Translations/brochure.docx");
        assert_eq!(ingested[0].ext, "docx");
        assert_eq!(ingested[1].stored_rel_path, "References/glossary.pdf");
        assert_eq!(ingested[2].stored_rel_path, "Instructions/style.txt");

        for asset in &ingested {
            assert!(asset.stored_abs_path.is_file());
            assert_eq!(
                asset.size_bytes,
                std::fs::metadata(&asset.stored_abs_path).unwrap().len()
            );
        }
        assert_ne!(ingested[0].file_id, ingested[1].file_id);
    }

    #[tokio::test]
    async fn test_missing_source_rolls_back_earlier_copies() {
        let fx = fixture();
        let good = staged(&fx, "d1", "brochure.docx", FileRole::Processable);
        let mut missing = staged(&fx, "d2", "gone.pdf", FileRole::Reference);
        std::fs::remove_file(&missing.source_path).unwrap();
        missing.name = "gone".to_string();

        let err = AssetIngestor::new(&fx.project_dir)
            .ingest(&[good, missing])
            .await
            .unwrap_err();

        match err {
            ForgeError::PartialIngestion { draft_id, source } => {
                assert_eq!(draft_id, "d2");
                assert!(matches!(source, StorageError::SourceNotFound(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!fx.project_dir.join("Translations/brochure.docx").exists());
    }

    #[tokio::test]
    async fn test_existing_destination_is_not_overwritten() {
        let fx = fixture();
        let existing = fx.project_dir.join("Translations/brochure.docx");
        std::fs::write(&existing, b"original").unwrap();

        let asset = staged(&fx, "d1", "brochure.docx", FileRole::Processable);
        let err = AssetIngestor::new(&fx.project_dir).ingest(&[asset]).await.unwrap_err();

        assert!(matches!(
            err,
            ForgeError::PartialIngestion {
                source: StorageError::DestinationExists(_),
                ..
            }
        ));
        assert_eq!(std::fs::read(&existing).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_directory_source_is_rejected() {
        let fx = fixture();
        let asset = AssetDescriptor {
            draft_id: "dir".to_string(),
            source_path: fx.staging.clone(),
            name: "staging".to_string(),
            extension: String::new(),
            role: FileRole::Reference,
        };
        let err = AssetIngestor::new(&fx.project_dir).ingest(&[asset]).await.unwrap_err();
        assert!(matches!(
            err,
            ForgeError::PartialIngestion {
                source: StorageError::NotAFile(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_processable_asset_without_extension_is_rejected() {
        let fx = fixture();
        let reference = staged(&fx, "d1", "notes", FileRole::Reference);
        let processable = staged(&fx, "d2", "en-US_de-DE", FileRole::Processable);

        let err = AssetIngestor::new(&fx.project_dir)
            .ingest(&[reference, processable])
            .await
            .unwrap_err();
        match err {
            ForgeError::PartialIngestion { draft_id, source } => {
                assert_eq!(draft_id, "d2");
                assert!(source.to_string().contains("processable files need an extension"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!fx.project_dir.join("References/notes").exists());
        assert!(!fx.project_dir.join("Translations/en-US_de-DE").exists());
    }

    #[tokio::test]
    async fn test_duplicate_names_in_one_batch_fail() {
        let fx = fixture();
        let first = staged(&fx, "d1", "brochure.docx", FileRole::Processable);
        let mut second = first.clone();
        second.draft_id = "d2".to_string();

        let err = AssetIngestor::new(&fx.project_dir)
            .ingest(&[first, second])
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::PartialIngestion { ref draft_id, .. } if draft_id == "d2"));
        assert!(!fx.project_dir.join("Translations/brochure.docx").exists());
    }
}
