use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::conversion::{ConversionOptions, ConversionTask};
use crate::db::records::{LanguagePair, NewProject, ProjectBundle, ProjectStatus};
use crate::error::ForgeError;
use crate::storage::{AssetDescriptor, IngestedAsset};

use super::state::ProvisionState;

fn default_project_type() -> String {
    "translation".to_string()
}

/// Everything needed to create a project with its files in one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub project_name: String,
    /// Derived from the project name when absent.
    #[serde(default)]
    pub folder_name: Option<String>,
    pub owner_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default = "default_project_type")]
    pub project_type: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub language_pairs: Vec<LanguagePair>,
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
    #[serde(default)]
    pub conversion: ConversionOptions,
}

impl ProvisionRequest {
    pub fn new_project(&self) -> NewProject {
        NewProject {
            name: self.project_name.trim().to_string(),
            status: self.status,
            owner_id: self.owner_id.trim().to_string(),
            client_id: self.client_id.clone(),
            project_type: self.project_type.clone(),
            notes: self.notes.clone(),
            subjects: self.subjects.clone(),
            language_pairs: self.normalized_pairs(),
            folder_name: None,
        }
    }

    /// Requested pairs with locales trimmed, in request order.
    pub fn normalized_pairs(&self) -> Vec<LanguagePair> {
        LanguagePair::normalize_all(&self.language_pairs)
    }

    /// Input checks that need no disk or database access.
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.project_name.trim().is_empty() {
            return Err(ForgeError::Validation("project name is required".into()));
        }
        if self.owner_id.trim().is_empty() {
            return Err(ForgeError::Validation("owner is required".into()));
        }
        if self.project_type.trim().is_empty() {
            return Err(ForgeError::Validation("project type is required".into()));
        }
        if self.language_pairs.is_empty() {
            return Err(ForgeError::Validation(
                "project requires at least one language pair".into(),
            ));
        }

        validate_pairs(&self.language_pairs)?;

        let mut subjects = HashSet::new();
        for subject in &self.subjects {
            if !subjects.insert(subject.trim()) {
                return Err(ForgeError::Validation(format!("duplicate subject '{subject}'")));
            }
        }

        validate_assets(&self.assets)?;
        Ok(())
    }
}

/// Files added to a project that already exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAssetsRequest {
    pub project_id: Uuid,
    pub assets: Vec<AssetDescriptor>,
    /// Pairs for the processable assets; every project pair when absent.
    #[serde(default)]
    pub language_pairs: Option<Vec<LanguagePair>>,
    #[serde(default)]
    pub conversion: ConversionOptions,
}

impl AddAssetsRequest {
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.assets.is_empty() {
            return Err(ForgeError::Validation("at least one asset is required".into()));
        }
        if let Some(ref pairs) = self.language_pairs {
            if pairs.is_empty() {
                return Err(ForgeError::Validation(
                    "language pairs must not be empty when given".into(),
                ));
            }
            validate_pairs(pairs)?;
        }
        validate_assets(&self.assets)
    }
}

/// Blank locales, duplicates after trimming and shared output folders.
fn validate_pairs(pairs: &[LanguagePair]) -> Result<(), ForgeError> {
    let normalized = LanguagePair::normalize_all(pairs);
    let mut seen = HashSet::new();
    for pair in &normalized {
        if pair.source_lang.is_empty() || pair.target_lang.is_empty() {
            return Err(ForgeError::Validation(
                "language pair locales must not be empty".into(),
            ));
        }
        if !seen.insert(pair) {
            return Err(ForgeError::Validation(format!("duplicate language pair {pair}")));
        }
    }
    check_pair_folders(&normalized)
}

fn validate_assets(assets: &[AssetDescriptor]) -> Result<(), ForgeError> {
    let mut drafts = HashSet::new();
    for asset in assets {
        if asset.draft_id.trim().is_empty() {
            return Err(ForgeError::Validation("asset draft id is required".into()));
        }
        if !drafts.insert(asset.draft_id.as_str()) {
            return Err(ForgeError::Validation(format!(
                "duplicate asset draft id '{}'",
                asset.draft_id
            )));
        }
        if !asset.source_path.is_absolute() {
            return Err(ForgeError::Validation(format!(
                "asset '{}' must have an absolute source path",
                asset.draft_id
            )));
        }
    }
    Ok(())
}

/// Rejects distinct pairs whose locales sanitize to the same
/// `Translations/{src}_{tgt}` folder.
fn check_pair_folders(pairs: &[LanguagePair]) -> Result<(), ForgeError> {
    let mut folders: HashMap<String, &LanguagePair> = HashMap::new();
    for pair in pairs {
        if let Some(existing) = folders.insert(pair.dir_name(), pair) {
            if existing != pair {
                return Err(ForgeError::Validation(format!(
                    "language pairs {existing} and {pair} map to the same folder '{}'",
                    pair.dir_name()
                )));
            }
        }
    }
    Ok(())
}

/// A committed project and the work left for the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOutcome {
    pub bundle: ProjectBundle,
    pub project_dir: PathBuf,
    pub assets: Vec<IngestedAsset>,
    pub plan: Vec<ConversionTask>,
}

/// A provisioning run that did not commit.
#[derive(Error, Debug)]
#[error("Provisioning failed while {}: {error}", state.to_string().to_lowercase())]
pub struct ProvisionFailure {
    /// State that was active when the error occurred.
    pub state: ProvisionState,
    /// True when compensation ran (transaction and/or directories).
    pub rolled_back: bool,
    #[source]
    pub error: ForgeError,
}

impl ProvisionFailure {
    /// Terminal state the run ended in.
    pub fn terminal_state(&self) -> ProvisionState {
        if self.rolled_back {
            ProvisionState::RolledBack
        } else {
            ProvisionState::Failed
        }
    }
}
