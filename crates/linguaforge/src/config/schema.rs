use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::conversion::{ConverterSettings, XliffVersion};

/// Application folder name under the home directory.
pub const APP_FOLDER_NAME: &str = ".linguaforge";

pub const DEFAULT_DATABASE_FILE: &str = "linguaforge.db";

pub const MAX_PARALLEL_CONVERSIONS: usize = 32;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_app_folder")]
    pub app_folder: PathBuf,
    /// Defaults to `{app_folder}/projects`.
    #[serde(default)]
    pub projects_dir: Option<PathBuf>,
    /// Relative paths resolve against `app_folder`.
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
    #[serde(default)]
    pub converter: ConverterSettings,
    #[serde(default)]
    pub default_xliff_version: XliffVersion,
    #[serde(default = "default_max_parallel_conversions")]
    pub max_parallel_conversions: usize,
    #[serde(default)]
    pub default_source_language: Option<String>,
    #[serde(default)]
    pub default_target_language: Option<String>,
}

fn default_app_folder() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_FOLDER_NAME))
        .unwrap_or_else(|| PathBuf::from(APP_FOLDER_NAME))
}

fn default_database_file() -> PathBuf {
    PathBuf::from(DEFAULT_DATABASE_FILE)
}

fn default_max_parallel_conversions() -> usize {
    4
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_folder: default_app_folder(),
            projects_dir: None,
            database_file: default_database_file(),
            converter: ConverterSettings::default(),
            default_xliff_version: XliffVersion::default(),
            max_parallel_conversions: default_max_parallel_conversions(),
            default_source_language: None,
            default_target_language: None,
        }
    }
}

impl Settings {
    /// Settings rooted at `app_folder` with every other field defaulted.
    pub fn with_app_folder<P: AsRef<Path>>(app_folder: P) -> Self {
        Self {
            app_folder: app_folder.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn projects_dir(&self) -> PathBuf {
        match &self.projects_dir {
            Some(dir) => self.resolve(dir),
            None => self.app_folder.join("projects"),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve(&self.database_file)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.app_folder.join(path)
        }
    }
}
