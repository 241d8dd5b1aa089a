use std::path::{Path, PathBuf};

use crate::config::schema::{Settings, APP_FOLDER_NAME, MAX_PARALLEL_CONVERSIONS};
use crate::error::ConfigError;

/// Encoding of a settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFormat {
    Json,
    Yaml,
}

impl SettingsFormat {
    /// `.json` is JSON; anything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SettingsFormat::Json,
            _ => SettingsFormat::Yaml,
        }
    }
}

/// `~/.linguaforge/settings.yaml`.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_FOLDER_NAME).join("settings.yaml"))
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content, SettingsFormat::from_path(path))
}

/// Reads the settings file when it exists, otherwise returns defaults.
pub fn load_settings_or_default<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        log::debug!("No settings file at {:?}; using defaults", path);
        return Ok(Settings::default());
    }
    load_settings(path)
}

pub fn load_settings_from_str(content: &str, format: SettingsFormat) -> Result<Settings, ConfigError> {
    let mut settings: Settings = if content.trim().is_empty() {
        Settings::default()
    } else {
        match format {
            SettingsFormat::Json => serde_json::from_str(content)?,
            SettingsFormat::Yaml => serde_yaml::from_str(content)?,
        }
    };

    settings.app_folder = expand_home(&settings.app_folder);
    settings.projects_dir = settings.projects_dir.as_deref().map(expand_home);
    settings.converter.converter_program = expand_home(&settings.converter.converter_program);
    settings.converter.validator_program = settings.converter.validator_program.as_deref().map(expand_home);
    settings.converter.catalog = settings.converter.catalog.as_deref().map(expand_home);

    validate_settings(&settings)?;

    Ok(settings)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.app_folder.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "app_folder must not be empty".to_string(),
        });
    }

    if settings.database_file.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "database_file must not be empty".to_string(),
        });
    }

    if !(1..=MAX_PARALLEL_CONVERSIONS).contains(&settings.max_parallel_conversions) {
        return Err(ConfigError::Validation {
            message: format!(
                "max_parallel_conversions must be between 1 and {}, got {}",
                MAX_PARALLEL_CONVERSIONS, settings.max_parallel_conversions
            ),
        });
    }

    if settings.converter.converter_program.as_os_str().is_empty() {
        return Err(ConfigError::Validation {
            message: "converter.converter_program must not be empty".to_string(),
        });
    }

    for (field, value) in [
        ("default_source_language", &settings.default_source_language),
        ("default_target_language", &settings.default_target_language),
    ] {
        if let Some(locale) = value {
            let trimmed = locale.trim();
            if trimmed.is_empty() || trimmed.starts_with('-') {
                return Err(ConfigError::Validation {
                    message: format!("{field} is not a valid locale: '{locale}'"),
                });
            }
        }
    }

    Ok(())
}
