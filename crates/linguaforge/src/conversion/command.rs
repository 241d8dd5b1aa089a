//! Typed argument lists for the converter and validator executables.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ConversionError;
use super::plan::ConversionTask;

/// XLIFF version flag passed to the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum XliffVersion {
    #[serde(rename = "2.0")]
    V2_0,
    #[default]
    #[serde(rename = "2.1")]
    V2_1,
    #[serde(rename = "2.2")]
    V2_2,
}

impl XliffVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            XliffVersion::V2_0 => "2.0",
            XliffVersion::V2_1 => "2.1",
            XliffVersion::V2_2 => "2.2",
        }
    }

    pub fn flag(&self) -> &'static str {
        match self {
            XliffVersion::V2_0 => "-2.0",
            XliffVersion::V2_1 => "-2.1",
            XliffVersion::V2_2 => "-2.2",
        }
    }
}

impl std::fmt::Display for XliffVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for XliffVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2.0" => Ok(XliffVersion::V2_0),
            "2.1" => Ok(XliffVersion::V2_1),
            "2.2" => Ok(XliffVersion::V2_2),
            other => Err(format!("unsupported XLIFF version: {other}")),
        }
    }
}

/// Where the converter and validator live and how they are driven.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterSettings {
    pub converter_program: PathBuf,
    pub validator_program: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    pub validate_output: bool,
}

impl Default for ConverterSettings {
    fn default() -> Self {
        Self {
            converter_program: PathBuf::from("convert"),
            validator_program: Some(PathBuf::from("xliffchecker")),
            catalog: None,
            validate_output: true,
        }
    }
}

/// One converter invocation. Optional flags are omitted when `None`/false.
#[derive(Debug, Clone)]
pub struct ConvertInvocation<'a> {
    pub source: &'a Path,
    pub source_lang: &'a str,
    pub target_lang: Option<&'a str>,
    pub xliff: Option<&'a Path>,
    pub format: Option<&'a str>,
    pub version: Option<XliffVersion>,
    pub paragraph: bool,
    pub embed: bool,
    pub catalog: Option<&'a Path>,
}

impl<'a> ConvertInvocation<'a> {
    pub fn for_task(task: &'a ConversionTask, catalog: Option<&'a Path>) -> Self {
        Self {
            source: &task.source_path,
            source_lang: &task.source_lang,
            target_lang: Some(&task.target_lang),
            xliff: Some(&task.xliff_abs_path),
            format: task.format.as_deref(),
            version: Some(task.xliff_version),
            paragraph: task.paragraph,
            embed: task.embed,
            catalog,
        }
    }

    /// Builds the argument vector in the converter's documented order.
    pub fn to_args(&self) -> Result<Vec<OsString>, ConversionError> {
        let mut args: Vec<OsString> = Vec::with_capacity(16);

        args.push("-file".into());
        args.push(checked_path("-file", self.source)?);
        args.push("-srcLang".into());
        args.push(checked_token("-srcLang", self.source_lang)?.into());
        if let Some(target) = self.target_lang {
            args.push("-tgtLang".into());
            args.push(checked_token("-tgtLang", target)?.into());
        }
        if let Some(xliff) = self.xliff {
            args.push("-xliff".into());
            args.push(checked_path("-xliff", xliff)?);
        }
        if let Some(format) = self.format {
            args.push("-type".into());
            args.push(checked_token("-type", format)?.into());
        }
        if let Some(version) = self.version {
            args.push(version.flag().into());
        }
        if self.paragraph {
            args.push("-paragraph".into());
        }
        if self.embed {
            args.push("-embed".into());
        }
        if let Some(catalog) = self.catalog {
            args.push("-catalog".into());
            args.push(checked_path("-catalog", catalog)?);
        }

        Ok(args)
    }
}

/// Arguments for validating a produced XLIFF file.
pub fn validate_args(xliff: &Path, catalog: Option<&Path>) -> Result<Vec<OsString>, ConversionError> {
    let mut args: Vec<OsString> = vec!["-xliff".into(), checked_path("-xliff", xliff)?];
    if let Some(catalog) = catalog {
        args.push("-catalog".into());
        args.push(checked_path("-catalog", catalog)?);
    }
    Ok(args)
}

// Locale tags and format names: letters, digits, '-', '_', never a leading '-'.
fn checked_token<'v>(name: &'static str, value: &'v str) -> Result<&'v str, ConversionError> {
    let trimmed = value.trim();
    let valid = !trimmed.is_empty()
        && !trimmed.starts_with('-')
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(trimmed)
    } else {
        Err(ConversionError::InvalidArgument {
            name,
            value: value.to_string(),
        })
    }
}

fn checked_path(name: &'static str, path: &Path) -> Result<OsString, ConversionError> {
    let display = path.to_string_lossy();
    if display.is_empty() || display.starts_with('-') {
        return Err(ConversionError::InvalidArgument {
            name,
            value: display.into_owned(),
        });
    }
    Ok(path.as_os_str().to_os_string())
}
