//! Row types and write arguments for the project store.

use std::fmt;
use std::str::FromStr;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job type used for seeded XLIFF conversion jobs.
pub const XLIFF_CONVERSION_JOB: &str = "xliff_conversion";

/// Artifact type produced by the converter.
pub const XLIFF_ARTIFACT: &str = "xliff";

/// Ordered (source, target) locale combination. Locales are stored trimmed;
/// `new` and deserialization trim for you.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagePair {
    #[serde(deserialize_with = "trimmed")]
    pub source_lang: String,
    #[serde(deserialize_with = "trimmed")]
    pub target_lang: String,
}

fn trimmed<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = String::deserialize(deserializer)?;
    Ok(value.trim().to_string())
}

impl LanguagePair {
    pub fn new(source_lang: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            source_lang: source_lang.into().trim().to_string(),
            target_lang: target_lang.into().trim().to_string(),
        }
    }

    /// Copy with both locales trimmed, for pairs built field by field.
    pub fn normalized(&self) -> Self {
        Self::new(self.source_lang.as_str(), self.target_lang.as_str())
    }

    /// Trims every pair, keeping order.
    pub fn normalize_all(pairs: &[LanguagePair]) -> Vec<LanguagePair> {
        pairs.iter().map(LanguagePair::normalized).collect()
    }

    /// Folder name under `Translations/` holding this pair's outputs.
    pub fn dir_name(&self) -> String {
        crate::sanitize::language_pair_dir_name(&self.source_lang, &self.target_lang)
    }
}

impl fmt::Display for LanguagePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}→{}", self.source_lang, self.target_lang)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Draft,
    #[default]
    Active,
    OnHold,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "active" => Ok(ProjectStatus::Active),
            "on_hold" => Ok(ProjectStatus::OnHold),
            "completed" => Ok(ProjectStatus::Completed),
            "archived" => Ok(ProjectStatus::Archived),
            other => Err(format!("unknown project status '{other}'")),
        }
    }
}

/// Role of a file inside a project. Only processable files are converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    Processable,
    Reference,
    Instructions,
    Image,
    Ocr,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::Processable => "processable",
            FileRole::Reference => "reference",
            FileRole::Instructions => "instructions",
            FileRole::Image => "image",
            FileRole::Ocr => "ocr",
        }
    }

    /// Processable files must carry at least one language pair.
    pub fn requires_language_pairs(&self) -> bool {
        matches!(self, FileRole::Processable)
    }
}

impl FromStr for FileRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processable" => Ok(FileRole::Processable),
            "reference" => Ok(FileRole::Reference),
            "instructions" => Ok(FileRole::Instructions),
            "image" => Ok(FileRole::Image),
            "ocr" => Ok(FileRole::Ocr),
            other => Err(format!("unknown file role '{other}'")),
        }
    }
}

/// Lifecycle shared by artifacts and jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Running => "running",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
            WorkStatus::Cancelled => "cancelled",
        }
    }

    /// Writing the current status again is always allowed.
    pub fn can_transition_to(&self, next: WorkStatus) -> bool {
        use WorkStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Pending, Running)
                    | (Pending, Cancelled)
                    | (Running, Completed)
                    | (Running, Failed)
                    | (Running, Cancelled)
                    | (Failed, Pending)
                    | (Cancelled, Pending)
            )
    }
}

impl FromStr for WorkStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkStatus::Pending),
            "running" => Ok(WorkStatus::Running),
            "completed" => Ok(WorkStatus::Completed),
            "failed" => Ok(WorkStatus::Failed),
            "cancelled" => Ok(WorkStatus::Cancelled),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Enums are stored as their text form.
impl ToSql for ProjectStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl ToSql for FileRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl ToSql for WorkStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

fn parse_text<T: FromStr<Err = String>>(value: ValueRef<'_>) -> FromSqlResult<T> {
    value
        .as_str()?
        .parse()
        .map_err(|e: String| FromSqlError::Other(e.into()))
}

impl FromSql for ProjectStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl FromSql for FileRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

impl FromSql for WorkStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        parse_text(value)
    }
}

/// Reads a TEXT column holding a hyphenated UUID.
pub(crate) fn uuid_column(row: &Row<'_>, column: &str) -> rusqlite::Result<Uuid> {
    let text: String = row.get(column)?;
    Uuid::parse_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Current time in the format used by every timestamp column.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    pub project_id: Uuid,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: ProjectStatus,
    pub owner_id: String,
    pub client_id: Option<String>,
    pub project_type: String,
    pub notes: Option<String>,
    /// Directory under the projects root; absent for rows created without one.
    pub folder_name: Option<String>,
}

impl ProjectRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_id: uuid_column(row, "project_id")?,
            name: row.get("name")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            status: row.get("status")?,
            owner_id: row.get("owner_id")?,
            client_id: row.get("client_id")?,
            project_type: row.get("project_type")?,
            notes: row.get("notes")?,
            folder_name: row.get("folder_name")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfoRecord {
    pub file_id: Uuid,
    pub ext: String,
    pub kind: FileRole,
    pub size_bytes: i64,
    pub segment_count: Option<i64>,
    pub token_count: Option<i64>,
    pub notes: Option<String>,
}

impl FileInfoRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            file_id: uuid_column(row, "file_id")?,
            ext: row.get("ext")?,
            kind: row.get("kind")?,
            size_bytes: row.get("size_bytes")?,
            segment_count: row.get("segment_count")?,
            token_count: row.get("token_count")?,
            notes: row.get("notes")?,
        })
    }
}

/// Association of a shared file with one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFileLink {
    pub project_id: Uuid,
    pub file_id: Uuid,
    pub filename: String,
    /// Path relative to the project root, `/`-separated.
    pub stored_at: String,
    pub stored_on: String,
    pub role: FileRole,
}

impl ProjectFileLink {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_id: uuid_column(row, "project_id")?,
            file_id: uuid_column(row, "file_id")?,
            filename: row.get("filename")?,
            stored_at: row.get("stored_at")?,
            stored_on: row.get("stored_on")?,
            role: row.get("role")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub artifact_id: Uuid,
    pub project_id: Uuid,
    pub file_id: Uuid,
    pub artifact_type: String,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub rel_path: Option<String>,
    pub size_bytes: Option<i64>,
    pub segment_count: Option<i64>,
    pub token_count: Option<i64>,
    pub status: WorkStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl ArtifactRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            artifact_id: uuid_column(row, "artifact_id")?,
            project_id: uuid_column(row, "project_id")?,
            file_id: uuid_column(row, "file_id")?,
            artifact_type: row.get("artifact_type")?,
            source_lang: row.get("source_lang")?,
            target_lang: row.get("target_lang")?,
            rel_path: row.get("rel_path")?,
            size_bytes: row.get("size_bytes")?,
            segment_count: row.get("segment_count")?,
            token_count: row.get("token_count")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub artifact_id: Uuid,
    pub job_type: String,
    pub project_id: Uuid,
    pub status: WorkStatus,
    pub error_log: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl JobRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            artifact_id: uuid_column(row, "artifact_id")?,
            job_type: row.get("job_type")?,
            project_id: uuid_column(row, "project_id")?,
            status: row.get("status")?,
            error_log: row.get("error_log")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFileBundle {
    pub link: ProjectFileLink,
    pub info: FileInfoRecord,
    pub language_pairs: Vec<LanguagePair>,
    pub artifacts: Vec<ArtifactRecord>,
}

/// A project with every child row, as read back after a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBundle {
    pub project: ProjectRecord,
    pub subjects: Vec<String>,
    pub language_pairs: Vec<LanguagePair>,
    pub files: Vec<ProjectFileBundle>,
    pub jobs: Vec<JobRecord>,
}

impl ProjectBundle {
    pub fn has_language_pair(&self, pair: &LanguagePair) -> bool {
        self.language_pairs.contains(pair)
    }

    pub fn file(&self, file_id: Uuid) -> Option<&ProjectFileBundle> {
        self.files.iter().find(|f| f.link.file_id == file_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    pub owner_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    pub project_type: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    pub language_pairs: Vec<LanguagePair>,
    #[serde(default)]
    pub folder_name: Option<String>,
}

/// Partial project update. `None` leaves a field untouched; the nested
/// options clear nullable columns with `Some(None)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub status: Option<ProjectStatus>,
    pub owner_id: Option<String>,
    pub client_id: Option<Option<String>>,
    pub project_type: Option<String>,
    pub notes: Option<Option<String>>,
    pub subjects: Option<Vec<String>>,
    pub language_pairs: Option<Vec<LanguagePair>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFileInfo {
    pub file_id: Uuid,
    pub ext: String,
    pub kind: FileRole,
    pub size_bytes: i64,
    #[serde(default)]
    pub segment_count: Option<i64>,
    #[serde(default)]
    pub token_count: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProjectFile {
    pub filename: String,
    pub stored_at: String,
    pub role: FileRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArtifact {
    pub artifact_id: Uuid,
    pub project_id: Uuid,
    pub file_id: Uuid,
    pub artifact_type: String,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub rel_path: Option<String>,
    pub status: WorkStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStatusUpdate {
    pub artifact_id: Uuid,
    pub status: WorkStatus,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub segment_count: Option<i64>,
    #[serde(default)]
    pub token_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub artifact_id: Uuid,
    pub job_type: String,
    pub project_id: Uuid,
    pub status: WorkStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusUpdate {
    pub artifact_id: Uuid,
    pub job_type: String,
    pub status: WorkStatus,
    #[serde(default)]
    pub error_log: Option<String>,
}
