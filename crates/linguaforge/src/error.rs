use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::conversion::{ConversionError, FailureKind};
use crate::db::DatabaseError;

/// Crate-wide error. Each variant maps onto one stable [`ErrorKind`].
#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] StorageError),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Storage failure: {0}")]
    Storage(#[source] DatabaseError),

    #[error("Conversion failed ({kind}): {message}")]
    ConversionKnown { kind: FailureKind, message: String },

    #[error("Conversion failed: {0}")]
    ConversionUnknown(String),

    #[error("Failed to ingest asset '{draft_id}': {source}")]
    PartialIngestion {
        draft_id: String,
        #[source]
        source: StorageError,
    },

    #[error("Converter invocation failed: {0}")]
    Runner(#[from] ConversionError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl From<DatabaseError> for ForgeError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::ConstraintViolation(message) => ForgeError::ConstraintViolation(message),
            other => ForgeError::Storage(other),
        }
    }
}

/// Stable classification surfaced to callers and persisted in job logs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    FilesystemError,
    ConstraintViolation,
    StorageFailure,
    ConversionKnownFailure,
    ConversionUnknownFailure,
    PartialIngestionFailure,
    Cancelled,
    ConfigurationError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::FilesystemError => "filesystem_error",
            ErrorKind::ConstraintViolation => "constraint_violation",
            ErrorKind::StorageFailure => "storage_failure",
            ErrorKind::ConversionKnownFailure => "conversion_known_failure",
            ErrorKind::ConversionUnknownFailure => "conversion_unknown_failure",
            ErrorKind::PartialIngestionFailure => "partial_ingestion_failure",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ConfigurationError => "configuration_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ForgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ForgeError::Validation(_) => ErrorKind::ValidationError,
            ForgeError::Filesystem(StorageError::InvalidName { .. }) => ErrorKind::ValidationError,
            ForgeError::Filesystem(_) => ErrorKind::FilesystemError,
            ForgeError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            ForgeError::Storage(_) => ErrorKind::StorageFailure,
            ForgeError::ConversionKnown { .. } => ErrorKind::ConversionKnownFailure,
            ForgeError::ConversionUnknown(_) => ErrorKind::ConversionUnknownFailure,
            ForgeError::PartialIngestion { .. } => ErrorKind::PartialIngestionFailure,
            ForgeError::Runner(ConversionError::InvalidArgument { .. }) => {
                ErrorKind::ValidationError
            }
            ForgeError::Runner(_) => ErrorKind::ConversionUnknownFailure,
            ForgeError::Cancelled => ErrorKind::Cancelled,
            ForgeError::Config(_) => ErrorKind::ConfigurationError,
        }
    }

    /// Message suitable for end users. Raw converter output is never included.
    pub fn user_message(&self) -> String {
        match self {
            ForgeError::ConversionKnown { kind, .. } => kind.user_message().to_string(),
            ForgeError::ConversionUnknown(_) | ForgeError::Runner(_) => {
                "The converter reported an unexpected error. Check the job log for details."
                    .to_string()
            }
            ForgeError::Storage(_) => {
                "The project database could not be updated. No changes were saved.".to_string()
            }
            ForgeError::PartialIngestion { draft_id, source } => {
                format!("Could not copy asset '{draft_id}': {source}")
            }
            ForgeError::Cancelled => "The operation was cancelled.".to_string(),
            other => other.to_string(),
        }
    }

    /// Unknown converter failures are surfaced for manual review rather than retried.
    pub fn needs_review(&self) -> bool {
        self.kind() == ErrorKind::ConversionUnknownFailure
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse settings JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Failed to parse settings YAML: {0}")]
    ParseYaml(#[from] serde_yaml::Error),

    #[error("Settings validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    RemovePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy file from '{from}' to '{to}': {source}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read metadata for '{path}': {source}")]
    ReadMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Source is not a regular file: {0}")]
    NotAFile(PathBuf),

    #[error("A file or folder named '{}' already exists", .0.display())]
    DestinationExists(PathBuf),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("No folder found for project {0}")]
    ProjectFolderMissing(Uuid),

    #[error("'{}' is not a project folder", .0.display())]
    OutsideProjectsRoot(PathBuf),

    #[error("Blocking filesystem task failed: {0}")]
    BlockingTask(String),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
