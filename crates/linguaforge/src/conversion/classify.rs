//! Maps converter exit status and output onto a fixed set of outcomes.
//!
//! Classification is a pure function of its input, so the same output
//! always yields the same kind.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ConversionError;
use crate::error::ForgeError;

/// Converter failures with a recognized signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingArgument,
    MissingSourceFile,
    MalformedXml,
    MissingResources,
    PermissionDenied,
    CatalogNotFound,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::MissingArgument => "missing_argument",
            FailureKind::MissingSourceFile => "missing_source_file",
            FailureKind::MalformedXml => "malformed_xml",
            FailureKind::MissingResources => "missing_resources",
            FailureKind::PermissionDenied => "permission_denied",
            FailureKind::CatalogNotFound => "catalog_not_found",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            FailureKind::MissingArgument => {
                "The converter was called without a required setting. Check the project languages."
            }
            FailureKind::MissingSourceFile => "The source document could not be found.",
            FailureKind::MalformedXml => "The document or its XLIFF output is not well-formed XML.",
            FailureKind::MissingResources => {
                "The converter is missing runtime resources. Reinstall or repair the converter."
            }
            FailureKind::PermissionDenied => {
                "The converter was not allowed to read or write a required file."
            }
            FailureKind::CatalogNotFound => "The XML catalog used for validation was not found.",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized result of one converter or validator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Success,
    KnownFailure { kind: FailureKind, message: String },
    UnknownFailure { message: String },
    Cancelled,
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success)
    }

    /// Text stored in a job's error log; `None` for success.
    pub fn error_log(&self) -> Option<String> {
        match self {
            ConversionOutcome::Success => None,
            ConversionOutcome::KnownFailure { kind, message } => Some(format!("{kind}: {message}")),
            ConversionOutcome::UnknownFailure { message } => Some(format!("unknown: {message}")),
            ConversionOutcome::Cancelled => Some("cancelled".to_string()),
        }
    }

    /// The crate error for a non-successful outcome.
    pub fn to_error(&self) -> Option<ForgeError> {
        match self {
            ConversionOutcome::Success => None,
            ConversionOutcome::KnownFailure { kind, message } => Some(ForgeError::ConversionKnown {
                kind: *kind,
                message: message.clone(),
            }),
            ConversionOutcome::UnknownFailure { message } => {
                Some(ForgeError::ConversionUnknown(message.clone()))
            }
            ConversionOutcome::Cancelled => Some(ForgeError::Cancelled),
        }
    }

    /// Outcome for a process that could not be run at all.
    pub fn from_error(err: &ConversionError) -> Self {
        match err {
            ConversionError::Spawn { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                ConversionOutcome::KnownFailure {
                    kind: FailureKind::MissingResources,
                    message: err.to_string(),
                }
            }
            ConversionError::Spawn { source, .. }
                if source.kind() == std::io::ErrorKind::PermissionDenied =>
            {
                ConversionOutcome::KnownFailure {
                    kind: FailureKind::PermissionDenied,
                    message: err.to_string(),
                }
            }
            other => ConversionOutcome::UnknownFailure {
                message: other.to_string(),
            },
        }
    }
}

// Checked in order; the first match wins.
static SIGNATURES: LazyLock<Vec<(FailureKind, Regex)>> = LazyLock::new(|| {
    let table: [(FailureKind, &str); 6] = [
        (
            FailureKind::CatalogNotFound,
            r"(?i)catalog.*(not found|does not exist|cannot be (found|read)|missing)",
        ),
        (
            FailureKind::MissingArgument,
            r#"(?i)missing\s+['"]?-\w+['"]?\s+param|missing (required )?(parameter|argument)|(parameter|argument) ['"]?-\w+['"]? (is )?(required|missing)"#,
        ),
        (
            FailureKind::PermissionDenied,
            r"(?i)permission denied|access (is )?denied|AccessDeniedException|operation not permitted",
        ),
        (
            FailureKind::MalformedXml,
            r"(?i)SAXParseException|not well-formed|malformed|XML document structures must|content is not allowed in prolog|premature end of file",
        ),
        (
            FailureKind::MissingResources,
            r"(?i)NoClassDefFoundError|ClassNotFoundException|UnsatisfiedLinkError|could not (find or load|find|load) (the )?(srx|resource|filter|configuration|main class)|missing (srx|resource)|unable to (load|locate) (srx|resource|filter)|java(\.exe)?: (command )?not found|no java runtime",
        ),
        (
            FailureKind::MissingSourceFile,
            r"(?i)FileNotFoundException|no such file or directory|file\b.*\b(does not exist|not found|cannot be found)",
        ),
    ];
    table
        .into_iter()
        .filter_map(|(kind, pattern)| Regex::new(pattern).ok().map(|re| (kind, re)))
        .collect()
});

static ERROR_TOKEN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(ERROR|FATAL)\b|Exception\b").ok());

/// Returns the failure kind whose signature appears in `line`.
pub fn match_signature(line: &str) -> Option<FailureKind> {
    SIGNATURES
        .iter()
        .find(|(_, re)| re.is_match(line))
        .map(|(kind, _)| *kind)
}

fn has_error_token(line: &str) -> bool {
    ERROR_TOKEN
        .as_ref()
        .map(|re| re.is_match(line))
        .unwrap_or(false)
}

fn first_non_empty(lines: &[String]) -> Option<&str> {
    lines.iter().map(|l| l.trim()).find(|l| !l.is_empty())
}

fn known_failure(lines: &[String]) -> Option<ConversionOutcome> {
    lines.iter().find_map(|line| {
        match_signature(line).map(|kind| ConversionOutcome::KnownFailure {
            kind,
            message: line.trim().to_string(),
        })
    })
}

/// Classifies a finished invocation. `exit_code` is `None` when the process
/// was terminated by a signal.
pub fn classify(exit_code: Option<i32>, stdout: &[String], stderr: &[String]) -> ConversionOutcome {
    if let Some(outcome) = known_failure(stderr) {
        return outcome;
    }

    let exited_cleanly = exit_code == Some(0);
    if !exited_cleanly {
        if let Some(outcome) = known_failure(stdout) {
            return outcome;
        }
    }

    if !exited_cleanly || stderr.iter().any(|l| has_error_token(l)) {
        let message = first_non_empty(stderr)
            .or_else(|| first_non_empty(stdout))
            .map(str::to_string)
            .unwrap_or_else(|| match exit_code {
                Some(code) => format!("converter exited with status {code}"),
                None => "converter terminated by signal".to_string(),
            });
        return ConversionOutcome::UnknownFailure { message };
    }

    ConversionOutcome::Success
}
