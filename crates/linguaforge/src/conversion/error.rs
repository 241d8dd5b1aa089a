use std::path::PathBuf;

use thiserror::Error;

/// Errors raised before or around a converter process, as opposed to
/// failures the converter itself reports.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidArgument { name: &'static str, value: String },

    #[error("No program configured for {0}")]
    NotConfigured(&'static str),

    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare output directory '{path}': {source}")]
    PrepareOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for converter process: {0}")]
    Wait(#[source] std::io::Error),
}
