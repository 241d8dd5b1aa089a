pub mod ingest;
pub mod scaffold;

pub use ingest::{AssetDescriptor, AssetIngestor, IngestedAsset};
pub use scaffold::{
    discard_paths, CleanupReport, PathScaffolder, ScaffoldGuard, INSTRUCTIONS_DIR, PROJECT_SUBFOLDERS,
    REFERENCES_DIR, TRANSLATIONS_DIR,
};

use crate::error::StorageError;

/// Runs blocking filesystem work off the async executor.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, StorageError>
where
    F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::BlockingTask(e.to_string()))?
}
