pub mod config;
pub mod conversion;
pub mod db;
pub mod error;
pub mod provision;
pub mod sanitize;
pub mod storage;
pub mod telemetry;

pub use config::{load_settings, load_settings_from_str, Settings, SettingsFormat};
pub use conversion::{
    ConversionOptions, ConversionOutcome, ConversionRunner, ConversionTask, ConverterSettings,
    FailureKind, OutputSink, TaskReport, XliffVersion,
};
pub use db::{Database, DatabaseError, ProjectStore};
pub use error::{ConfigError, ErrorKind, ForgeError, Result, StorageError};
pub use provision::{
    AddAssetsRequest, ConversionPlan, ProvisionFailure, ProvisionOutcome, ProvisionRequest,
    ProvisionState, ProvisioningOrchestrator,
};
pub use storage::{AssetDescriptor, AssetIngestor, PathScaffolder};

/// Owner id used by single-user local installs. It is an ordinary value:
/// nothing seeds or assumes it.
pub const LOCAL_OWNER_ID: &str = "local-user";
