use serde::{Deserialize, Serialize};

/// Steps of a provisioning run, in order, plus the two failure ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionState {
    Validating,
    ScaffoldingDirectories,
    PersistingProject,
    IngestingAssets,
    SeedingConversionJobs,
    Committed,
    RolledBack,
    Failed,
}

impl ProvisionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProvisionState::Committed | ProvisionState::RolledBack | ProvisionState::Failed
        )
    }
}

impl std::fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionState::Validating => write!(f, "Validating"),
            ProvisionState::ScaffoldingDirectories => write!(f, "Scaffolding directories"),
            ProvisionState::PersistingProject => write!(f, "Persisting project"),
            ProvisionState::IngestingAssets => write!(f, "Ingesting assets"),
            ProvisionState::SeedingConversionJobs => write!(f, "Seeding conversion jobs"),
            ProvisionState::Committed => write!(f, "Committed"),
            ProvisionState::RolledBack => write!(f, "Rolled back"),
            ProvisionState::Failed => write!(f, "Failed"),
        }
    }
}
