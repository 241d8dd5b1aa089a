//! Atomic project provisioning.

pub mod lifecycle;
pub mod orchestrator;
pub mod progress;
pub mod request;
pub mod state;

pub use lifecycle::{ConversionPlan, FileRemoval, IntegrityAlert, ProjectRemoval};
pub use orchestrator::ProvisioningOrchestrator;
pub use progress::{BroadcastProgress, NoopProgress, ProvisionEvent, ProvisionProgress, ProvisionProgressEvent};
pub use request::{AddAssetsRequest, ProvisionFailure, ProvisionOutcome, ProvisionRequest};
pub use state::ProvisionState;
