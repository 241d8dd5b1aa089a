//! XLIFF conversion: planning, argument building, process execution and
//! failure classification.

pub mod classify;
pub mod command;
pub mod error;
pub mod plan;
pub mod runner;
pub mod sink;

pub use classify::{classify, ConversionOutcome, FailureKind};
pub use command::{ConverterSettings, XliffVersion};
pub use error::ConversionError;
pub use plan::{
    artifact_id_for, pair_directories, plan_conversions, plan_for_bundle, ConversionOptions,
    ConversionTask,
};
pub use runner::{ConversionRunner, TaskReport};
pub use sink::{BroadcastSink, ConversionOutputEvent, NoopSink, OutputSink, OutputStream, TracingSink};
