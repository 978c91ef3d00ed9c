//! sentinel-pipeline — batch export, workflow execution and their orchestration.

pub mod dispatch;
pub mod local;
pub mod metric;
pub mod orchestrator;
pub mod ports;
pub mod workflow;

pub use dispatch::{
    artifact_name, BandTransform, BatchSession, ExportDispatcher, ItemError, ItemStage,
    ItemSuccess, EXPORT_SCALE_M,
};
pub use local::{DirectoryStorage, DownloadsSaver};
pub use metric::{HashMetric, MetricComputer};
pub use orchestrator::{BatchReport, DispatchRequest, ItemReport, Orchestrator, PipelineServices};
pub use ports::{
    ArtifactReference, ClientSaver, DiscoveryService, ExportService, ExportSpec, HandleOutcome,
    LocalHandle, LocalStorage, ReportSynthesizer,
};
pub use workflow::{NodeProgress, RunContext, WorkflowDefinition, WorkflowEngine, DEFAULT_KERNEL};
