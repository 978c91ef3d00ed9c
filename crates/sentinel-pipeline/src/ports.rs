//! External collaborator ports. The pipeline never talks to a backend
//! directly; adapters in `local` and in `sentinel-remote` implement these.

use crate::dispatch::BandTransform;
use async_trait::async_trait;
use bytes::Bytes;
use sentinel_core::{
    Destination, ImageryItem, ReportContent, ReportIntent, Result, Roi, SearchCriteria,
    WorkflowRun,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Imagery discovery: scenes over a region within a date window.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<ImageryItem>>;
}

/// Single-artifact download reference issued by the processing backend.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ArtifactReference {
    pub reference: String,
    pub filename: String,
}

/// One remote export submission.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportSpec {
    pub item_ids: Vec<String>,
    pub kernel_id: String,
    pub roi: Roi,
    pub destination: Destination,
    pub name_prefix: String,
    pub transform: BandTransform,
    pub bands: String,
    pub scale: u32,
}

#[async_trait]
pub trait ExportService: Send + Sync {
    async fn generate_artifact_reference(
        &self,
        item_id: &str,
        kernel_id: &str,
        roi: &Roi,
        name_prefix: &str,
    ) -> Result<ArtifactReference>;

    async fn fetch_artifact(&self, reference: &str) -> Result<Bytes>;

    /// Queue a batch export; returns one external task id per submitted item.
    async fn submit_batch(&self, spec: &ExportSpec) -> Result<Vec<String>>;
}

/// Result of asking the operator environment for a local write handle.
pub enum HandleOutcome {
    Granted(Box<dyn LocalHandle>),
    /// Refused by a permission or security policy. Triggers the client-save fallback.
    Denied(String),
    /// The operator cancelled the prompt.
    Declined,
}

impl std::fmt::Debug for HandleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Granted(h) => write!(f, "Granted({})", h.location()),
            Self::Denied(reason) => write!(f, "Denied({})", reason),
            Self::Declined => write!(f, "Declined"),
        }
    }
}

#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn acquire_handle(&self) -> Result<HandleOutcome>;
}

/// Write access to an operator-chosen location, valid for one batch.
#[async_trait]
pub trait LocalHandle: Send + Sync {
    async fn write(&self, filename: &str, bytes: Bytes) -> Result<PathBuf>;
    fn location(&self) -> String;
}

/// Client-side save of a single artifact (the browser-download analogue).
#[async_trait]
pub trait ClientSaver: Send + Sync {
    async fn save(&self, filename: &str, bytes: Bytes) -> Result<PathBuf>;
}

#[async_trait]
pub trait ReportSynthesizer: Send + Sync {
    async fn synthesize(&self, run: &WorkflowRun, intent: &ReportIntent) -> Result<ReportContent>;
}
