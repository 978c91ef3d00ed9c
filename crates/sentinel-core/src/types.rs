//! Core types for Sentinel: kernels, imagery, tasks, workflow nodes and run snapshots.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

/// Who authored a kernel. System kernels ship with the binary and never change.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Author {
    System,
    User,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Persistence {
    Ephemeral,
    Persisted,
}

/// Audit state of a kernel. Only `Valid` kernels are selectable for dispatch.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    Valid,
    Invalid,
    Unsupported,
    Testing,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Invalid => write!(f, "invalid"),
            Self::Unsupported => write!(f, "unsupported"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// A named unit of per-image processing logic.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AlgorithmKernel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub code: String,
    pub author: Author,
    pub persistence: Persistence,
    pub validation: Validation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_audit_reason: Option<String>,
}

impl AlgorithmKernel {
    /// A built-in kernel: System-authored, Persisted and always Valid.
    pub fn system(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            code: code.into(),
            author: Author::System,
            persistence: Persistence::Persisted,
            validation: Validation::Valid,
            last_audit_reason: None,
        }
    }

    /// A freshly audited user kernel. Starts Ephemeral until explicitly saved.
    pub fn user(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        code: impl Into<String>,
        audit_reason: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            code: code.into(),
            author: Author::User,
            persistence: Persistence::Ephemeral,
            validation: Validation::Valid,
            last_audit_reason: audit_reason,
        }
    }

    pub fn is_system(&self) -> bool {
        self.author == Author::System
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence == Persistence::Persisted
    }

    pub fn is_selectable(&self) -> bool {
        self.validation == Validation::Valid
    }
}

// ---------------------------------------------------------------------------
// Imagery
// ---------------------------------------------------------------------------

/// Region of interest: a closed polygon of `[lng, lat]` vertices.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Roi {
    pub coordinates: Vec<[f64; 2]>,
}

impl Roi {
    pub fn new(coordinates: Vec<[f64; 2]>) -> Self {
        Self { coordinates }
    }

    /// Axis-aligned rectangle, closed back onto its first vertex.
    pub fn rectangle(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self::new(vec![
            [west, south],
            [east, south],
            [east, north],
            [west, north],
            [west, south],
        ])
    }

    /// Parse a GeoJSON Feature, FeatureCollection (first feature) or Polygon geometry.
    pub fn from_geojson(value: &serde_json::Value) -> Result<Self> {
        let geometry = match value.get("type").and_then(|t| t.as_str()) {
            Some("FeatureCollection") => value
                .get("features")
                .and_then(|f| f.get(0))
                .and_then(|f| f.get("geometry")),
            Some("Feature") => value.get("geometry"),
            _ => Some(value),
        }
        .ok_or_else(|| Error::InvalidInput("geojson has no geometry".into()))?;

        let rings = geometry
            .get("coordinates")
            .ok_or_else(|| Error::InvalidInput("geometry has no coordinates".into()))?;
        // Accept a bare ring as well as a polygon's ring list.
        let ring = match rings.get(0).and_then(|r| r.get(0)) {
            Some(first) if first.is_array() => &rings[0],
            _ => rings,
        };
        let coordinates: Vec<[f64; 2]> = serde_json::from_value(ring.clone())?;
        Ok(Self::new(coordinates))
    }

    /// A usable polygon has at least three distinct vertices and closes on itself.
    pub fn is_closed(&self) -> bool {
        self.coordinates.len() >= 4 && self.coordinates.first() == self.coordinates.last()
    }
}

/// One scene returned by the imagery discovery service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageryItem {
    pub id: String,
    pub date: NaiveDate,
    pub cloud_cover: f64,
    #[serde(default)]
    pub bounds: Vec<[f64; 2]>,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tile_id: Option<String>,
    /// Set only after this item's export succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl ImageryItem {
    pub fn new(id: impl Into<String>, date: NaiveDate, cloud_cover: f64) -> Self {
        Self {
            id: id.into(),
            date,
            cloud_cover,
            bounds: Vec::new(),
            thumbnail: String::new(),
            tile_id: None,
            local_path: None,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.local_path.is_some()
    }
}

/// Parameters of one discovery query.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    pub roi: Roi,
    pub cloud_max: f64,
    pub coverage_min: f64,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Export destination strategy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    LocalSave,
    RemoteDrive,
    RemoteAsset,
    RemoteBucket,
}

impl Destination {
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::LocalSave)
    }

    /// Wire name used by the batch-export queue.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalSave => "LOCAL",
            Self::RemoteDrive => "DRIVE",
            Self::RemoteAsset => "ASSET",
            Self::RemoteBucket => "BUCKET",
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Destination {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" | "local_save" => Ok(Self::LocalSave),
            "drive" | "remote_drive" => Ok(Self::RemoteDrive),
            "asset" | "remote_asset" => Ok(Self::RemoteAsset),
            "bucket" | "remote_bucket" | "gcs" => Ok(Self::RemoteBucket),
            other => Err(Error::InvalidInput(format!("unknown destination: {}", other))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Export(Destination),
    Workflow,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Export(dest) => write!(f, "EXPORT:{}", dest),
            Self::Workflow => write!(f, "WORKFLOW"),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// One dispatched batch job. Terminal states are final: once Completed or
/// Failed, every mutator is a no-op that returns `false`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub succeeded: usize,
    pub failed: usize,
}

impl Task {
    pub fn new(name: impl Into<String>, kind: TaskKind) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("GE-{}", &id[..8]),
            name: name.into(),
            kind,
            status: TaskStatus::Pending,
            progress: 0.0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            succeeded: 0,
            failed: 0,
        }
    }

    pub fn start(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Record progress after `completed` of `total` attempts resolved.
    /// Progress never moves backwards.
    pub fn advance(&mut self, completed: usize, total: usize) -> bool {
        if self.status != TaskStatus::Running || total == 0 {
            return false;
        }
        let pct = if completed >= total {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        if pct > self.progress {
            self.progress = pct;
        }
        true
    }

    pub fn record_outcome(&mut self, ok: bool) {
        if self.status.is_terminal() {
            return;
        }
        if ok {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn complete(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
        true
    }
}

// ---------------------------------------------------------------------------
// Workflow graph
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    Input,
    Process,
    Analysis,
    Output,
}

impl NodeType {
    /// Process and Analysis stages compute one metric per linked item.
    pub fn computes_metrics(&self) -> bool {
        matches!(self, Self::Process | Self::Analysis)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_kernel: Option<String>,
    /// Output nodes only: where the run snapshot is also written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type,
            status: NodeStatus::Idle,
            linked_kernel: None,
            output_path: None,
        }
    }

    pub fn with_kernel(mut self, kernel_id: impl Into<String>) -> Self {
        self.linked_kernel = Some(kernel_id.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Run snapshots
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    pub date_range: String,
    pub cloud_cover: f64,
    pub min_coverage: f64,
    pub scene_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KernelConfig {
    pub algo_name: String,
    pub algo_desc: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Immutable record of one completed workflow pass.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    pub run_id: String,
    pub workflow_name: String,
    pub timestamp: DateTime<Utc>,
    pub search_config: SearchConfig,
    pub kernel_config: KernelConfig,
    pub node_labels: Vec<String>,
    pub trend_series: Vec<TrendPoint>,
}

impl WorkflowRun {
    pub fn summary_line(&self) -> String {
        format!(
            "| {} | {} | {} | {} nodes | {} points |",
            self.run_id,
            self.workflow_name,
            self.timestamp.format("%Y-%m-%dT%H:%M:%S"),
            self.node_labels.len(),
            self.trend_series.len(),
        )
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Free-text operator intent forwarded alongside a snapshot.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportIntent {
    pub target_area: String,
    pub background: String,
    pub objective: String,
    pub focus: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportContent {
    pub brief: String,
    pub detailed: String,
}
