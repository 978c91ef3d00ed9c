//! Sentinel configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    /// Batch export pacing and naming.
    pub pipeline: PipelineConfig,
    /// Kernel audit bounds.
    pub audit: AuditConfig,
    /// Workflow engine pacing.
    pub workflow: WorkflowConfig,
    /// Execution history.
    pub history: HistoryConfig,
    /// Telemetry log window.
    pub telemetry: TelemetryConfig,
    /// Durable local storage.
    pub storage: StorageConfig,
    /// Remote processing backend.
    pub services: ServicesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Prefix of every exported artifact name.
    pub experiment_name: String,
    /// Fixed delay between dispatcher calls, respecting backend rate limits.
    pub inter_item_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Upper bound on one audit call. Elapsed audits count as rejections.
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Default workflow name.
    pub name: String,
    /// Settle time of Input and Output nodes.
    pub settle_ms: u64,
    /// Pacing between per-item metrics at Process/Analysis nodes.
    pub per_item_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Max snapshots retained. Oldest is evicted on overflow.
    pub capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Entries retained in memory for late readers.
    pub buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Kernel and history collections.
    pub data_dir: PathBuf,
    /// Target of the local-save write handle.
    pub export_dir: PathBuf,
    /// Target of the per-item client-side save fallback.
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub base_url: String,
    /// Bearer token. `SENTINEL_API_KEY` takes precedence.
    pub api_key: Option<String>,
    /// Per-request timeout for discovery, export and report calls.
    pub request_timeout_ms: u64,
}

// ============================================================
// Defaults
// ============================================================

fn sentinel_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".sentinel")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            experiment_name: "sentinel".into(),
            inter_item_delay_ms: 1_500,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { timeout_ms: 20_000 }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: "Untitled Workflow".into(),
            settle_ms: 600,
            per_item_ms: 50,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 20 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { buffer: 100 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let home = sentinel_home();
        Self {
            data_dir: home.join("data"),
            export_dir: home.join("exports"),
            download_dir: dirs::download_dir().unwrap_or_else(|| home.join("downloads")),
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".into(),
            api_key: None,
            request_timeout_ms: 60_000,
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl SentinelConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        };
        if let Ok(key) = std::env::var("SENTINEL_API_KEY") {
            if !key.trim().is_empty() {
                config.services.api_key = Some(key.trim().to_string());
            }
        }
        config
    }

    /// Default path: ~/.sentinel/sentinel.toml
    pub fn default_path() -> PathBuf {
        sentinel_home().join("sentinel.toml")
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Zero delays everywhere. Used by tests and dry runs.
    pub fn without_delays(mut self) -> Self {
        self.pipeline.inter_item_delay_ms = 0;
        self.workflow.settle_ms = 0;
        self.workflow.per_item_ms = 0;
        self
    }
}

impl PipelineConfig {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }
}

impl AuditConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl WorkflowConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn per_item(&self) -> Duration {
        Duration::from_millis(self.per_item_ms)
    }
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
