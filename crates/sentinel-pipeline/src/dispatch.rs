//! Export dispatcher — destination-specific side effects for one batch.
//!
//! LocalSave acquires a write handle once per batch. A denied handle flips
//! the whole batch into the client-save fallback, still attempted per item.
//! Remote destinations submit one export spec per item to the batch queue.

use crate::ports::{
    ClientSaver, ExportService, ExportSpec, HandleOutcome, LocalHandle, LocalStorage,
};
use chrono::NaiveDate;
use sentinel_core::{AlgorithmKernel, Destination, Error, ImageryItem, Result, Roi, TelemetryLog};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Export resolution in metres.
pub const EXPORT_SCALE_M: u32 = 10;

/// Band/index transform applied before a remote export.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BandTransform {
    Ndvi,
    Ndwi,
    Ndbi,
    TrueColor,
}

impl BandTransform {
    /// Keyword match on the kernel id, then its name. No match is true color.
    pub fn for_kernel(kernel: &AlgorithmKernel) -> Self {
        [kernel.id.as_str(), kernel.name.as_str()]
            .iter()
            .find_map(|s| Self::from_keyword(s))
            .unwrap_or(Self::TrueColor)
    }

    fn from_keyword(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase();
        if s.contains("ndvi") || s.contains("veg") {
            Some(Self::Ndvi)
        } else if s.contains("ndwi") || s.contains("water") {
            Some(Self::Ndwi)
        } else if s.contains("ndbi") || s.contains("urban") {
            Some(Self::Ndbi)
        } else {
            None
        }
    }

    pub fn expression(&self) -> &'static str {
        match self {
            Self::Ndvi => "(B8-B4)/(B8+B4)",
            Self::Ndwi => "(B3-B8)/(B3+B8)",
            Self::Ndbi => "(B11-B8)/(B11+B8)",
            Self::TrueColor => "B4,B3,B2",
        }
    }
}

/// `<experiment>_<YYYYMMDD>_<suffix>`, suffix taken from the item id tail.
pub fn artifact_name(experiment: &str, date: NaiveDate, item_id: &str) -> String {
    let prefix: String = experiment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let segment = item_id.rsplit('/').next().unwrap_or(item_id);
    let suffix = segment.rsplit('_').next().unwrap_or(segment);
    format!("{}_{}_{}", prefix, date.format("%Y%m%d"), suffix)
}

#[derive(Clone, Debug, PartialEq)]
pub struct ItemSuccess {
    pub local_path: Option<PathBuf>,
    pub external_task_id: Option<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStage {
    Reference,
    Fetch,
    Save,
    Submit,
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Fetch => write!(f, "fetch"),
            Self::Save => write!(f, "save"),
            Self::Submit => write!(f, "submit"),
        }
    }
}

/// Failure of one item. Absorbed by the orchestrator, never propagated.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[error("{stage} failed: {message}")]
pub struct ItemError {
    pub stage: ItemStage,
    pub message: String,
}

impl ItemError {
    fn at(stage: ItemStage) -> impl FnOnce(Error) -> Self {
        move |e| Self {
            stage,
            message: e.to_string(),
        }
    }
}

pub struct ExportDispatcher {
    export: Arc<dyn ExportService>,
    storage: Option<Arc<dyn LocalStorage>>,
    saver: Option<Arc<dyn ClientSaver>>,
    telemetry: TelemetryLog,
}

enum Mode {
    Handle(Box<dyn LocalHandle>),
    Fallback(Arc<dyn ClientSaver>),
    Remote(Destination),
}

/// One batch worth of dispatcher state, fixed at `begin_batch`.
pub struct BatchSession<'a> {
    dispatcher: &'a ExportDispatcher,
    mode: Mode,
}

impl ExportDispatcher {
    pub fn new(
        export: Arc<dyn ExportService>,
        storage: Option<Arc<dyn LocalStorage>>,
        saver: Option<Arc<dyn ClientSaver>>,
        telemetry: TelemetryLog,
    ) -> Self {
        Self {
            export,
            storage,
            saver,
            telemetry,
        }
    }

    /// Resolve the batch mode. The local handle is requested at most once here.
    pub async fn begin_batch(
        &self,
        destination: Destination,
        task_id: &str,
    ) -> Result<BatchSession<'_>> {
        if destination.is_remote() {
            return Ok(BatchSession {
                dispatcher: self,
                mode: Mode::Remote(destination),
            });
        }

        let outcome = match &self.storage {
            Some(storage) => storage.acquire_handle().await?,
            None => HandleOutcome::Denied("no local storage configured".into()),
        };

        let mode = match outcome {
            HandleOutcome::Granted(handle) => {
                info!(task_id, location = %handle.location(), "local handle granted");
                Mode::Handle(handle)
            }
            HandleOutcome::Declined => {
                return Err(Error::HandleDeclined {
                    task_id: task_id.to_string(),
                });
            }
            HandleOutcome::Denied(reason) => {
                let saver = self.saver.clone().ok_or_else(|| Error::FallbackUnavailable {
                    task_id: task_id.to_string(),
                    reason: reason.clone(),
                })?;
                self.telemetry.error(
                    format!(
                        "PERMISSION: local handle denied ({}), falling back to client saves",
                        reason
                    ),
                    Some(serde_json::json!({ "taskId": task_id, "reason": reason })),
                );
                Mode::Fallback(saver)
            }
        };
        Ok(BatchSession {
            dispatcher: self,
            mode,
        })
    }
}

impl BatchSession<'_> {
    pub fn fallback_active(&self) -> bool {
        matches!(self.mode, Mode::Fallback(_))
    }

    pub async fn export_item(
        &self,
        item: &ImageryItem,
        kernel: &AlgorithmKernel,
        roi: &Roi,
        artifact_name: &str,
    ) -> std::result::Result<ItemSuccess, ItemError> {
        match &self.mode {
            Mode::Handle(handle) => {
                let (filename, bytes) = self.download(item, kernel, roi, artifact_name).await?;
                let path = handle
                    .write(&filename, bytes)
                    .await
                    .map_err(ItemError::at(ItemStage::Save))?;
                Ok(ItemSuccess {
                    local_path: Some(path),
                    external_task_id: None,
                })
            }
            Mode::Fallback(saver) => {
                self.dispatcher
                    .telemetry
                    .info(format!("FALLBACK: client-side save for [{}]", item.id));
                let (filename, bytes) = self.download(item, kernel, roi, artifact_name).await?;
                let path = saver
                    .save(&filename, bytes)
                    .await
                    .map_err(ItemError::at(ItemStage::Save))?;
                Ok(ItemSuccess {
                    local_path: Some(path),
                    external_task_id: None,
                })
            }
            Mode::Remote(destination) => {
                let transform = BandTransform::for_kernel(kernel);
                let spec = ExportSpec {
                    item_ids: vec![item.id.clone()],
                    kernel_id: kernel.id.clone(),
                    roi: roi.clone(),
                    destination: *destination,
                    name_prefix: artifact_name.to_string(),
                    transform,
                    bands: transform.expression().to_string(),
                    scale: EXPORT_SCALE_M,
                };
                let ids = self
                    .dispatcher
                    .export
                    .submit_batch(&spec)
                    .await
                    .map_err(ItemError::at(ItemStage::Submit))?;
                let external = ids.into_iter().next().ok_or_else(|| ItemError {
                    stage: ItemStage::Submit,
                    message: "export queue returned no task id".into(),
                })?;
                debug!(item = %item.id, external = %external, "export queued");
                Ok(ItemSuccess {
                    local_path: None,
                    external_task_id: Some(external),
                })
            }
        }
    }

    async fn download(
        &self,
        item: &ImageryItem,
        kernel: &AlgorithmKernel,
        roi: &Roi,
        artifact_name: &str,
    ) -> std::result::Result<(String, bytes::Bytes), ItemError> {
        let export = &self.dispatcher.export;
        let reference = export
            .generate_artifact_reference(&item.id, &kernel.id, roi, artifact_name)
            .await
            .map_err(ItemError::at(ItemStage::Reference))?;
        let bytes = export
            .fetch_artifact(&reference.reference)
            .await
            .map_err(ItemError::at(ItemStage::Fetch))?;
        Ok((reference.filename, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kernel(id: &str, name: &str) -> AlgorithmKernel {
        AlgorithmKernel::user(id, name, "", "code", None)
    }

    #[test]
    fn transform_keyword_match() {
        assert_eq!(BandTransform::for_kernel(&kernel("ndvi_generator", "x")), BandTransform::Ndvi);
        assert_eq!(BandTransform::for_kernel(&kernel("veg_mask", "x")), BandTransform::Ndvi);
        assert_eq!(BandTransform::for_kernel(&kernel("NDWI_generator", "x")), BandTransform::Ndwi);
        let urban = kernel("wf_custom_1", "Urban sprawl");
        assert_eq!(BandTransform::for_kernel(&urban), BandTransform::Ndbi);
        let edges = kernel("wf_custom_2", "Edges");
        assert_eq!(BandTransform::for_kernel(&edges), BandTransform::TrueColor);
        assert_eq!(BandTransform::TrueColor.expression(), "B4,B3,B2");
    }

    #[test]
    fn artifact_name_uses_item_suffix() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let id = "COPERNICUS/S2_SR/20240307T030549_20240307T031742_T50RKV";
        assert_eq!(artifact_name("sentinel", date, id), "sentinel_20240307_T50RKV");
        assert_eq!(artifact_name("crop watch", date, "scene42"), "crop_watch_20240307_scene42");
    }
}
