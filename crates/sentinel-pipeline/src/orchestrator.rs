//! Pipeline orchestrator — owns Task lifecycle and drives the dispatcher
//! or the workflow engine.
//!
//! Preconditions are checked before any Task exists. Once the per-item
//! loop starts, every item is attempted in order regardless of earlier
//! failures; the outcome of each one is returned in `BatchReport`.

use crate::dispatch::{artifact_name, ExportDispatcher, ItemError, ItemSuccess};
use crate::metric::{HashMetric, MetricComputer};
use crate::ports::{ClientSaver, DiscoveryService, ExportService, LocalStorage, ReportSynthesizer};
use crate::workflow::{NodeProgress, RunContext, WorkflowDefinition, WorkflowEngine};
use dashmap::DashMap;
use sentinel_core::{
    Destination, Error, ImageryItem, KernelConfig, LogLevel, ReportContent, ReportIntent, Result,
    Roi, SearchConfig, SearchCriteria, SentinelConfig, Task, TaskKind, TelemetryLog, WorkflowRun,
};
use sentinel_registry::AlgorithmRegistry;
use sentinel_store::HistoryStore;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};

const FALLBACK_KERNEL_NAME: &str = "NDVI/Grayscale Bundle";
const FALLBACK_KERNEL_DESC: &str =
    "Feature-band imagery produced by the export stage, used as workflow input.";
/// Cloud cover recorded in snapshots when no search preceded the run.
const DEFAULT_CLOUD_COVER: f64 = 30.0;

/// External collaborators, bundled for construction.
pub struct PipelineServices {
    pub discovery: Arc<dyn DiscoveryService>,
    pub export: Arc<dyn ExportService>,
    pub reports: Arc<dyn ReportSynthesizer>,
    pub storage: Option<Arc<dyn LocalStorage>>,
    pub saver: Option<Arc<dyn ClientSaver>>,
}

#[derive(Clone, Debug)]
pub struct DispatchRequest {
    /// Task display name. Defaults to `<kernel name> -> <destination>`.
    pub name: Option<String>,
    pub kernel_id: String,
    pub destination: Destination,
    pub roi: Option<Roi>,
}

#[derive(Clone, Debug)]
pub struct ItemReport {
    pub item_id: String,
    pub artifact_name: String,
    pub outcome: std::result::Result<ItemSuccess, ItemError>,
}

impl ItemReport {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Clone, Debug)]
pub struct BatchReport {
    pub task: Task,
    pub items: Vec<ItemReport>,
    pub fallback_used: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.succeeded()
    }
}

struct TaskEntry {
    seq: u64,
    task: Task,
}

pub struct Orchestrator {
    registry: Arc<AlgorithmRegistry>,
    history: Arc<HistoryStore>,
    dispatcher: ExportDispatcher,
    engine: WorkflowEngine,
    discovery: Arc<dyn DiscoveryService>,
    reports: Arc<dyn ReportSynthesizer>,
    telemetry: TelemetryLog,
    tasks: DashMap<String, TaskEntry>,
    next_seq: AtomicU64,
    active_search: RwLock<Option<SearchCriteria>>,
    experiment: String,
    inter_item_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        config: &SentinelConfig,
        registry: Arc<AlgorithmRegistry>,
        history: Arc<HistoryStore>,
        services: PipelineServices,
        telemetry: TelemetryLog,
    ) -> Self {
        Self::with_metric(config, registry, history, services, telemetry, Arc::new(HashMetric))
    }

    pub fn with_metric(
        config: &SentinelConfig,
        registry: Arc<AlgorithmRegistry>,
        history: Arc<HistoryStore>,
        services: PipelineServices,
        telemetry: TelemetryLog,
        metric: Arc<dyn MetricComputer>,
    ) -> Self {
        let dispatcher = ExportDispatcher::new(
            services.export,
            services.storage,
            services.saver,
            telemetry.clone(),
        );
        let engine =
            WorkflowEngine::new(metric, config.workflow.settle(), config.workflow.per_item());
        Self {
            registry,
            history,
            dispatcher,
            engine,
            discovery: services.discovery,
            reports: services.reports,
            telemetry,
            tasks: DashMap::new(),
            next_seq: AtomicU64::new(0),
            active_search: RwLock::new(None),
            experiment: config.pipeline.experiment_name.clone(),
            inter_item_delay: config.pipeline.inter_item_delay(),
        }
    }

    pub fn registry(&self) -> &Arc<AlgorithmRegistry> {
        &self.registry
    }

    pub fn history(&self) -> &Arc<HistoryStore> {
        &self.history
    }

    pub fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    pub fn subscribe_nodes(&self) -> mpsc::UnboundedReceiver<NodeProgress> {
        self.engine.subscribe()
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    pub async fn discover(&self, criteria: SearchCriteria) -> Result<Vec<ImageryItem>> {
        if !criteria.roi.is_closed() {
            return Err(self.reject("SEARCH", Error::NoRegion));
        }
        self.telemetry.info(format!(
            "SEARCH: scanning {} to {}, cloud <= {}%",
            criteria.date_start, criteria.date_end, criteria.cloud_max
        ));
        let items = match self.discovery.search(&criteria).await {
            Ok(items) => items,
            Err(e) => {
                self.telemetry.error(format!("SEARCH: discovery failed: {}", e), None);
                return Err(e);
            }
        };
        self.telemetry.success(format!("SEARCH: {} scenes found", items.len()));
        *self.active_search.write().await = Some(criteria);
        Ok(items)
    }

    // ------------------------------------------------------------------
    // Batch export
    // ------------------------------------------------------------------

    /// Export every item through one kernel to one destination. Items that
    /// succeed get their local path set when the destination produced a
    /// local artifact; items that fail have it cleared.
    pub async fn dispatch(
        &self,
        request: DispatchRequest,
        items: &mut [ImageryItem],
    ) -> Result<BatchReport> {
        if items.is_empty() {
            return Err(self.reject("DISPATCH", Error::NoImagery));
        }
        let roi = match request.roi.as_ref() {
            Some(roi) if roi.is_closed() => roi.clone(),
            _ => return Err(self.reject("DISPATCH", Error::NoRegion)),
        };
        let kernel = self
            .registry
            .select(&request.kernel_id)
            .await
            .map_err(|e| self.reject("DISPATCH", e))?;

        let name = request
            .name
            .clone()
            .unwrap_or_else(|| format!("{} -> {}", kernel.name, request.destination));
        let mut task = Task::new(name, TaskKind::Export(request.destination));
        self.track(&task);
        info!(
            task_id = %task.id,
            kernel = %kernel.id,
            destination = %request.destination,
            items = items.len(),
            "batch created"
        );

        let session = match self.dispatcher.begin_batch(request.destination, &task.id).await {
            Ok(session) => session,
            Err(e) => {
                task.fail(e.to_string());
                self.track(&task);
                self.telemetry.error(
                    format!("TASK {}: aborted before first item: {}", task.id, e),
                    Some(serde_json::json!({ "taskId": task.id })),
                );
                return Err(e);
            }
        };

        task.start();
        self.track(&task);

        let total = items.len();
        let mut reports = Vec::with_capacity(total);
        for (i, item) in items.iter_mut().enumerate() {
            if i > 0 && !self.inter_item_delay.is_zero() {
                tokio::time::sleep(self.inter_item_delay).await;
            }
            let artifact = artifact_name(&self.experiment, item.date, &item.id);
            self.telemetry.info(format!(
                "EXPORT [{}/{}]: {} as {}",
                i + 1,
                total,
                item.id,
                artifact
            ));

            let outcome = session.export_item(item, &kernel, &roi, &artifact).await;
            match &outcome {
                Ok(success) => {
                    if let Some(path) = &success.local_path {
                        item.local_path = Some(path.clone());
                    }
                    let target = success
                        .local_path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .or_else(|| success.external_task_id.clone())
                        .unwrap_or_default();
                    self.telemetry.success(format!(
                        "EXPORT [{}/{}]: {} -> {}",
                        i + 1,
                        total,
                        item.id,
                        target
                    ));
                }
                Err(e) => {
                    item.local_path = None;
                    self.telemetry.error(
                        format!("EXPORT [{}/{}]: {} failed: {}", i + 1, total, item.id, e),
                        Some(serde_json::json!({
                            "taskId": task.id,
                            "item": item.id,
                            "stage": e.stage,
                            "message": e.message,
                        })),
                    );
                }
            }

            task.record_outcome(outcome.is_ok());
            task.advance(i + 1, total);
            self.track(&task);
            reports.push(ItemReport {
                item_id: item.id.clone(),
                artifact_name: artifact,
                outcome,
            });
        }

        task.complete();
        self.track(&task);

        if task.failed == total {
            self.telemetry.error(
                format!("TASK {}: all {} items failed", task.id, total),
                Some(serde_json::json!({ "taskId": task.id })),
            );
        } else {
            self.telemetry.log(
                LogLevel::Success,
                format!(
                    "TASK {}: completed, {} ok, {} failed",
                    task.id, task.succeeded, task.failed
                ),
                None,
            );
        }
        info!(
            task_id = %task.id,
            succeeded = task.succeeded,
            failed = task.failed,
            "batch finished"
        );

        Ok(BatchReport {
            task,
            items: reports,
            fallback_used: session.fallback_active(),
        })
    }

    // ------------------------------------------------------------------
    // Workflow
    // ------------------------------------------------------------------

    /// One full pass of `definition` over the linked items, recorded in history.
    pub async fn run_workflow(
        &self,
        definition: &WorkflowDefinition,
        items: &[ImageryItem],
    ) -> Result<WorkflowRun> {
        let linked = items.iter().filter(|i| i.is_linked()).count();
        if linked == 0 {
            return Err(self.reject("WORKFLOW", Error::NoLinkedImagery));
        }

        let mut last_kernel = None;
        for kernel_id in definition.linked_kernels() {
            let kernel = self
                .registry
                .select(kernel_id)
                .await
                .map_err(|e| self.reject("WORKFLOW", e))?;
            last_kernel = Some(kernel);
        }

        let run_id = format!("AI-RUN-{}", uuid::Uuid::new_v4().simple());
        let mut task = Task::new(definition.name.clone(), TaskKind::Workflow);
        task.start();
        self.track(&task);
        self.telemetry.info(format!(
            "WORKFLOW: pipeline handshake for {}, {} linked scenes",
            run_id, linked
        ));

        let ctx = RunContext {
            run_id: run_id.clone(),
            workflow_name: definition.name.clone(),
            search_config: self.search_config(items, linked).await,
            kernel_config: match last_kernel {
                Some(k) => KernelConfig {
                    algo_name: k.name,
                    algo_desc: k.description,
                },
                None => KernelConfig {
                    algo_name: FALLBACK_KERNEL_NAME.into(),
                    algo_desc: FALLBACK_KERNEL_DESC.into(),
                },
            },
        };

        let task_id = task.id.clone();
        let run = self
            .engine
            .execute(ctx, definition, items, |done, total| {
                if let Some(mut entry) = self.tasks.get_mut(&task_id) {
                    entry.task.advance(done, total);
                }
            })
            .await;
        if let Some(entry) = self.tasks.get(&task_id) {
            task = entry.task.clone();
        }

        if let Some(path) = definition.output_path() {
            if let Err(e) = write_snapshot(path, &run).await {
                error!(run_id = %run_id, path = %path.display(), "snapshot output failed: {}", e);
                task.fail(e.to_string());
                self.track(&task);
                self.telemetry.error(
                    format!("OUTPUT: snapshot {} not written to {}: {}", run_id, path.display(), e),
                    Some(serde_json::json!({ "runId": run_id, "error": e.to_string() })),
                );
                return Err(e);
            }
            self.telemetry
                .info(format!("OUTPUT: snapshot {} written to {}", run_id, path.display()));
        }

        if let Err(e) = self.history.append(run.clone()).await {
            error!(run_id = %run_id, "history append failed: {}", e);
            task.fail(e.to_string());
            self.track(&task);
            self.telemetry.error(
                format!("WORKFLOW: snapshot for {} not recorded: {}", run_id, e),
                Some(serde_json::json!({ "runId": run_id, "error": e.to_string() })),
            );
            return Err(e);
        }

        task.advance(definition.nodes.len(), definition.nodes.len());
        task.complete();
        self.track(&task);
        self.telemetry
            .success(format!("SUCCESS: workflow snapshot created for RunID: {}", run_id));
        Ok(run)
    }

    async fn search_config(&self, items: &[ImageryItem], linked: usize) -> SearchConfig {
        let active = self.active_search.read().await;
        match active.as_ref() {
            Some(c) => SearchConfig {
                date_range: format!("{} to {}", c.date_start, c.date_end),
                cloud_cover: c.cloud_max,
                min_coverage: c.coverage_min,
                scene_count: linked,
            },
            None => {
                let range = match (items.first(), items.last()) {
                    (Some(first), Some(last)) => format!("{} to {}", first.date, last.date),
                    _ => String::new(),
                };
                SearchConfig {
                    date_range: range,
                    cloud_cover: DEFAULT_CLOUD_COVER,
                    min_coverage: 0.0,
                    scene_count: linked,
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Reports and tasks
    // ------------------------------------------------------------------

    pub async fn synthesize_report(
        &self,
        run_id: &str,
        intent: ReportIntent,
    ) -> Result<ReportContent> {
        let run = self
            .history
            .lookup(run_id)
            .await
            .map_err(|e| self.reject("REPORT", e))?;
        self.telemetry.info(format!("REPORT: synthesizing from snapshot {}", run_id));
        match self.reports.synthesize(&run, &intent).await {
            Ok(content) => {
                self.telemetry.success(format!("REPORT: {} ready", run_id));
                Ok(content)
            }
            Err(e) => {
                self.telemetry.error(format!("REPORT: {} failed: {}", run_id, e), None);
                Err(e)
            }
        }
    }

    /// Newest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut entries: Vec<(u64, Task)> = self
            .tasks
            .iter()
            .map(|e| (e.seq, e.task.clone()))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));
        entries.into_iter().map(|(_, t)| t).collect()
    }

    pub fn task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).map(|e| e.task.clone())
    }

    /// Record a rejected request at Error level and hand the error back.
    fn reject(&self, scope: &str, e: Error) -> Error {
        self.telemetry.error(
            format!("{}: rejected: {}", scope, e),
            Some(serde_json::json!({
                "error": e.to_string(),
                "precondition": e.is_precondition(),
            })),
        );
        e
    }

    fn track(&self, task: &Task) {
        if let Some(mut entry) = self.tasks.get_mut(&task.id) {
            entry.task = task.clone();
            return;
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(task.id.clone(), TaskEntry {
            seq,
            task: task.clone(),
        });
    }
}

async fn write_snapshot(path: &Path, run: &WorkflowRun) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, serde_json::to_vec_pretty(run)?).await?;
    Ok(())
}
