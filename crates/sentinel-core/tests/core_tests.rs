//! Tests for sentinel-core: data model wire format, task lifecycle, errors

use chrono::NaiveDate;
use sentinel_core::*;

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

// ===========================================================================
// WorkflowRun
// ===========================================================================

fn sample_run() -> WorkflowRun {
    WorkflowRun {
        run_id: "AI-RUN-1".into(),
        workflow_name: "Wheat belt".into(),
        timestamp: chrono::Utc::now(),
        search_config: SearchConfig {
            date_range: "2024-01-01 to 2024-06-30".into(),
            cloud_cover: 30.0,
            min_coverage: 0.0,
            scene_count: 2,
        },
        kernel_config: KernelConfig {
            algo_name: "Vegetation Area Extractor".into(),
            algo_desc: "NDVI > 0.4".into(),
        },
        node_labels: vec!["Input".into(), "Output".into()],
        trend_series: vec![
            TrendPoint {
                date: date("2024-01-05"),
                value: 0.5,
            },
            TrendPoint {
                date: date("2024-02-05"),
                value: 0.6,
            },
        ],
    }
}

#[test]
fn run_snapshot_uses_collection_layout() {
    let json = serde_json::to_value(sample_run()).unwrap();
    let keys = [
        "runId",
        "workflowName",
        "timestamp",
        "searchConfig",
        "kernelConfig",
        "nodeLabels",
        "trendSeries",
    ];
    for key in keys {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
    assert_eq!(json["trendSeries"][0]["date"], "2024-01-05");
    assert_eq!(json["searchConfig"]["sceneCount"], 2);
}

#[test]
fn run_snapshot_roundtrip() {
    let run = sample_run();
    let text = serde_json::to_string(&run).unwrap();
    let back: WorkflowRun = serde_json::from_str(&text).unwrap();
    assert_eq!(back, run);
}

#[test]
fn run_summary_line() {
    let line = sample_run().summary_line();
    assert!(line.contains("AI-RUN-1"));
    assert!(line.contains("2 points"));
}

// ===========================================================================
// Kernels
// ===========================================================================

#[test]
fn system_kernel_is_valid_and_persisted() {
    let k = AlgorithmKernel::system("veg_mask", "Vegetation", "desc", "return img;");
    assert!(k.is_system());
    assert!(k.is_persistent());
    assert!(k.is_selectable());
}

#[test]
fn user_kernel_starts_ephemeral() {
    let k = AlgorithmKernel::user("wf_custom_1", "Mine", "desc", "code", Some("ok".into()));
    assert!(!k.is_system());
    assert_eq!(k.persistence, Persistence::Ephemeral);
    assert_eq!(k.validation, Validation::Valid);
}

// ===========================================================================
// Workflow nodes
// ===========================================================================

#[test]
fn node_type_serializes_as_type() {
    let node = WorkflowNode::new("n1", "Classify", NodeType::Analysis).with_kernel("mode_extract");
    let json = serde_json::to_value(&node).unwrap();
    assert_eq!(json["type"], "ANALYSIS");
    assert_eq!(json["status"], "IDLE");
    assert_eq!(json["linkedKernel"], "mode_extract");
    assert!(NodeType::Process.computes_metrics());
    assert!(!NodeType::Output.computes_metrics());
}

// ===========================================================================
// Tasks
// ===========================================================================

#[test]
fn failed_task_keeps_error() {
    let mut task = Task::new("export", TaskKind::Export(Destination::LocalSave));
    task.start();
    assert!(task.fail("declined"));
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(!task.complete());
    assert_eq!(task.error.as_deref(), Some("declined"));
}

#[test]
fn outcomes_stop_counting_after_terminal() {
    let mut task = Task::new("export", TaskKind::Export(Destination::RemoteAsset));
    task.start();
    task.record_outcome(true);
    task.record_outcome(false);
    task.complete();
    task.record_outcome(true);
    assert_eq!((task.succeeded, task.failed), (1, 1));
}

#[test]
fn task_kind_display() {
    assert_eq!(TaskKind::Export(Destination::RemoteBucket).to_string(), "EXPORT:BUCKET");
    assert_eq!(TaskKind::Workflow.to_string(), "WORKFLOW");
}

// ===========================================================================
// Errors
// ===========================================================================

#[test]
fn precondition_classification() {
    assert!(Error::NoImagery.is_precondition());
    assert!(Error::NoRegion.is_precondition());
    assert!(Error::kernel_not_ready("k", Validation::Invalid).is_precondition());
    assert!(Error::KernelNotFound("wf_custom_gone".into()).is_precondition());
    assert!(!Error::SystemKernel("ndvi_generator".into()).is_precondition());
    assert!(!Error::RunNotFound("r".into()).is_precondition());
    let declined = Error::HandleDeclined {
        task_id: "GE-1".into(),
    };
    assert!(declined.is_permission_denial());
}

#[test]
fn validation_error_carries_reason() {
    let err = Error::validation(Validation::Unsupported, "unsupported band reference");
    assert_eq!(err.rejection_reason(), Some("unsupported band reference"));
    assert!(err.to_string().contains("unsupported"));
}
