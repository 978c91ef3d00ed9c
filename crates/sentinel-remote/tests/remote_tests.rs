//! Tests for sentinel-remote: wire formats and status mapping against a mock backend

use chrono::NaiveDate;
use mockito::Matcher;
use sentinel_core::*;
use sentinel_pipeline::{
    BandTransform, DiscoveryService, ExportService, ExportSpec, ReportSynthesizer,
};
use sentinel_registry::{AuditGate, AuditPort, AuditVerdict};
use sentinel_remote::RemoteServices;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn roi() -> Roi {
    Roi::rectangle(0.0, 0.0, 1.0, 1.0)
}

// ===========================================================================
// Audit
// ===========================================================================

#[tokio::test]
async fn audit_posts_code_with_bearer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/audit")
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::PartialJson(json!({ "code": "return img;" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"valid": true, "reason": "ok"}"#)
        .create_async()
        .await;

    let remote = RemoteServices::new(server.url()).with_api_key("secret");
    let verdict = remote.audit("return img;").await.unwrap();

    assert!(verdict.valid);
    assert_eq!(verdict.reason.as_deref(), Some("ok"));
    mock.assert_async().await;
}

#[tokio::test]
async fn audit_rejection_passes_reason_through_gate() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/audit")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"valid": false, "reason": "unsupported band reference"}"#)
        .create_async()
        .await;

    let gate = AuditGate::new(Arc::new(RemoteServices::new(server.url())), Duration::from_secs(5));
    assert_eq!(
        gate.audit("img.select('B99')").await,
        AuditVerdict::Rejected {
            validation: Validation::Unsupported,
            reason: "unsupported band reference".into()
        }
    );
}

#[tokio::test]
async fn audit_server_error_is_service_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/audit")
        .with_status(503)
        .with_body("overloaded")
        .create_async()
        .await;

    let remote = RemoteServices::new(server.url());
    match remote.audit("x").await {
        Err(Error::Service { service, message }) => {
            assert_eq!(service, "audit");
            assert!(message.contains("503"), "{}", message);
        }
        other => panic!("expected service error, got {:?}", other),
    }

    let gate = AuditGate::new(Arc::new(remote), Duration::from_secs(5));
    assert_eq!(gate.audit("x").await, AuditVerdict::rejected("audit service unavailable"));
}

#[tokio::test]
async fn unauthorized_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/assets/search")
        .with_status(401)
        .with_body("bad key")
        .create_async()
        .await;

    let criteria = SearchCriteria {
        roi: roi(),
        cloud_max: 30.0,
        coverage_min: 0.0,
        date_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        date_end: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    };
    let err = RemoteServices::new(server.url()).search(&criteria).await.unwrap_err();
    assert!(err.to_string().contains("unauthorized"), "{}", err);
}

// ===========================================================================
// Discovery
// ===========================================================================

#[tokio::test]
async fn search_decodes_camel_case_items() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/assets/search")
        .match_body(Matcher::PartialJson(json!({ "cloudMax": 20.0, "dateStart": "2024-01-01" })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!([
                { "id": "S2/20240105_T1", "date": "2024-01-05", "cloudCover": 4.2, "tileId": "T1" },
                { "id": "S2/20240110_T2", "date": "2024-01-10", "cloudCover": 11.0 }
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let criteria = SearchCriteria {
        roi: roi(),
        cloud_max: 20.0,
        coverage_min: 0.0,
        date_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        date_end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    };
    let items = RemoteServices::new(server.url()).search(&criteria).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].tile_id.as_deref(), Some("T1"));
    assert_eq!(items[1].cloud_cover, 11.0);
    assert!(items.iter().all(|i| !i.is_linked()));
    mock.assert_async().await;
}

// ===========================================================================
// Export
// ===========================================================================

#[tokio::test]
async fn reference_then_fetch_relative_path() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/exports/reference")
        .match_body(Matcher::PartialJson(json!({
            "itemId": "S2/20240105_T1",
            "kernelId": "ndvi_generator",
            "namePrefix": "sentinel_20240105_T1"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"reference": "/downloads/abc", "filename": "sentinel_20240105_T1.tif"}"#)
        .create_async()
        .await;
    let download = server
        .mock("GET", "/downloads/abc")
        .with_status(200)
        .with_body(b"GTIFF-BYTES".to_vec())
        .create_async()
        .await;

    let remote = RemoteServices::new(server.url());
    let reference = remote
        .generate_artifact_reference(
            "S2/20240105_T1",
            "ndvi_generator",
            &roi(),
            "sentinel_20240105_T1",
        )
        .await
        .unwrap();
    assert_eq!(reference.filename, "sentinel_20240105_T1.tif");

    let bytes = remote.fetch_artifact(&reference.reference).await.unwrap();
    assert_eq!(&bytes[..], b"GTIFF-BYTES");
    download.assert_async().await;
}

#[tokio::test]
async fn batch_submission_returns_task_ids() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/exports/batch")
        .match_body(Matcher::PartialJson(json!({
            "itemIds": ["S2/20240105_T1"],
            "destination": "remote_drive",
            "transform": "ndvi",
            "scale": 10
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"task_ids": ["EXT-1"]}"#)
        .create_async()
        .await;

    let spec = ExportSpec {
        item_ids: vec!["S2/20240105_T1".into()],
        kernel_id: "ndvi_generator".into(),
        roi: roi(),
        destination: Destination::RemoteDrive,
        name_prefix: "sentinel_20240105_T1".into(),
        transform: BandTransform::Ndvi,
        bands: BandTransform::Ndvi.expression().into(),
        scale: 10,
    };
    let ids = RemoteServices::new(server.url()).submit_batch(&spec).await.unwrap();
    assert_eq!(ids, vec!["EXT-1"]);
}

#[tokio::test]
async fn malformed_body_is_service_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/exports/batch")
        .with_status(200)
        .with_body("not json")
        .create_async()
        .await;

    let spec = ExportSpec {
        item_ids: vec!["a".into()],
        kernel_id: "k".into(),
        roi: roi(),
        destination: Destination::RemoteAsset,
        name_prefix: "p".into(),
        transform: BandTransform::TrueColor,
        bands: "B4,B3,B2".into(),
        scale: 10,
    };
    let err = RemoteServices::new(server.url()).submit_batch(&spec).await.unwrap_err();
    assert!(matches!(err, Error::Service { .. }));
}

// ===========================================================================
// Reports
// ===========================================================================

#[tokio::test]
async fn report_posts_snapshot_and_intent() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/reports")
        .match_body(Matcher::PartialJson(json!({
            "run": { "runId": "AI-RUN-1", "workflowName": "wf" },
            "intent": { "targetArea": "Delta" }
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"brief": "short", "detailed": "long"}"#)
        .create_async()
        .await;

    let run = WorkflowRun {
        run_id: "AI-RUN-1".into(),
        workflow_name: "wf".into(),
        timestamp: chrono::Utc::now(),
        search_config: SearchConfig {
            date_range: "2024-01-01 to 2024-02-01".into(),
            cloud_cover: 30.0,
            min_coverage: 0.0,
            scene_count: 0,
        },
        kernel_config: KernelConfig {
            algo_name: "k".into(),
            algo_desc: "".into(),
        },
        node_labels: vec![],
        trend_series: vec![],
    };
    let intent = ReportIntent {
        target_area: "Delta".into(),
        ..Default::default()
    };

    let content = RemoteServices::new(server.url()).synthesize(&run, &intent).await.unwrap();
    assert_eq!(
        content,
        ReportContent {
            brief: "short".into(),
            detailed: "long".into(),
        }
    );
}
