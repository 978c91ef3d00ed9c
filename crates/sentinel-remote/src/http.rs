//! HTTP client for the processing backend.
//!
//! One `RemoteServices` implements every remote port: audit, discovery,
//! export and report synthesis. All calls carry the bearer key when set.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response};
use sentinel_core::config::ServicesConfig;
use sentinel_core::{
    Error, ImageryItem, ReportContent, ReportIntent, Result, Roi, SearchCriteria, WorkflowRun,
};
use sentinel_pipeline::{
    ArtifactReference, DiscoveryService, ExportService, ExportSpec, ReportSynthesizer,
};
use sentinel_registry::{AuditPort, RawVerdict};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct RemoteServices {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct AuditRequest<'a> {
    code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReferenceRequest<'a> {
    item_id: &'a str,
    kernel_id: &'a str,
    roi: &'a Roi,
    name_prefix: &'a str,
}

#[derive(Deserialize)]
struct BatchResponse {
    task_ids: Vec<String>,
}

#[derive(Serialize)]
struct ReportRequest<'a> {
    run: &'a WorkflowRun,
    intent: &'a ReportIntent,
}

impl RemoteServices {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        }
    }

    pub fn from_config(config: &ServicesConfig) -> Self {
        let mut remote = Self::with_timeout(&config.base_url, config.request_timeout());
        remote.api_key = config.api_key.clone();
        remote
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send(&self, service: &str, req: RequestBuilder) -> Result<Response> {
        let response = self
            .authed(req)
            .send()
            .await
            .map_err(|e| Error::service(service, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("{} error {}: {}", service, status, body);
            let message = if status.as_u16() == 401 {
                format!("unauthorized: {}", body)
            } else {
                format!("{}: {}", status, body)
            };
            return Err(Error::service(service, message));
        }
        Ok(response)
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: &str,
        path: &str,
        body: &B,
    ) -> Result<T> {
        debug!("POST {} ({})", path, service);
        let response = self.send(service, self.client.post(self.url(path)).json(body)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::service(service, format!("malformed response: {}", e)))
    }
}

#[async_trait]
impl AuditPort for RemoteServices {
    async fn audit(&self, code: &str) -> Result<RawVerdict> {
        self.post_json("audit", "/v1/audit", &AuditRequest { code }).await
    }
}

#[async_trait]
impl DiscoveryService for RemoteServices {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<ImageryItem>> {
        self.post_json("discovery", "/v1/assets/search", criteria).await
    }
}

#[async_trait]
impl ExportService for RemoteServices {
    async fn generate_artifact_reference(
        &self,
        item_id: &str,
        kernel_id: &str,
        roi: &Roi,
        name_prefix: &str,
    ) -> Result<ArtifactReference> {
        let body = ReferenceRequest {
            item_id,
            kernel_id,
            roi,
            name_prefix,
        };
        self.post_json("export", "/v1/exports/reference", &body).await
    }

    async fn fetch_artifact(&self, reference: &str) -> Result<Bytes> {
        debug!("GET {}", reference);
        let response = self.send("export", self.client.get(self.url(reference))).await?;
        response
            .bytes()
            .await
            .map_err(|e| Error::service("export", e.to_string()))
    }

    async fn submit_batch(&self, spec: &ExportSpec) -> Result<Vec<String>> {
        let response: BatchResponse = self.post_json("export", "/v1/exports/batch", spec).await?;
        Ok(response.task_ids)
    }
}

#[async_trait]
impl ReportSynthesizer for RemoteServices {
    async fn synthesize(&self, run: &WorkflowRun, intent: &ReportIntent) -> Result<ReportContent> {
        self.post_json("report", "/v1/reports", &ReportRequest { run, intent }).await
    }
}
