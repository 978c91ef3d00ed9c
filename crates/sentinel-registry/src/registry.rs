//! Algorithm registry — catalog of processing kernels with audit status.
//!
//! System kernels come from `builtin` and can never be saved or removed.
//! User kernels enter only through an accepted audit, start Ephemeral, and
//! reach the durable `sentinel.kernels` collection on explicit `persist`.

use crate::audit::{AuditGate, AuditVerdict};
use crate::builtin::builtin_kernels;
use sentinel_core::{
    AlgorithmKernel, Author, Error, LogLevel, Persistence, Result, TelemetryLog, Validation,
};
use sentinel_store::{load_list, save_list, CollectionStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

pub const KERNEL_COLLECTION: &str = "sentinel.kernels";

/// Kernel collection entry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KernelRecord {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub code: String,
    pub author: Author,
    pub is_persistent: bool,
}

impl From<&AlgorithmKernel> for KernelRecord {
    fn from(k: &AlgorithmKernel) -> Self {
        Self {
            id: k.id.clone(),
            name: k.name.clone(),
            desc: k.description.clone(),
            code: k.code.clone(),
            author: k.author,
            is_persistent: k.is_persistent(),
        }
    }
}

impl From<KernelRecord> for AlgorithmKernel {
    fn from(r: KernelRecord) -> Self {
        // Stored kernels passed their audit before they were saved.
        Self {
            id: r.id,
            name: r.name,
            description: r.desc,
            code: r.code,
            author: r.author,
            persistence: if r.is_persistent {
                Persistence::Persisted
            } else {
                Persistence::Ephemeral
            },
            validation: Validation::Valid,
            last_audit_reason: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistOutcome {
    Persisted,
    /// No-op: the kernel was already saved.
    AlreadyPersisted,
    /// No-op: system kernels are not written to the collection.
    SystemKernel,
}

pub struct AlgorithmRegistry {
    kernels: RwLock<Vec<AlgorithmKernel>>,
    store: Arc<dyn CollectionStore>,
    audit: AuditGate,
    telemetry: TelemetryLog,
}

impl AlgorithmRegistry {
    /// Built-ins followed by every saved user kernel.
    pub async fn open(
        store: Arc<dyn CollectionStore>,
        audit: AuditGate,
        telemetry: TelemetryLog,
    ) -> Result<Self> {
        let mut kernels = builtin_kernels();
        let records: Vec<KernelRecord> = load_list(store.as_ref(), KERNEL_COLLECTION).await?;
        for record in records {
            if record.author != Author::User || kernels.iter().any(|k| k.id == record.id) {
                warn!(id = %record.id, "ignoring stored kernel that shadows a system kernel");
                continue;
            }
            let mut kernel = AlgorithmKernel::from(record);
            kernel.persistence = Persistence::Persisted;
            kernels.push(kernel);
        }
        info!(
            "registry opened: {} kernels from {}",
            kernels.len(),
            store.location(KERNEL_COLLECTION)
        );
        Ok(Self {
            kernels: RwLock::new(kernels),
            store,
            audit,
            telemetry,
        })
    }

    /// Submit a kernel for audit. On acceptance it joins the registry as
    /// Ephemeral/Valid and its id is returned; on rejection nothing changes
    /// and the audit reason comes back inside `Error::Validation`.
    pub async fn register(&self, name: &str, desc: &str, code: &str) -> Result<String> {
        self.telemetry.log(
            LogLevel::Info,
            format!("AUDIT: initiating logic scan for kernel [{}]", name),
            Some(serde_json::json!({ "validation": Validation::Testing })),
        );

        match self.audit.audit(code).await {
            AuditVerdict::Accepted { reason } => {
                let id = format!("wf_custom_{}", uuid::Uuid::new_v4().simple());
                let kernel = AlgorithmKernel::user(&id, name, desc, code, reason);
                self.kernels.write().await.push(kernel);
                self.telemetry.success(format!(
                    "Kernel [{}] registered as {}. Save it to persist.",
                    name, id
                ));
                Ok(id)
            }
            AuditVerdict::Rejected { validation, reason } => {
                self.telemetry.error(
                    format!("AUDIT: kernel [{}] rejected: {}", name, reason),
                    Some(serde_json::json!({ "validation": validation, "reason": reason })),
                );
                Err(Error::validation(validation, reason))
            }
        }
    }

    /// Promote a user kernel to Persisted and rewrite the collection.
    pub async fn persist(&self, id: &str) -> Result<PersistOutcome> {
        let mut kernels = self.kernels.write().await;
        let idx = kernels
            .iter()
            .position(|k| k.id == id)
            .ok_or_else(|| self.failed(id, Error::KernelNotFound(id.to_string())))?;

        if kernels[idx].is_system() {
            return Ok(PersistOutcome::SystemKernel);
        }
        if kernels[idx].is_persistent() {
            return Ok(PersistOutcome::AlreadyPersisted);
        }

        let mut next = kernels.clone();
        next[idx].persistence = Persistence::Persisted;
        self.write_collection(&next)
            .await
            .map_err(|e| self.failed(id, e))?;
        *kernels = next;

        self.telemetry.info(format!("SYSTEM: kernel [{}] saved to local storage", id));
        Ok(PersistOutcome::Persisted)
    }

    /// Delete a user kernel in any persistence state.
    pub async fn remove(&self, id: &str) -> Result<AlgorithmKernel> {
        let mut kernels = self.kernels.write().await;
        let idx = kernels
            .iter()
            .position(|k| k.id == id)
            .ok_or_else(|| self.failed(id, Error::KernelNotFound(id.to_string())))?;

        if kernels[idx].is_system() {
            return Err(self.failed(id, Error::SystemKernel(id.to_string())));
        }

        let mut next = kernels.clone();
        let removed = next.remove(idx);
        if removed.is_persistent() {
            self.write_collection(&next)
                .await
                .map_err(|e| self.failed(id, e))?;
        }
        *kernels = next;

        self.telemetry.info(format!("SYSTEM: kernel [{}] removed", id));
        Ok(removed)
    }

    /// A frozen copy of a Valid kernel for pipeline use.
    pub async fn select(&self, id: &str) -> Result<AlgorithmKernel> {
        let kernels = self.kernels.read().await;
        let kernel = kernels
            .iter()
            .find(|k| k.id == id)
            .ok_or_else(|| Error::KernelNotFound(id.to_string()))?;
        if !kernel.is_selectable() {
            return Err(Error::kernel_not_ready(id, kernel.validation));
        }
        Ok(kernel.clone())
    }

    pub async fn get(&self, id: &str) -> Option<AlgorithmKernel> {
        self.kernels.read().await.iter().find(|k| k.id == id).cloned()
    }

    /// Built-ins first, then user kernels in registration order.
    pub async fn list(&self) -> Vec<AlgorithmKernel> {
        self.kernels.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.kernels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn failed(&self, id: &str, e: Error) -> Error {
        self.telemetry.error(
            format!("SYSTEM: kernel [{}]: {}", id, e),
            Some(serde_json::json!({ "kernel": id, "error": e.to_string() })),
        );
        e
    }

    async fn write_collection(&self, kernels: &[AlgorithmKernel]) -> Result<()> {
        let records: Vec<KernelRecord> = kernels
            .iter()
            .filter(|k| k.author == Author::User && k.is_persistent())
            .map(KernelRecord::from)
            .collect();
        save_list(self.store.as_ref(), KERNEL_COLLECTION, &records).await
    }
}
