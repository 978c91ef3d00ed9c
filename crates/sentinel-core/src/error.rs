//! Error types for Sentinel

use crate::types::Validation;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The audit port rejected a kernel submission.
    #[error("kernel rejected ({validation}): {reason}")]
    Validation {
        validation: Validation,
        reason: String,
    },

    #[error("no imagery selected")]
    NoImagery,

    #[error("no region of interest")]
    NoRegion,

    #[error("kernel not ready: {id} is {validation}")]
    KernelNotReady { id: String, validation: Validation },

    #[error("no imagery linked to local artifacts, run a local export first")]
    NoLinkedImagery,

    #[error("kernel not found: {0}")]
    KernelNotFound(String),

    #[error("system kernel is immutable: {0}")]
    SystemKernel(String),

    #[error("local storage handle declined by operator (task {task_id})")]
    HandleDeclined { task_id: String },

    #[error("local save fallback unavailable (task {task_id}): {reason}")]
    FallbackUnavailable { task_id: String, reason: String },

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("{service} error: {message}")]
    Service { service: String, message: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(validation: Validation, reason: impl Into<String>) -> Self {
        Self::Validation {
            validation,
            reason: reason.into(),
        }
    }

    pub fn kernel_not_ready(id: impl Into<String>, validation: Validation) -> Self {
        Self::KernelNotReady {
            id: id.into(),
            validation,
        }
    }

    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Raised before any Task exists. An unknown kernel id counts: nothing
    /// can be selected for the run.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoImagery
                | Self::NoRegion
                | Self::KernelNotFound(_)
                | Self::KernelNotReady { .. }
                | Self::NoLinkedImagery
        )
    }

    /// Local-storage refusal that escalated to a Task-level failure.
    pub fn is_permission_denial(&self) -> bool {
        matches!(self, Self::HandleDeclined { .. } | Self::FallbackUnavailable { .. })
    }

    /// The rejection reason returned to the submitter, if this is a validation error.
    pub fn rejection_reason(&self) -> Option<&str> {
        match self {
            Self::Validation { reason, .. } => Some(reason),
            _ => None,
        }
    }
}
