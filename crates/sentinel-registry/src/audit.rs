//! Audit port — remote validation of submitted kernel source.
//!
//! The port returns whatever the remote side said. `AuditGate` bounds the
//! call with a timeout and folds every outcome (reply, transport error,
//! timeout) into a tagged `AuditVerdict` before the registry sees it.

use sentinel_core::{Result, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const UNAVAILABLE_REASON: &str = "audit service unavailable";
pub const FAILED_REASON: &str = "logic audit failed";
pub const EMPTY_SOURCE_REASON: &str = "kernel source is empty";

/// Verdict exactly as the audit service reported it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RawVerdict {
    pub valid: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// External validator of kernel source.
#[async_trait::async_trait]
pub trait AuditPort: Send + Sync {
    async fn audit(&self, code: &str) -> Result<RawVerdict>;
}

/// Boundary-checked verdict.
#[derive(Clone, Debug, PartialEq)]
pub enum AuditVerdict {
    Accepted { reason: Option<String> },
    Rejected { validation: Validation, reason: String },
}

impl AuditVerdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::Rejected {
            validation: classify(&reason),
            reason,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

impl From<RawVerdict> for AuditVerdict {
    fn from(raw: RawVerdict) -> Self {
        let reason = raw.reason.filter(|r| !r.trim().is_empty());
        if raw.valid {
            Self::Accepted { reason }
        } else {
            Self::rejected(reason.unwrap_or_else(|| FAILED_REASON.to_string()))
        }
    }
}

/// Rejections that name an unsupported construct are `Unsupported`; the rest `Invalid`.
fn classify(reason: &str) -> Validation {
    if reason.to_ascii_lowercase().contains("unsupported") {
        Validation::Unsupported
    } else {
        Validation::Invalid
    }
}

/// Timeout-bounded access to an audit port.
#[derive(Clone)]
pub struct AuditGate {
    port: Arc<dyn AuditPort>,
    timeout: Duration,
}

impl AuditGate {
    pub fn new(port: Arc<dyn AuditPort>, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Never blocks past the timeout and never returns an undecided verdict.
    pub async fn audit(&self, code: &str) -> AuditVerdict {
        if code.trim().is_empty() {
            return AuditVerdict::Rejected {
                validation: Validation::Invalid,
                reason: EMPTY_SOURCE_REASON.into(),
            };
        }
        match tokio::time::timeout(self.timeout, self.port.audit(code)).await {
            Ok(Ok(raw)) => raw.into(),
            Ok(Err(e)) => {
                warn!("audit call failed: {}", e);
                AuditVerdict::Rejected {
                    validation: Validation::Invalid,
                    reason: UNAVAILABLE_REASON.into(),
                }
            }
            Err(_) => {
                warn!("audit timed out after {}ms", self.timeout.as_millis());
                AuditVerdict::Rejected {
                    validation: Validation::Invalid,
                    reason: UNAVAILABLE_REASON.into(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::Error;

    struct Fixed(Result<RawVerdict>);

    #[async_trait::async_trait]
    impl AuditPort for Fixed {
        async fn audit(&self, _code: &str) -> Result<RawVerdict> {
            match &self.0 {
                Ok(v) => Ok(v.clone()),
                Err(_) => Err(Error::service("audit", "connection refused")),
            }
        }
    }

    struct Hangs;

    #[async_trait::async_trait]
    impl AuditPort for Hangs {
        async fn audit(&self, _code: &str) -> Result<RawVerdict> {
            std::future::pending().await
        }
    }

    fn gate(port: impl AuditPort + 'static) -> AuditGate {
        AuditGate::new(Arc::new(port), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn accepted_passes_through() {
        let g = gate(Fixed(Ok(RawVerdict {
            valid: true,
            reason: Some("looks fine".into()),
        })));
        assert_eq!(
            g.audit("return img;").await,
            AuditVerdict::Accepted {
                reason: Some("looks fine".into()),
            }
        );
    }

    #[tokio::test]
    async fn unsupported_reason_is_classified() {
        let g = gate(Fixed(Ok(RawVerdict {
            valid: false,
            reason: Some("unsupported band reference".into()),
        })));
        assert_eq!(
            g.audit("img.select('B99')").await,
            AuditVerdict::Rejected {
                validation: Validation::Unsupported,
                reason: "unsupported band reference".into()
            }
        );
    }

    #[tokio::test]
    async fn reject_without_reason_gets_generic_reason() {
        let g = gate(Fixed(Ok(RawVerdict {
            valid: false,
            reason: None,
        })));
        match g.audit("x").await {
            AuditVerdict::Rejected { validation, reason } => {
                assert_eq!(validation, Validation::Invalid);
                assert_eq!(reason, FAILED_REASON);
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn transport_error_is_rejection() {
        let g = gate(Fixed(Err(Error::service("audit", "down"))));
        assert_eq!(g.audit("x").await, AuditVerdict::rejected(UNAVAILABLE_REASON));
    }

    #[tokio::test]
    async fn timeout_is_rejection() {
        let g = gate(Hangs);
        let verdict = g.audit("x").await;
        assert!(!verdict.is_accepted());
        assert_eq!(verdict, AuditVerdict::rejected(UNAVAILABLE_REASON));
    }

    #[tokio::test]
    async fn empty_source_never_reaches_port() {
        let g = gate(Hangs);
        assert_eq!(g.audit("   ").await, AuditVerdict::rejected(EMPTY_SOURCE_REASON));
    }
}
