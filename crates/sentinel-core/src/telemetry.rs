//! Telemetry log — append-only structured event stream for monitoring.
//!
//! Every entry is mirrored to `tracing` and broadcast to live subscribers.
//! A bounded window of recent entries is retained for late readers, along
//! with the most recent Error entry, which also flips the health status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
    Error,
    Success,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Debug => write!(f, "DEBUG"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Success => write!(f, "SUCCESS"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl LogEntry {
    pub fn line(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    #[default]
    Stable,
    /// At least one Error entry has been logged.
    Critical,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stable => write!(f, "STABLE"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Point-in-time view for monitoring consumers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub status: HealthStatus,
    pub last_error: Option<LogEntry>,
    pub recent_logs: Vec<LogEntry>,
}

/// Shared handle. Clones append to the same stream.
#[derive(Clone)]
pub struct TelemetryLog {
    inner: Arc<Inner>,
}

struct Inner {
    window: Mutex<Window>,
    capacity: usize,
    tx: broadcast::Sender<LogEntry>,
}

#[derive(Default)]
struct Window {
    entries: VecDeque<LogEntry>,
    last_error: Option<LogEntry>,
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new(100)
    }
}

impl TelemetryLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity.max(16));
        Self {
            inner: Arc::new(Inner {
                window: Mutex::new(Window {
                    entries: VecDeque::with_capacity(capacity),
                    last_error: None,
                }),
                capacity,
                tx,
            }),
        }
    }

    pub fn log(
        &self,
        level: LogLevel,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> LogEntry {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            payload,
        };

        match level {
            LogLevel::Debug => {
                tracing::debug!(target: "sentinel::telemetry", "{}", entry.message)
            }
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(target: "sentinel::telemetry", kind = %level, "{}", entry.message)
            }
            LogLevel::Warn => tracing::warn!(target: "sentinel::telemetry", "{}", entry.message),
            LogLevel::Error => {
                tracing::error!(target: "sentinel::telemetry", "{}", entry.message)
            }
        }

        {
            let mut window = self.window();
            if window.entries.len() == self.inner.capacity {
                window.entries.pop_front();
            }
            window.entries.push_back(entry.clone());
            if level == LogLevel::Error {
                window.last_error = Some(entry.clone());
            }
        }
        // No receivers is fine: the window still holds the entry.
        let _ = self.inner.tx.send(entry.clone());
        entry
    }

    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.log(LogLevel::Info, message, None)
    }

    pub fn warn(&self, message: impl Into<String>) -> LogEntry {
        self.log(LogLevel::Warn, message, None)
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> LogEntry {
        self.log(LogLevel::Error, message, payload)
    }

    pub fn success(&self, message: impl Into<String>) -> LogEntry {
        self.log(LogLevel::Success, message, None)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.inner.tx.subscribe()
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.window().entries.iter().cloned().collect()
    }

    /// The last `n` retained entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogEntry> {
        let window = self.window();
        let skip = window.entries.len().saturating_sub(n);
        window.entries.iter().skip(skip).cloned().collect()
    }

    /// Most recent Error entry, kept even after it leaves the window.
    pub fn last_error(&self) -> Option<LogEntry> {
        self.window().last_error.clone()
    }

    pub fn status(&self) -> HealthStatus {
        if self.window().last_error.is_some() {
            HealthStatus::Critical
        } else {
            HealthStatus::Stable
        }
    }

    /// Status, last error and the `n` most recent entries in one read.
    pub fn diagnostics(&self, n: usize) -> Diagnostics {
        let window = self.window();
        let skip = window.entries.len().saturating_sub(n);
        Diagnostics {
            status: if window.last_error.is_some() {
                HealthStatus::Critical
            } else {
                HealthStatus::Stable
            },
            last_error: window.last_error.clone(),
            recent_logs: window.entries.iter().skip(skip).cloned().collect(),
        }
    }

    pub fn filter(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries().into_iter().filter(|e| e.level == level).collect()
    }

    pub fn len(&self) -> usize {
        self.window().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn window(&self) -> MutexGuard<'_, Window> {
        self.inner.window.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_drops_oldest() {
        let log = TelemetryLog::new(3);
        for i in 0..5 {
            log.info(format!("entry {}", i));
        }
        let entries = log.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "entry 2");
        assert_eq!(entries[2].message, "entry 4");
    }

    #[test]
    fn filter_by_level() {
        let log = TelemetryLog::new(10);
        log.info("a");
        log.error("b", Some(serde_json::json!({"item": "x"})));
        log.warn("c");
        let errors = log.filter(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].payload.as_ref().unwrap()["item"], "x");
    }

    #[tokio::test]
    async fn subscribers_see_live_entries() {
        let log = TelemetryLog::new(10);
        let mut rx = log.subscribe();
        log.success("done");
        let entry = rx.recv().await.unwrap();
        assert_eq!(entry.level, LogLevel::Success);
        assert!(entry.line().contains("SUCCESS: done"));
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let log = TelemetryLog::new(10);
        for i in 0..6 {
            log.info(format!("entry {}", i));
        }
        let tail: Vec<String> = log.recent(3).into_iter().map(|e| e.message).collect();
        assert_eq!(tail, vec!["entry 3", "entry 4", "entry 5"]);
        assert_eq!(log.recent(50).len(), 6);
        assert!(log.recent(0).is_empty());
    }

    #[test]
    fn error_sets_last_error_and_critical() {
        let log = TelemetryLog::new(2);
        log.info("warming up");
        assert_eq!(log.status(), HealthStatus::Stable);
        assert!(log.last_error().is_none());

        log.error("first", None);
        log.error("export failed", Some(serde_json::json!({ "item": "S2/a" })));
        log.info("after");
        log.info("window rolled");

        // Both errors have left the window; the last one is still reported.
        assert!(log.filter(LogLevel::Error).is_empty());
        let last = log.last_error().unwrap();
        assert_eq!(last.message, "export failed");
        assert_eq!(last.payload.unwrap()["item"], "S2/a");
        assert_eq!(log.status(), HealthStatus::Critical);
    }

    #[test]
    fn diagnostics_serializes_camel_case() {
        let log = TelemetryLog::new(10);
        log.warn("slow audit");
        log.error("audit service unavailable", None);
        let d = log.diagnostics(10);
        assert_eq!(d.status, HealthStatus::Critical);
        assert_eq!(d.recent_logs.len(), 2);

        let v = serde_json::to_value(&d).unwrap();
        assert_eq!(v["status"], "CRITICAL");
        assert_eq!(v["lastError"]["message"], "audit service unavailable");
        assert_eq!(v["recentLogs"][0]["level"], "WARN");
    }

    #[test]
    fn level_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&LogLevel::Warn).unwrap(), r#""WARN""#);
    }
}
