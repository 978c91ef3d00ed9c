//! Sentinel Core - Types, configuration, telemetry and error handling

pub mod config;
pub mod error;
pub mod telemetry;
pub mod types;

pub use config::SentinelConfig;
pub use error::{Error, Result};
pub use telemetry::{Diagnostics, HealthStatus, LogEntry, LogLevel, TelemetryLog};
pub use types::*;
