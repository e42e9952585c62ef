//! Telemetry initialization
//!
//! Installs the global tracing subscriber used by Sluice binaries.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, LogFormat, TelemetryConfig};
