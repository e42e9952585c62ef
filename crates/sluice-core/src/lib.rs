//! Sluice Core Library
//!
//! This crate provides the valve contract, the fixed-capacity valve, the lease
//! registry handed between valve instances, and the collaborator traits a
//! broker implements around them.

pub mod capacity;
pub mod capacity_gate;
pub mod capacity_valve;
pub mod config;
pub mod error;
pub mod monitor;
pub mod registry;
pub mod types;
pub mod valve;

// Re-export commonly used types
pub use capacity::Capacity;
pub use capacity_gate::CapacityGate;
pub use capacity_valve::CapacityValve;
pub use config::ValveConfig;
pub use error::{log_error, ErrorMetadata, LogLevel, ValveError, ValveResult};
pub use monitor::{HolderMonitor, NoopMonitor};
pub use registry::LeaseRegistry;
pub use types::{ExtendOutcome, HolderId, LeaseToken, ReleaseOutcome, Transition, ValveStatus};
pub use valve::{DownReason, Valve, ValveEvent, ValveKind};
