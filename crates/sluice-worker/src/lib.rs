//! Sluice worker: the regulator actor that drives a valve, and the lease
//! monitor that turns abandoned leases into holder-down notifications.

pub mod error;
pub mod lease;
pub mod monitor;
pub mod regulator;

pub use error::{RegulatorError, RegulatorResult};
pub use lease::Lease;
pub use monitor::{DownNotice, LeaseMonitor};
pub use regulator::{Regulator, RegulatorConfig, RegulatorHandle, RegulatorStats};
