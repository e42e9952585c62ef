//! Valve contract
//!
//! A valve is the pluggable strategy a regulating broker consults to decide
//! whether it should keep admitting work. The broker holds a `Box<dyn Valve>`
//! and drives it through the calls below; it never inspects which strategy it
//! is talking to.
//!
//! Every call receives the current time and returns a [`Transition`]: the
//! recomputed [`ValveStatus`](crate::types::ValveStatus) and an optional
//! deadline at which the broker must call [`Valve::on_wake`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::capacity_valve::CapacityValve;
use crate::config::ValveConfig;
use crate::error::ValveResult;
use crate::monitor::HolderMonitor;
use crate::registry::LeaseRegistry;
use crate::types::{ExtendOutcome, HolderId, LeaseToken, ReleaseOutcome, Transition, ValveStatus};

/// Why a watched holder went away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DownReason {
    /// The holder dropped its lease without releasing it, including a task
    /// that was aborted or a future that was cancelled.
    Abandoned,
    /// The holder panicked while holding the lease.
    Failed(String),
}

/// Out-of-band event delivered through [`Valve::notify`].
#[derive(Debug, Clone, PartialEq)]
pub enum ValveEvent {
    /// A watched holder terminated while still holding the lease.
    HolderDown {
        token: LeaseToken,
        holder: HolderId,
        reason: DownReason,
    },
    /// Any other event. Strategies ignore what they do not understand.
    Custom(serde_json::Value),
}

/// Lifecycle operations every valve strategy exposes to the broker.
///
/// Construction is strategy specific (see [`ValveKind::initialize`]); after
/// that all calls are strictly sequential against one instance.
pub trait Valve: Send {
    /// Record a new lease. Never rejected: status only advises the broker.
    fn admit(&mut self, token: LeaseToken, holder: HolderId, now: Instant) -> Transition;

    /// Remove a lease if present.
    fn release(&mut self, token: LeaseToken, now: Instant) -> (ReleaseOutcome, Transition);

    /// Re-validate a lease that is already held.
    fn extend(&mut self, token: LeaseToken, now: Instant) -> (ExtendOutcome, Transition);

    /// Notify the valve of an external metric.
    fn update_signal(&mut self, value: f64, now: Instant) -> Transition;

    /// Deliver an out-of-band event, including holder-down notifications.
    fn notify(&mut self, event: ValveEvent, now: Instant) -> Transition;

    /// Called once a previously requested wake-up deadline has passed.
    fn on_wake(&mut self, now: Instant) -> Transition;

    /// Validate and apply a new configuration. On error nothing changes.
    fn reconfigure(&mut self, config: ValveConfig, now: Instant) -> ValveResult<Transition>;

    /// Number of outstanding leases.
    fn size(&self) -> usize;

    fn status(&self) -> ValveStatus;

    /// Hand the registry back for a successor instance. No calls follow.
    fn terminate(self: Box<Self>) -> LeaseRegistry;
}

/// Available valve strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValveKind {
    /// Gate strictly on outstanding-lease count against a fixed maximum.
    #[default]
    Capacity,
}

impl ValveKind {
    /// Build a strategy from a (possibly handed-over) registry.
    pub fn initialize(
        self,
        registry: LeaseRegistry,
        config: ValveConfig,
        monitor: Arc<dyn HolderMonitor>,
        now: Instant,
    ) -> ValveResult<(Box<dyn Valve>, Transition)> {
        match self {
            ValveKind::Capacity => {
                let (valve, transition) = CapacityValve::initialize(registry, config, monitor, now)?;
                Ok((Box::new(valve), transition))
            }
        }
    }
}
