//! Fixed-capacity valve.
//!
//! Gates strictly on the number of outstanding leases against a configured
//! maximum: the valve is open while `size < max` and closed otherwise.
//! Admissions are always recorded, even when closed; the broker is expected to
//! have consulted the status before admitting.
//!
//! Lowering the maximum below the number of held leases puts the valve into an
//! oversubscribed state. While oversubscribed, `extend` completes the lease it
//! is called for instead of continuing it, so the registry drains back to the
//! maximum as holders cycle through.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::capacity::Capacity;
use crate::config::ValveConfig;
use crate::error::ValveResult;
use crate::monitor::HolderMonitor;
use crate::registry::LeaseRegistry;
use crate::types::{ExtendOutcome, HolderId, LeaseToken, ReleaseOutcome, Transition, ValveStatus};
use crate::valve::{Valve, ValveEvent};

pub struct CapacityValve {
    config: ValveConfig,
    registry: LeaseRegistry,
    monitor: Arc<dyn HolderMonitor>,
}

impl fmt::Debug for CapacityValve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapacityValve")
            .field("max", &self.config.max)
            .field("size", &self.registry.len())
            .finish()
    }
}

impl CapacityValve {
    /// Build the valve around a registry handed over by a predecessor (or an
    /// empty one). Leases in the registry are adopted as-is.
    pub fn initialize(
        registry: LeaseRegistry,
        config: ValveConfig,
        monitor: Arc<dyn HolderMonitor>,
        _now: Instant,
    ) -> ValveResult<(Self, Transition)> {
        let valve = Self {
            config,
            registry,
            monitor,
        };
        tracing::info!(
            max = %valve.config.max,
            size = valve.registry.len(),
            status = %valve.status(),
            "Capacity valve initialized"
        );
        let transition = valve.settle();
        Ok((valve, transition))
    }

    pub fn max(&self) -> Capacity {
        self.config.max
    }

    pub fn registry(&self) -> &LeaseRegistry {
        &self.registry
    }

    /// True when more leases are held than the maximum allows.
    pub fn is_oversubscribed(&self) -> bool {
        self.config.max.compare_size(self.registry.len()) == Ordering::Greater
    }

    /// Consume the valve and return its registry.
    pub fn into_registry(self) -> LeaseRegistry {
        tracing::info!(size = self.registry.len(), "Capacity valve terminated");
        self.registry
    }

    fn current_status(&self) -> ValveStatus {
        if self.config.max.admits(self.registry.len()) {
            ValveStatus::Open
        } else {
            ValveStatus::Closed
        }
    }

    // This strategy never asks to be woken.
    fn settle(&self) -> Transition {
        Transition::settled(self.current_status())
    }

    /// Remove a lease that ended through a broker call and stop monitoring it.
    fn drop_lease(&mut self, token: LeaseToken) -> bool {
        match self.registry.remove(&token) {
            Some(_) => {
                self.monitor.unwatch(token);
                true
            }
            None => false,
        }
    }
}

impl Valve for CapacityValve {
    fn admit(&mut self, token: LeaseToken, holder: HolderId, _now: Instant) -> Transition {
        if let Some(previous) = self.registry.insert(token, holder) {
            tracing::warn!(
                token = %token,
                previous_holder = %previous,
                holder = %holder,
                "Lease token admitted twice, holder replaced"
            );
        }
        let transition = self.settle();
        tracing::debug!(
            token = %token,
            size = self.registry.len(),
            status = %transition.status,
            "Lease admitted"
        );
        transition
    }

    fn release(&mut self, token: LeaseToken, _now: Instant) -> (ReleaseOutcome, Transition) {
        let outcome = if self.drop_lease(token) {
            ReleaseOutcome::Released
        } else {
            ReleaseOutcome::NotFound
        };
        let transition = self.settle();
        tracing::debug!(
            token = %token,
            outcome = ?outcome,
            size = self.registry.len(),
            status = %transition.status,
            "Lease release"
        );
        (outcome, transition)
    }

    fn extend(&mut self, token: LeaseToken, _now: Instant) -> (ExtendOutcome, Transition) {
        let size = self.registry.len();
        let present = self.registry.contains(&token);

        let (outcome, status) = match self.config.max.compare_size(size) {
            Ordering::Less if present => (ExtendOutcome::Extended, ValveStatus::Open),
            Ordering::Less => (ExtendOutcome::NotFound, ValveStatus::Open),
            Ordering::Equal if present => (ExtendOutcome::Extended, ValveStatus::Closed),
            Ordering::Equal => (ExtendOutcome::NotFound, ValveStatus::Closed),
            // Oversubscribed: complete the lease instead of continuing it.
            Ordering::Greater if present => {
                self.drop_lease(token);
                tracing::debug!(
                    token = %token,
                    size = self.registry.len(),
                    max = %self.config.max,
                    "Oversubscribed, lease drained on extend"
                );
                (ExtendOutcome::Released, ValveStatus::Closed)
            }
            Ordering::Greater => (ExtendOutcome::NotFound, ValveStatus::Closed),
        };

        debug_assert_eq!(status, self.current_status());
        (outcome, Transition::settled(status))
    }

    fn update_signal(&mut self, _value: f64, _now: Instant) -> Transition {
        self.settle()
    }

    fn notify(&mut self, event: ValveEvent, _now: Instant) -> Transition {
        match event {
            ValveEvent::HolderDown {
                token,
                holder,
                reason,
            } => {
                // The subscription already fired, nothing to unwatch.
                if self.registry.remove(&token).is_some() {
                    tracing::info!(
                        token = %token,
                        holder = %holder,
                        reason = ?reason,
                        size = self.registry.len(),
                        "Holder down, lease released"
                    );
                } else {
                    tracing::debug!(token = %token, "Holder down for unknown lease, ignored");
                }
            }
            ValveEvent::Custom(payload) => {
                tracing::trace!(payload = %payload, "Ignoring custom valve event");
            }
        }
        self.settle()
    }

    fn on_wake(&mut self, _now: Instant) -> Transition {
        self.settle()
    }

    fn reconfigure(&mut self, config: ValveConfig, _now: Instant) -> ValveResult<Transition> {
        let previous = self.config.max;
        self.config = config;
        if self.is_oversubscribed() {
            tracing::warn!(
                previous_max = %previous,
                max = %self.config.max,
                size = self.registry.len(),
                "Capacity lowered below outstanding leases, draining"
            );
        } else {
            tracing::info!(previous_max = %previous, max = %self.config.max, "Capacity valve reconfigured");
        }
        Ok(self.settle())
    }

    fn size(&self) -> usize {
        self.registry.len()
    }

    fn status(&self) -> ValveStatus {
        self.current_status()
    }

    fn terminate(self: Box<Self>) -> LeaseRegistry {
        self.into_registry()
    }
}
