//! Holder monitoring collaborator
//!
//! A valve never watches holders itself. The broker asks a [`HolderMonitor`]
//! to watch each holder it admits and receives the lease token in return;
//! when a holder terminates without releasing, the monitor delivers a
//! [`ValveEvent::HolderDown`](crate::valve::ValveEvent::HolderDown) that the
//! broker routes into `Valve::notify`. When a lease ends normally the valve
//! calls [`HolderMonitor::unwatch`] so that no stale notification follows.

use crate::types::{HolderId, LeaseToken};

/// Monitoring facility used by valves and brokers.
pub trait HolderMonitor: Send + Sync {
    /// Start watching `holder` and mint the token its lease is keyed by.
    fn watch(&self, holder: HolderId) -> LeaseToken;

    /// Stop watching the holder behind `token` and discard any notification
    /// for it that is already in flight.
    fn unwatch(&self, token: LeaseToken);
}

/// Monitor that watches nothing: tokens are minted, no notification is ever
/// delivered. Used when the broker has no crash detection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl HolderMonitor for NoopMonitor {
    fn watch(&self, _holder: HolderId) -> LeaseToken {
        LeaseToken::new()
    }

    fn unwatch(&self, _token: LeaseToken) {}
}
