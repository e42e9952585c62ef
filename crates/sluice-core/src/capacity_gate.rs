//! Capacity gate trait for pollers outside the broker.
//!
//! Implementations report whether the regulator behind them is currently
//! admitting work, i.e. whether its valve is open. Used by producers that want
//! to hold back submissions instead of growing the wait queue.

use async_trait::async_trait;

/// Gate that determines whether new work should be submitted right now.
///
/// A `false` answer is advisory: submissions are still accepted and queued,
/// they simply wait until the valve reopens.
#[async_trait]
pub trait CapacityGate: Send + Sync {
    /// Returns true if the regulator is currently admitting new work.
    async fn can_accept_task(&self) -> bool;
}
