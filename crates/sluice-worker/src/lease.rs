//! Lease guard handed to admitted holders.

use sluice_core::{DownReason, ExtendOutcome, HolderId, LeaseToken, ReleaseOutcome};

use crate::error::{RegulatorError, RegulatorResult};
use crate::regulator::RegulatorHandle;

/// Proof of admission held by one unit of work.
///
/// Finish with [`Lease::done`]. A lease dropped while still active counts as
/// a holder crash: the monitor reports it and the valve frees the slot.
#[must_use = "dropping a lease without calling `done` reports the holder as down"]
pub struct Lease {
    token: LeaseToken,
    holder: HolderId,
    handle: RegulatorHandle,
    active: bool,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("token", &self.token)
            .field("holder", &self.holder)
            .field("active", &self.active)
            .finish()
    }
}

impl Lease {
    pub(crate) fn new(token: LeaseToken, holder: HolderId, handle: RegulatorHandle) -> Self {
        Self {
            token,
            holder,
            handle,
            active: true,
        }
    }

    pub fn token(&self) -> LeaseToken {
        self.token
    }

    pub fn holder(&self) -> HolderId {
        self.holder
    }

    /// False once the lease was completed, drained or lost.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Complete the lease.
    pub async fn done(mut self) -> RegulatorResult<ReleaseOutcome> {
        let pending = self.handle.send_release(self.token).await?;
        // The valve owns the lease from here on, even if this future is dropped.
        self.active = false;
        pending.await.map_err(|_| RegulatorError::Stopped)
    }

    /// Ask the regulator whether this lease may continue.
    ///
    /// Any outcome other than [`ExtendOutcome::Extended`] ends the lease: the
    /// valve either drained it (oversubscribed) or no longer knows it.
    pub async fn extend(&mut self) -> RegulatorResult<ExtendOutcome> {
        if !self.active {
            return Ok(ExtendOutcome::NotFound);
        }
        let outcome = self.handle.extend(self.token).await?;
        if outcome != ExtendOutcome::Extended {
            self.active = false;
        }
        Ok(outcome)
    }
}

/// Reason reported for a lease dropped while active.
///
/// Only a drop during unwinding on the holder's own thread is seen as a
/// panic. Tokio drops a panicked task's future after catching the panic, so
/// async holders that panic are reported as abandoned.
fn drop_reason() -> DownReason {
    if std::thread::panicking() {
        DownReason::Failed("holder panicked".to_string())
    } else {
        DownReason::Abandoned
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.active {
            let reason = drop_reason();
            tracing::debug!(
                token = %self.token,
                holder = %self.holder,
                reason = ?reason,
                "Lease dropped while active"
            );
            self.handle.monitor().report_down(self.token, reason);
        }
    }
}
