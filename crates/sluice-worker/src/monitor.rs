//! Lease monitor: crash detection for tokio holders.
//!
//! Every admitted holder receives a [`Lease`](crate::lease::Lease) guard.
//! A guard dropped while still active (the holder panicked, was aborted or
//! returned early) reports a down notice through this monitor. Notices travel
//! over an unbounded channel to the regulator, which accepts them only if the
//! token is still watched; anything unwatched in the meantime is discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use sluice_core::{DownReason, HolderId, HolderMonitor, LeaseToken, ValveEvent};

/// A holder went away while its lease was active.
#[derive(Debug, Clone, PartialEq)]
pub struct DownNotice {
    pub token: LeaseToken,
    pub holder: HolderId,
    pub reason: DownReason,
}

pub struct LeaseMonitor {
    watched: Mutex<HashMap<LeaseToken, HolderId>>,
    down_tx: mpsc::UnboundedSender<DownNotice>,
}

impl LeaseMonitor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DownNotice>) {
        let (down_tx, down_rx) = mpsc::unbounded_channel();
        let monitor = Arc::new(Self {
            watched: Mutex::new(HashMap::new()),
            down_tx,
        });
        (monitor, down_rx)
    }

    fn watched(&self) -> MutexGuard<'_, HashMap<LeaseToken, HolderId>> {
        // A poisoned map is still consistent: every critical section is a
        // single insert or remove.
        self.watched.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_watched(&self, token: &LeaseToken) -> bool {
        self.watched().contains_key(token)
    }

    pub fn watched_count(&self) -> usize {
        self.watched().len()
    }

    /// Report that the holder behind `token` terminated. Ignored for tokens
    /// that are no longer watched.
    pub fn report_down(&self, token: LeaseToken, reason: DownReason) {
        let holder = match self.watched().get(&token) {
            Some(holder) => *holder,
            None => return,
        };
        if self
            .down_tx
            .send(DownNotice {
                token,
                holder,
                reason,
            })
            .is_err()
        {
            tracing::trace!(token = %token, "Regulator gone, down notice dropped");
        }
    }

    /// Turn a delivered notice into a valve event, or `None` when the token
    /// was unwatched after the notice was sent.
    pub fn accept(&self, notice: DownNotice) -> Option<ValveEvent> {
        if self.watched().remove(&notice.token).is_none() {
            tracing::debug!(token = %notice.token, "Discarding stale down notice");
            return None;
        }
        Some(ValveEvent::HolderDown {
            token: notice.token,
            holder: notice.holder,
            reason: notice.reason,
        })
    }
}

impl HolderMonitor for LeaseMonitor {
    fn watch(&self, holder: HolderId) -> LeaseToken {
        let token = LeaseToken::new();
        self.watched().insert(token, holder);
        token
    }

    fn unwatch(&self, token: LeaseToken) {
        self.watched().remove(&token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn down_notice_for_watched_holder_is_accepted() {
        let (monitor, mut rx) = LeaseMonitor::new();
        let holder = HolderId::new();
        let token = monitor.watch(holder);

        monitor.report_down(token, DownReason::Abandoned);
        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.holder, holder);

        let event = monitor.accept(notice).unwrap();
        assert_eq!(
            event,
            ValveEvent::HolderDown {
                token,
                holder,
                reason: DownReason::Abandoned
            }
        );
        assert!(!monitor.is_watched(&token));
    }

    #[test]
    fn unwatch_discards_in_flight_notice() {
        let (monitor, mut rx) = LeaseMonitor::new();
        let token = monitor.watch(HolderId::new());

        monitor.report_down(token, DownReason::Failed("holder panicked".into()));
        monitor.unwatch(token);

        let notice = rx.try_recv().unwrap();
        assert!(monitor.accept(notice).is_none());
    }

    #[test]
    fn report_for_unwatched_token_sends_nothing() {
        let (monitor, mut rx) = LeaseMonitor::new();
        let token = monitor.watch(HolderId::new());
        monitor.unwatch(token);

        monitor.report_down(token, DownReason::Abandoned);
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.watched_count(), 0);
    }
}
