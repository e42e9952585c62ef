//! Identifiers, statuses and outcomes shared by every valve strategy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use uuid::Uuid;

/// Opaque key for one admitted unit of work.
///
/// Tokens are minted by the monitoring facility when it starts watching a
/// holder and are handed to the valve by the broker. A valve never creates
/// them and treats them as externally scoped unique keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    /// Mint a fresh random token.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for LeaseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of whatever is using a lease. Kept for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderId(Uuid);

impl HolderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for HolderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether the broker should keep admitting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValveStatus {
    Open,
    Closed,
}

impl ValveStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, ValveStatus::Open)
    }
}

impl fmt::Display for ValveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValveStatus::Open => write!(f, "open"),
            ValveStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Result of every valve contract call: the recomputed status plus an
/// optional deadline at which the broker should call `on_wake`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub status: ValveStatus,
    pub wake_at: Option<Instant>,
}

impl Transition {
    /// A transition that asks for no wake-up.
    pub fn settled(status: ValveStatus) -> Self {
        Self {
            status,
            wake_at: None,
        }
    }
}

/// Outcome of a `release` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    NotFound,
}

/// Outcome of an `extend` call.
///
/// `Released` only occurs while the valve is oversubscribed: the lease was
/// completed instead of continued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendOutcome {
    Extended,
    Released,
    NotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique() {
        assert_ne!(LeaseToken::new(), LeaseToken::new());
    }

    #[test]
    fn token_serializes_as_bare_uuid() {
        let id = Uuid::new_v4();
        let json = serde_json::to_string(&LeaseToken::from_uuid(id)).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn status_display() {
        assert_eq!(ValveStatus::Open.to_string(), "open");
        assert_eq!(ValveStatus::Closed.to_string(), "closed");
        assert!(ValveStatus::Open.is_open());
        assert!(!ValveStatus::Closed.is_open());
    }

    #[test]
    fn settled_transition_has_no_wake_hint() {
        let t = Transition::settled(ValveStatus::Closed);
        assert_eq!(t.status, ValveStatus::Closed);
        assert!(t.wake_at.is_none());
    }
}
