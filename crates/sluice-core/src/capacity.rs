//! Capacity limit for a valve: a non-negative count or unbounded.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ValveError;

/// Maximum number of outstanding leases a valve tolerates before closing.
///
/// Negative limits cannot be represented; they are rejected while parsing
/// or converting, before any valve sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "CapacityRepr", into = "CapacityRepr")]
pub enum Capacity {
    Finite(usize),
    Unbounded,
}

impl Capacity {
    /// True while `size` leaves room for another lease (`size < max`).
    pub fn admits(&self, size: usize) -> bool {
        self.compare_size(size) == Ordering::Less
    }

    /// Orders an outstanding-lease count against this limit.
    ///
    /// `Greater` means the count exceeds the limit (oversubscription).
    pub fn compare_size(&self, size: usize) -> Ordering {
        match self {
            Capacity::Finite(max) => size.cmp(max),
            Capacity::Unbounded => Ordering::Less,
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity::Unbounded
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Finite(max) => write!(f, "{}", max),
            Capacity::Unbounded => write!(f, "infinity"),
        }
    }
}

impl TryFrom<i64> for Capacity {
    type Error = ValveError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(ValveError::NegativeCapacity(value));
        }
        usize::try_from(value)
            .map(Capacity::Finite)
            .map_err(|_| ValveError::MalformedCapacity(value.to_string()))
    }
}

impl From<usize> for Capacity {
    fn from(value: usize) -> Self {
        Capacity::Finite(value)
    }
}

impl FromStr for Capacity {
    type Err = ValveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "infinity" | "unbounded" | "inf" => Ok(Capacity::Unbounded),
            _ if trimmed.starts_with('-') => {
                let value = trimmed
                    .parse::<i64>()
                    .map_err(|_| ValveError::MalformedCapacity(trimmed.to_string()))?;
                Capacity::try_from(value)
            }
            // Counts beyond i64::MAX travel as text.
            _ => trimmed
                .parse::<usize>()
                .map(Capacity::Finite)
                .map_err(|_| ValveError::MalformedCapacity(trimmed.to_string())),
        }
    }
}

/// Wire form: an integer, or a string holding an integer or `"infinity"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CapacityRepr {
    Count(i64),
    Text(String),
}

impl TryFrom<CapacityRepr> for Capacity {
    type Error = ValveError;

    fn try_from(repr: CapacityRepr) -> Result<Self, Self::Error> {
        match repr {
            CapacityRepr::Count(value) => Capacity::try_from(value),
            CapacityRepr::Text(text) => text.parse(),
        }
    }
}

impl From<Capacity> for CapacityRepr {
    fn from(capacity: Capacity) -> Self {
        match capacity {
            Capacity::Finite(max) => match i64::try_from(max) {
                Ok(count) => CapacityRepr::Count(count),
                Err(_) => CapacityRepr::Text(max.to_string()),
            },
            Capacity::Unbounded => CapacityRepr::Text("infinity".to_string()),
        }
    }
}
