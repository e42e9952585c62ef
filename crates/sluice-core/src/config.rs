//! Configuration module
//!
//! Valve configuration can come from the environment, from a JSON document
//! delivered by a configuration source, or be built directly. Every path
//! validates the capacity before a `ValveConfig` exists, so a valve only ever
//! sees well-formed limits.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;

use crate::capacity::Capacity;
use crate::error::ValveResult;

/// Environment variable holding the valve maximum (integer or `infinity`).
pub const VALVE_MAX_ENV: &str = "SLUICE_VALVE_MAX";

const DEFAULT_VALVE_MAX: &str = "infinity";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValveConfig {
    #[serde(default)]
    pub max: Capacity,
}

impl ValveConfig {
    pub fn new(max: impl Into<Capacity>) -> Self {
        Self { max: max.into() }
    }

    pub fn unbounded() -> Self {
        Self {
            max: Capacity::Unbounded,
        }
    }

    /// Build from a signed maximum, rejecting negative values.
    pub fn try_from_max(max: i64) -> ValveResult<Self> {
        Ok(Self {
            max: Capacity::try_from(max)?,
        })
    }

    /// Parse a maximum such as `"8"` or `"infinity"`.
    pub fn parse_max(max: &str) -> ValveResult<Self> {
        Ok(Self { max: max.parse()? })
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let raw = env::var(VALVE_MAX_ENV).unwrap_or_else(|_| DEFAULT_VALVE_MAX.to_string());
        Self::parse_max(&raw).with_context(|| format!("{} is invalid", VALVE_MAX_ENV))
    }

    pub fn from_json(payload: &str) -> Result<Self, anyhow::Error> {
        serde_json::from_str(payload).context("Failed to parse valve configuration")
    }
}
