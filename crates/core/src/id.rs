//! Strongly-typed identifiers used across the engine.
//!
//! Teams and services are identified by small integers assigned in
//! configuration, not by generated UUIDs — the newtype wrapper still buys
//! the usual benefit of not being able to pass a `ServiceId` where a
//! `TeamId` is expected.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

macro_rules! impl_int_id {
    ($t:ty, $name:literal) => {
        impl $t {
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            pub const fn value(&self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<u32> for $t {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl From<$t> for u32 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = EngineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .parse::<u32>()
                    .map_err(|e| EngineError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(value))
            }
        }
    };
}

/// Identifier of a team, assigned in configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(u32);

/// Identifier of a service, assigned in configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(u32);

impl_int_id!(TeamId, "TeamId");
impl_int_id!(ServiceId, "ServiceId");

/// A round number; round 0 means "before the game has started".
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundNum(pub u64);

impl RoundNum {
    pub const ZERO: RoundNum = RoundNum(0);

    pub fn checked_sub(self, rhs: u64) -> Option<RoundNum> {
        self.0.checked_sub(rhs).map(RoundNum)
    }
}

impl core::fmt::Display for RoundNum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
