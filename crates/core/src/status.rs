//! Check status and point-kind vocabulary shared by every component that
//! touches scoring.

use serde::{Deserialize, Serialize};

/// Outcome of a single checker call (`check`, `put`, or `get`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Mumble,
    Corrupt,
    Down,
    Error,
}

impl CheckStatus {
    /// SLA contribution of a single check, per the engine's scoring rule:
    /// OK is +1, {Mumble, Corrupt, Down} are -1, Error is 0.
    pub fn sla_delta(self) -> i64 {
        match self {
            CheckStatus::Ok => 1,
            CheckStatus::Mumble | CheckStatus::Corrupt | CheckStatus::Down => -1,
            CheckStatus::Error => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Ok => "ok",
            CheckStatus::Mumble => "mumble",
            CheckStatus::Corrupt => "corrupt",
            CheckStatus::Down => "down",
            CheckStatus::Error => "error",
        }
    }
}

impl core::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which per-service counter a point update targets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointsKind {
    Atk,
    Def,
    Sla,
}

impl PointsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PointsKind::Atk => "atk_pts",
            PointsKind::Def => "def_pts",
            PointsKind::Sla => "sla_pts",
        }
    }
}

impl core::fmt::Display for PointsKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
