//! Persistence-facing shapes: what the gateway reads and writes. These are
//! deliberately unsanitized — the Scoreboard Cache builds its external view
//! from these, stripping what shouldn't leak.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{CheckStatus, PointsKind, RoundNum, ServiceId, TeamId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    pub host: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub name: String,
    pub port: u16,
    pub checker: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointRecord {
    pub service_id: ServiceId,
    pub atk_pts: i64,
    pub def_pts: i64,
    pub sla_pts: i64,
}

impl PointRecord {
    pub fn zero(service_id: ServiceId) -> Self {
        Self {
            service_id,
            atk_pts: 0,
            def_pts: 0,
            sla_pts: 0,
        }
    }

    pub fn apply(&mut self, kind: PointsKind, increment: i64) {
        match kind {
            PointsKind::Atk => self.atk_pts += increment,
            PointsKind::Def => self.def_pts += increment,
            PointsKind::Sla => self.sla_pts += increment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub flag_data: String,
    pub seed: String,
    pub round_num: RoundNum,
    pub team_id: TeamId,
    pub service_id: ServiceId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StolenFlagRecord {
    pub flag_data: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LostFlagRecord {
    pub flag_data: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub service_id: ServiceId,
    pub status: CheckStatus,
    pub timestamp: DateTime<Utc>,
}

/// Full per-team state as the gateway sees it: the append-only history plus
/// the point records derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamState {
    pub team: Team,
    pub points: Vec<PointRecord>,
    pub stolen_flags: Vec<StolenFlagRecord>,
    pub lost_flags: Vec<LostFlagRecord>,
    pub checks: Vec<CheckRecord>,
    pub last_pts_update: DateTime<Utc>,
}

impl TeamState {
    pub fn new(team: Team, service_ids: &[ServiceId]) -> Self {
        Self {
            team,
            points: service_ids.iter().copied().map(PointRecord::zero).collect(),
            stolen_flags: Vec::new(),
            lost_flags: Vec::new(),
            checks: Vec::new(),
            last_pts_update: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn point_record_mut(&mut self, service_id: ServiceId) -> Option<&mut PointRecord> {
        self.points.iter_mut().find(|p| p.service_id == service_id)
    }
}
