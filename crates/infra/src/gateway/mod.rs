//! The Persistence Gateway: one trait, two implementations (in-memory,
//! Postgres). Named operations with precise failure kinds, matching the
//! engine's error taxonomy rather than one storage-agnostic everything-enum.

pub mod in_memory;
pub mod postgres;

use in_memory::InMemoryGateway;
use postgres::PostgresGateway;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_core::{PointsKind, RoundNum, ServiceId, TeamId};

use crate::model::{CheckRecord, Flag, LostFlagRecord, StolenFlagRecord, Team, TeamState};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("already exists")]
    AlreadyExistent,

    #[error("not found")]
    NotExistent,

    #[error("invalid update: {0}")]
    InvalidUpdate(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Object-safe, synchronous storage contract shared by every component
/// that touches persisted state. The Postgres implementation bridges to
/// async internally (see `gateway::postgres`); callers on plain OS threads
/// (the Round Scheduler, Event Dispatcher, Submission Service) call it
/// directly, and async callers (the HTTP facade) wrap calls in
/// `tokio::task::spawn_blocking`.
pub trait PersistenceGateway: Send + Sync {
    fn upsert_team(&self, team: Team, service_ids: &[ServiceId]) -> GatewayResult<()>;
    fn upsert_service(&self, service_id: ServiceId) -> GatewayResult<()>;

    fn insert_flag(&self, flag: Flag) -> GatewayResult<()>;
    fn get_flag_by_data(&self, data: &str) -> GatewayResult<Flag>;
    fn get_flag_for_round(
        &self,
        round: RoundNum,
        team: TeamId,
        service: ServiceId,
    ) -> GatewayResult<Flag>;

    fn push_stolen_flag(&self, team_id: TeamId, record: StolenFlagRecord) -> GatewayResult<()>;
    fn push_lost_flag(&self, team_id: TeamId, record: LostFlagRecord) -> GatewayResult<()>;
    fn push_check(&self, team_id: TeamId, record: CheckRecord) -> GatewayResult<()>;

    fn check_stolen_flag(&self, team_id: TeamId, data: &str) -> GatewayResult<StolenFlagRecord>;

    fn update_points(
        &self,
        team_id: TeamId,
        service_id: ServiceId,
        pts_type: PointsKind,
        increment: i64,
        ts: DateTime<Utc>,
    ) -> GatewayResult<()>;

    /// Full recompute of every team's point records from its append-only
    /// history, using `scoring::apply` so live updates and replay can
    /// never drift apart.
    fn resume_points(&self) -> GatewayResult<()>;

    fn ensure_flag_index(&self) -> GatewayResult<()>;

    /// Snapshot of every team's state, used by the Scoreboard Cache to
    /// rebuild its sanitized view.
    fn all_team_states(&self) -> GatewayResult<Vec<TeamState>>;
}

impl<G> PersistenceGateway for Arc<G>
where
    G: PersistenceGateway + ?Sized,
{
    fn upsert_team(&self, team: Team, service_ids: &[ServiceId]) -> GatewayResult<()> {
        (**self).upsert_team(team, service_ids)
    }

    fn upsert_service(&self, service_id: ServiceId) -> GatewayResult<()> {
        (**self).upsert_service(service_id)
    }

    fn insert_flag(&self, flag: Flag) -> GatewayResult<()> {
        (**self).insert_flag(flag)
    }

    fn get_flag_by_data(&self, data: &str) -> GatewayResult<Flag> {
        (**self).get_flag_by_data(data)
    }

    fn get_flag_for_round(
        &self,
        round: RoundNum,
        team: TeamId,
        service: ServiceId,
    ) -> GatewayResult<Flag> {
        (**self).get_flag_for_round(round, team, service)
    }

    fn push_stolen_flag(&self, team_id: TeamId, record: StolenFlagRecord) -> GatewayResult<()> {
        (**self).push_stolen_flag(team_id, record)
    }

    fn push_lost_flag(&self, team_id: TeamId, record: LostFlagRecord) -> GatewayResult<()> {
        (**self).push_lost_flag(team_id, record)
    }

    fn push_check(&self, team_id: TeamId, record: CheckRecord) -> GatewayResult<()> {
        (**self).push_check(team_id, record)
    }

    fn check_stolen_flag(&self, team_id: TeamId, data: &str) -> GatewayResult<StolenFlagRecord> {
        (**self).check_stolen_flag(team_id, data)
    }

    fn update_points(
        &self,
        team_id: TeamId,
        service_id: ServiceId,
        pts_type: PointsKind,
        increment: i64,
        ts: DateTime<Utc>,
    ) -> GatewayResult<()> {
        (**self).update_points(team_id, service_id, pts_type, increment, ts)
    }

    fn resume_points(&self) -> GatewayResult<()> {
        (**self).resume_points()
    }

    fn ensure_flag_index(&self) -> GatewayResult<()> {
        (**self).ensure_flag_index()
    }

    fn all_team_states(&self) -> GatewayResult<Vec<TeamState>> {
        (**self).all_team_states()
    }
}

/// Either backend, chosen once at startup from `StoreConfig`. Keeps the
/// worker and handler signatures generic over a single concrete type
/// instead of a trait object, at the cost of one match arm per method.
pub enum AnyGateway {
    InMemory(InMemoryGateway),
    Postgres(PostgresGateway),
}

macro_rules! delegate {
    ($self:ident, $method:ident($($arg:ident),*)) => {
        match $self {
            AnyGateway::InMemory(g) => g.$method($($arg),*),
            AnyGateway::Postgres(g) => g.$method($($arg),*),
        }
    };
}

impl PersistenceGateway for AnyGateway {
    fn upsert_team(&self, team: Team, service_ids: &[ServiceId]) -> GatewayResult<()> {
        delegate!(self, upsert_team(team, service_ids))
    }

    fn upsert_service(&self, service_id: ServiceId) -> GatewayResult<()> {
        delegate!(self, upsert_service(service_id))
    }

    fn insert_flag(&self, flag: Flag) -> GatewayResult<()> {
        delegate!(self, insert_flag(flag))
    }

    fn get_flag_by_data(&self, data: &str) -> GatewayResult<Flag> {
        delegate!(self, get_flag_by_data(data))
    }

    fn get_flag_for_round(&self, round: RoundNum, team: TeamId, service: ServiceId) -> GatewayResult<Flag> {
        delegate!(self, get_flag_for_round(round, team, service))
    }

    fn push_stolen_flag(&self, team_id: TeamId, record: StolenFlagRecord) -> GatewayResult<()> {
        delegate!(self, push_stolen_flag(team_id, record))
    }

    fn push_lost_flag(&self, team_id: TeamId, record: LostFlagRecord) -> GatewayResult<()> {
        delegate!(self, push_lost_flag(team_id, record))
    }

    fn push_check(&self, team_id: TeamId, record: CheckRecord) -> GatewayResult<()> {
        delegate!(self, push_check(team_id, record))
    }

    fn check_stolen_flag(&self, team_id: TeamId, data: &str) -> GatewayResult<StolenFlagRecord> {
        delegate!(self, check_stolen_flag(team_id, data))
    }

    fn update_points(
        &self,
        team_id: TeamId,
        service_id: ServiceId,
        pts_type: PointsKind,
        increment: i64,
        ts: DateTime<Utc>,
    ) -> GatewayResult<()> {
        delegate!(self, update_points(team_id, service_id, pts_type, increment, ts))
    }

    fn resume_points(&self) -> GatewayResult<()> {
        delegate!(self, resume_points())
    }

    fn ensure_flag_index(&self) -> GatewayResult<()> {
        delegate!(self, ensure_flag_index())
    }

    fn all_team_states(&self) -> GatewayResult<Vec<TeamState>> {
        delegate!(self, all_team_states())
    }
}
