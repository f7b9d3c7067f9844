//! In-memory gateway for tests and local development without a database.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use warden_core::{PointsKind, RoundNum, ServiceId, TeamId};

use crate::model::{CheckRecord, Flag, LostFlagRecord, StolenFlagRecord, Team, TeamState};
use crate::scoring;

use super::{GatewayError, GatewayResult, PersistenceGateway};

#[derive(Debug, Default)]
pub struct InMemoryGateway {
    teams: RwLock<HashMap<TeamId, TeamState>>,
    services: RwLock<Vec<ServiceId>>,
    flags_by_key: RwLock<HashMap<(RoundNum, TeamId, ServiceId), Flag>>,
    flags_by_data: RwLock<HashMap<String, Flag>>,
    seeds: RwLock<std::collections::HashSet<String>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistenceGateway for InMemoryGateway {
    fn upsert_team(&self, team: Team, service_ids: &[ServiceId]) -> GatewayResult<()> {
        let mut teams = self
            .teams
            .write()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        teams
            .entry(team.id)
            .or_insert_with(|| TeamState::new(team, service_ids));
        Ok(())
    }

    fn upsert_service(&self, service_id: ServiceId) -> GatewayResult<()> {
        let mut services = self
            .services
            .write()
            .map_err(|_| GatewayError::Storage("services lock poisoned".into()))?;
        if !services.contains(&service_id) {
            services.push(service_id);
        }
        Ok(())
    }

    fn insert_flag(&self, flag: Flag) -> GatewayResult<()> {
        let key = (flag.round_num, flag.team_id, flag.service_id);

        let mut by_key = self
            .flags_by_key
            .write()
            .map_err(|_| GatewayError::Storage("flags lock poisoned".into()))?;
        let mut by_data = self
            .flags_by_data
            .write()
            .map_err(|_| GatewayError::Storage("flags lock poisoned".into()))?;
        let mut seeds = self
            .seeds
            .write()
            .map_err(|_| GatewayError::Storage("seeds lock poisoned".into()))?;

        if by_key.contains_key(&key) || by_data.contains_key(&flag.flag_data) || seeds.contains(&flag.seed) {
            return Err(GatewayError::AlreadyExistent);
        }

        seeds.insert(flag.seed.clone());
        by_data.insert(flag.flag_data.clone(), flag.clone());
        by_key.insert(key, flag);
        Ok(())
    }

    fn get_flag_by_data(&self, data: &str) -> GatewayResult<Flag> {
        let by_data = self
            .flags_by_data
            .read()
            .map_err(|_| GatewayError::Storage("flags lock poisoned".into()))?;
        by_data.get(data).cloned().ok_or(GatewayError::NotExistent)
    }

    fn get_flag_for_round(
        &self,
        round: RoundNum,
        team: TeamId,
        service: ServiceId,
    ) -> GatewayResult<Flag> {
        let by_key = self
            .flags_by_key
            .read()
            .map_err(|_| GatewayError::Storage("flags lock poisoned".into()))?;
        by_key
            .get(&(round, team, service))
            .cloned()
            .ok_or(GatewayError::NotExistent)
    }

    fn push_stolen_flag(&self, team_id: TeamId, record: StolenFlagRecord) -> GatewayResult<()> {
        let mut teams = self
            .teams
            .write()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        let state = teams.get_mut(&team_id).ok_or(GatewayError::NotExistent)?;
        state.stolen_flags.push(record);
        Ok(())
    }

    fn push_lost_flag(&self, team_id: TeamId, record: LostFlagRecord) -> GatewayResult<()> {
        let mut teams = self
            .teams
            .write()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        let state = teams.get_mut(&team_id).ok_or(GatewayError::NotExistent)?;
        state.lost_flags.push(record);
        Ok(())
    }

    fn push_check(&self, team_id: TeamId, record: CheckRecord) -> GatewayResult<()> {
        let mut teams = self
            .teams
            .write()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        let state = teams.get_mut(&team_id).ok_or(GatewayError::NotExistent)?;
        state.checks.push(record);
        Ok(())
    }

    fn check_stolen_flag(&self, team_id: TeamId, data: &str) -> GatewayResult<StolenFlagRecord> {
        let teams = self
            .teams
            .read()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        let state = teams.get(&team_id).ok_or(GatewayError::NotExistent)?;
        state
            .stolen_flags
            .iter()
            .find(|r| r.flag_data == data)
            .cloned()
            .ok_or(GatewayError::NotExistent)
    }

    fn update_points(
        &self,
        team_id: TeamId,
        service_id: ServiceId,
        pts_type: PointsKind,
        increment: i64,
        ts: DateTime<Utc>,
    ) -> GatewayResult<()> {
        let mut teams = self
            .teams
            .write()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        let state = teams.get_mut(&team_id).ok_or(GatewayError::NotExistent)?;

        let record = state
            .point_record_mut(service_id)
            .ok_or_else(|| GatewayError::InvalidUpdate(format!("unknown service {service_id}")))?;
        record.apply(pts_type, increment);
        state.last_pts_update = state.last_pts_update.max(ts);
        Ok(())
    }

    fn resume_points(&self) -> GatewayResult<()> {
        let by_data = self
            .flags_by_data
            .read()
            .map_err(|_| GatewayError::Storage("flags lock poisoned".into()))?;
        let mut teams = self
            .teams
            .write()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        for state in teams.values_mut() {
            scoring::recompute_team_state(state, |flag_data| {
                by_data.get(flag_data).map(|f| f.service_id)
            });
        }
        Ok(())
    }

    fn ensure_flag_index(&self) -> GatewayResult<()> {
        Ok(())
    }

    fn all_team_states(&self) -> GatewayResult<Vec<TeamState>> {
        let teams = self
            .teams
            .read()
            .map_err(|_| GatewayError::Storage("teams lock poisoned".into()))?;
        Ok(teams.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::TeamId;

    fn team(id: u32) -> Team {
        Team {
            id: TeamId::new(id),
            name: format!("team-{id}"),
            host: "127.0.0.1".to_string(),
            token: format!("token-{id}"),
        }
    }

    #[test]
    fn flag_insert_rejects_duplicate_key() {
        let gw = InMemoryGateway::new();
        let flag = Flag {
            flag_data: "flag{aaaa}".to_string(),
            seed: "seed-a".to_string(),
            round_num: RoundNum(1),
            team_id: TeamId::new(0),
            service_id: ServiceId::new(0),
        };
        gw.insert_flag(flag.clone()).unwrap();

        let mut dup = flag.clone();
        dup.seed = "seed-b".to_string();
        assert_eq!(gw.insert_flag(dup).unwrap_err(), GatewayError::AlreadyExistent);
    }

    #[test]
    fn update_points_takes_monotonic_max_of_timestamp() {
        let gw = InMemoryGateway::new();
        gw.upsert_team(team(0), &[ServiceId::new(0)]).unwrap();

        let early = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(10);
        let late = DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(20);

        gw.update_points(TeamId::new(0), ServiceId::new(0), PointsKind::Sla, 1, late)
            .unwrap();
        gw.update_points(TeamId::new(0), ServiceId::new(0), PointsKind::Sla, 1, early)
            .unwrap();

        let states = gw.all_team_states().unwrap();
        let state = states.iter().find(|s| s.team.id == TeamId::new(0)).unwrap();
        assert_eq!(state.last_pts_update, late);
        assert_eq!(state.points[0].sla_pts, 2);
    }
}
