//! The engine's configuration model: one JSON document, loaded once at
//! startup. Validation failures are fail-stop — no worker starts against
//! a config that didn't validate.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{ServiceId, TeamId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub id: TeamId,
    pub name: String,
    pub host: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub id: ServiceId,
    pub name: String,
    pub port: u16,
    pub checker: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub postgres_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub teams: Vec<TeamConfig>,
    pub services: Vec<ServiceConfig>,
    pub store: StoreConfig,
    pub http: HttpConfig,
    pub misc: EngineMisc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineMisc {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub round_time: u64,
    pub flag_lifetime: u64,
    pub atk_weight: f64,
    pub def_weight: f64,
    pub sla_weight: f64,
    pub base_score: f64,
    pub flag_header: String,
    pub flag_body_len: usize,
    pub rate_limit_seconds: u64,
    pub max_flags_per_submission: usize,
    pub scoreboard_cache_update_latency: u64,
    pub dispatch_frequency: u64,
}

impl EngineMisc {
    pub fn round_time_duration(&self) -> Duration {
        Duration::from_secs(self.round_time)
    }

    pub fn rate_limit_duration(&self) -> Duration {
        Duration::from_secs(self.rate_limit_seconds)
    }

    pub fn dispatch_frequency_duration(&self) -> Duration {
        Duration::from_secs(self.dispatch_frequency)
    }

    pub fn scoreboard_update_latency_duration(&self) -> Duration {
        Duration::from_secs(self.scoreboard_cache_update_latency)
    }

    pub fn max_rounds(&self) -> u64 {
        let span = (self.end_time - self.start_time).num_seconds().max(0) as u64;
        if self.round_time == 0 {
            0
        } else {
            span / self.round_time
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("end_time must be after start_time")]
    InvalidTimeWindow,

    #[error("duplicate team id {0}")]
    DuplicateTeamId(u32),

    #[error("duplicate team token")]
    DuplicateTeamToken,

    #[error("duplicate service id {0}")]
    DuplicateServiceId(u32),

    #[error("round_time must be greater than zero")]
    InvalidRoundTime,

    #[error("flag_body_len must be greater than zero")]
    InvalidFlagBodyLen,

    #[error("config error: {0}")]
    Malformed(String),
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), InitError> {
        if self.misc.end_time <= self.misc.start_time {
            return Err(InitError::InvalidTimeWindow);
        }
        if self.misc.round_time == 0 {
            return Err(InitError::InvalidRoundTime);
        }
        if self.misc.flag_body_len == 0 {
            return Err(InitError::InvalidFlagBodyLen);
        }

        let mut team_ids = HashSet::new();
        let mut tokens = HashSet::new();
        for team in &self.teams {
            if !team_ids.insert(team.id) {
                return Err(InitError::DuplicateTeamId(team.id.value()));
            }
            if !tokens.insert(&team.token) {
                return Err(InitError::DuplicateTeamToken);
            }
        }

        let mut service_ids = HashSet::new();
        for service in &self.services {
            if !service_ids.insert(service.id) {
                return Err(InitError::DuplicateServiceId(service.id.value()));
            }
        }

        Ok(())
    }

    pub fn service_ids(&self) -> Vec<ServiceId> {
        self.services.iter().map(|s| s.id).collect()
    }

    pub fn team_ids(&self) -> Vec<TeamId> {
        self.teams.iter().map(|t| t.id).collect()
    }
}
