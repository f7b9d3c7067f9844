//! Infrastructure layer: persistence, configuration, and the long-running
//! workers that drive a round of the game.

pub mod config;
pub mod dispatcher;
pub mod flaggen;
pub mod gateway;
pub mod model;
pub mod scheduler;
pub mod scoreboard;
pub mod scoring;
pub mod submission;

pub use config::{EngineConfig, InitError};
pub use gateway::{AnyGateway, GatewayError, GatewayResult, PersistenceGateway};
pub use scheduler::RoundCounter;
pub use scoreboard::{ScoreboardCache, ScoreboardError, TeamView};
pub use submission::{SubmissionError, SubmissionService, SubmissionSummary};

/// Upserts configured teams and services, then recomputes every team's
/// points from its append-only history. Must run to completion before any
/// worker (scheduler, dispatcher) starts ticking.
pub fn init_or_resume<G: PersistenceGateway>(gateway: &G, config: &EngineConfig) -> GatewayResult<()> {
    gateway.ensure_flag_index()?;

    for service in &config.services {
        gateway.upsert_service(service.id)?;
    }

    let service_ids = config.service_ids();
    for team in &config.teams {
        gateway.upsert_team(
            model::Team {
                id: team.id,
                name: team.name.clone(),
                host: team.host.clone(),
                token: team.token.clone(),
            },
            &service_ids,
        )?;
    }

    gateway.resume_points()
}
