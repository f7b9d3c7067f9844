//! Shared application state: the one gateway, the scoreboard cache, the
//! submission service, and the handles to the long-running workers.

use std::sync::Arc;

use warden_events::{BoundedEventQueue, GameEvent};
use warden_infra::config::EngineConfig;
use warden_infra::dispatcher::DispatcherHandle;
use warden_infra::scheduler::{RoundCounter, SchedulerHandle};
use warden_infra::{AnyGateway, ScoreboardCache, SubmissionService};

pub type Bus = BoundedEventQueue<GameEvent>;

pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub gateway: Arc<AnyGateway>,
    pub bus: Arc<Bus>,
    pub round_counter: Arc<RoundCounter>,
    pub scoreboard: ScoreboardCache<AnyGateway>,
    pub submission: SubmissionService<AnyGateway, Bus>,
}

/// Owns the background workers so `main` can stop them in order on
/// shutdown. Not part of `AppState` since handlers never touch it.
pub struct Workers {
    pub scheduler: Option<SchedulerHandle>,
    pub dispatcher: Option<DispatcherHandle>,
}

impl Workers {
    pub fn stop(self) {
        if let Some(scheduler) = self.scheduler {
            scheduler.stop();
        }
        if let Some(dispatcher) = self.dispatcher {
            dispatcher.stop();
        }
    }
}
