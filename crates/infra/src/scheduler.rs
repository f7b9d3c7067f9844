//! The Round Scheduler: one dedicated worker thread that ticks every
//! `round_time` seconds, planting a fresh flag per (team, service) and
//! firing probe threads for the current round plus every still-alive past
//! round within `flag_lifetime`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use warden_core::{CheckStatus, RoundNum, ServiceId, TeamId};
use warden_checkers::{call_guarded, Checker, CheckerRegistry, CheckerTarget};
use warden_events::{EventBus, GameEvent};

use crate::config::EngineConfig;
use crate::flaggen;
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::model::{CheckRecord, Flag};

/// One checker instance per (team, service) pair, built on first use and
/// reused for the rest of the game so stateful checkers (like the demo TCP
/// checker, which remembers planted flags between the put and the get)
/// keep their state across rounds and past-round re-probes. The outer
/// mutex only ever guards the map structure; each checker gets its own
/// lock so probes against different services still run concurrently.
#[derive(Default)]
struct CheckerCache {
    checkers: Mutex<HashMap<(TeamId, ServiceId), Arc<Mutex<Box<dyn Checker>>>>>,
}

impl CheckerCache {
    fn get_or_build(
        &self,
        registry: &CheckerRegistry,
        team_id: TeamId,
        service: &crate::config::ServiceConfig,
        target: &CheckerTarget,
    ) -> Option<Arc<Mutex<Box<dyn Checker>>>> {
        let mut checkers = self.checkers.lock().unwrap_or_else(|e| e.into_inner());
        let key = (team_id, service.id);
        if let Some(existing) = checkers.get(&key) {
            return Some(existing.clone());
        }
        let checker = registry.build(&service.checker, target)?;
        let entry = Arc::new(Mutex::new(checker));
        checkers.insert(key, entry.clone());
        Some(entry)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerInitError {
    #[error("game has already ended")]
    AlreadyEnded,
}

/// Shared, atomically-updated round counter. The Submission Service reads
/// this for the current round; best-effort freshness is acceptable (see
/// the concurrency model).
#[derive(Debug, Default)]
pub struct RoundCounter(AtomicU64);

impl RoundCounter {
    pub fn get(&self) -> RoundNum {
        RoundNum(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, round: RoundNum) {
        self.0.store(round.0, Ordering::Relaxed);
    }
}

pub struct SchedulerHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
    round_time: Duration,
}

impl SchedulerHandle {
    /// Signal the scheduler to stop and wait up to one round for in-flight
    /// work to drain.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    pub fn round_time(&self) -> Duration {
        self.round_time
    }
}

pub fn start<G, B>(
    config: Arc<EngineConfig>,
    gateway: Arc<G>,
    registry: Arc<CheckerRegistry>,
    bus: Arc<B>,
    round_counter: Arc<RoundCounter>,
) -> Result<SchedulerHandle, SchedulerInitError>
where
    G: PersistenceGateway + 'static,
    B: EventBus<GameEvent> + 'static,
{
    let now = Utc::now();
    if now >= config.misc.end_time {
        return Err(SchedulerInitError::AlreadyEnded);
    }

    let round_time = config.misc.round_time_duration();
    let max_rounds = config.misc.max_rounds();

    let mut current_round = RoundNum::ZERO;
    let mut initial_wait = if now >= config.misc.start_time {
        let elapsed = (now - config.misc.start_time).num_seconds().max(0) as u64;
        current_round = RoundNum(elapsed / config.misc.round_time.max(1));
        info!(round = current_round.0, "resuming mid-game");
        let next_boundary_secs = (current_round.0 + 1) * config.misc.round_time;
        let wait_secs = next_boundary_secs.saturating_sub(elapsed);
        Duration::from_secs(wait_secs)
    } else {
        (config.misc.start_time - now).to_std().unwrap_or(Duration::ZERO)
    };
    if initial_wait.is_zero() {
        initial_wait = Duration::from_millis(1);
    }

    round_counter.set(current_round);

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    let checker_cache = Arc::new(CheckerCache::default());

    let join = thread::Builder::new()
        .name("round-scheduler".to_string())
        .spawn(move || {
            tick_loop(
                config,
                gateway,
                registry,
                checker_cache,
                bus,
                round_counter,
                stop_clone,
                current_round,
                max_rounds,
                round_time,
                initial_wait,
            );
        })
        .expect("failed to spawn round scheduler thread");

    Ok(SchedulerHandle {
        stop,
        join: Some(join),
        round_time,
    })
}

#[allow(clippy::too_many_arguments)]
fn tick_loop<G, B>(
    config: Arc<EngineConfig>,
    gateway: Arc<G>,
    registry: Arc<CheckerRegistry>,
    checker_cache: Arc<CheckerCache>,
    bus: Arc<B>,
    round_counter: Arc<RoundCounter>,
    stop: Arc<AtomicBool>,
    mut round_num: RoundNum,
    max_rounds: u64,
    round_time: Duration,
    initial_wait: Duration,
) where
    G: PersistenceGateway + 'static,
    B: EventBus<GameEvent> + 'static,
{
    thread::sleep(initial_wait);

    while !stop.load(Ordering::SeqCst) && round_num.0 < max_rounds {
        round_num = RoundNum(round_num.0 + 1);
        round_counter.set(round_num);
        info!(round = round_num.0, "round tick");

        for team in &config.teams {
            for service in &config.services {
                plant_flag(&config, &gateway, team.id, service.id, round_num);

                spawn_probe(
                    &gateway,
                    &registry,
                    &checker_cache,
                    &bus,
                    team.id,
                    team.host.clone(),
                    service.clone(),
                    round_num,
                    round_time,
                    false,
                );
            }
        }

        for back in 1..=config.misc.flag_lifetime {
            let Some(past_round) = round_num.checked_sub(back) else {
                continue;
            };
            if past_round == RoundNum::ZERO {
                continue;
            }

            for team in &config.teams {
                for service in &config.services {
                    match gateway.get_flag_for_round(past_round, team.id, service.id) {
                        Ok(_) => {
                            spawn_probe(
                                &gateway,
                                &registry,
                                &checker_cache,
                                &bus,
                                team.id,
                                team.host.clone(),
                                service.clone(),
                                past_round,
                                round_time,
                                true,
                            );
                        }
                        Err(GatewayError::NotExistent) => {
                            warn!(
                                round = past_round.0,
                                team = team.id.value(),
                                service = service.id.value(),
                                "past-round flag missing, skipping re-probe"
                            );
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to look up past-round flag");
                        }
                    }
                }
            }
        }

        thread::sleep(round_time);
    }

    info!("round scheduler stopped");
}

fn plant_flag<G: PersistenceGateway>(
    config: &EngineConfig,
    gateway: &Arc<G>,
    team_id: TeamId,
    service_id: ServiceId,
    round_num: RoundNum,
) {
    loop {
        let flag_data = flaggen::generate_flag(&config.misc.flag_header, config.misc.flag_body_len);
        let seed = flaggen::generate_seed();

        let flag = Flag {
            flag_data,
            seed,
            round_num,
            team_id,
            service_id,
        };

        match gateway.insert_flag(flag) {
            Ok(()) => break,
            Err(GatewayError::AlreadyExistent) => continue,
            Err(e) => {
                warn!(error = %e, "failed to insert flag");
                break;
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_probe<G, B>(
    gateway: &Arc<G>,
    registry: &Arc<CheckerRegistry>,
    checker_cache: &Arc<CheckerCache>,
    bus: &Arc<B>,
    team_id: TeamId,
    host: String,
    service: crate::config::ServiceConfig,
    round_num: RoundNum,
    round_time: Duration,
    is_previous: bool,
) where
    G: PersistenceGateway + 'static,
    B: EventBus<GameEvent> + 'static,
{
    let gateway = gateway.clone();
    let registry = registry.clone();
    let checker_cache = checker_cache.clone();
    let bus = bus.clone();

    thread::spawn(move || {
        let flag = match gateway.get_flag_for_round(round_num, team_id, service.id) {
            Ok(flag) => flag,
            Err(e) => {
                warn!(error = %e, "probe could not load its own flag");
                return;
            }
        };

        let target = CheckerTarget {
            team: team_id,
            service: service.id,
            host,
            port: service.port,
        };

        let Some(checker) = checker_cache.get_or_build(&registry, team_id, &service, &target) else {
            warn!(checker = %service.checker, "unknown checker, recording as error");
            record(&gateway, &bus, team_id, service.id, CheckStatus::Error);
            return;
        };
        let mut checker = checker.lock().unwrap_or_else(|e| e.into_inner());

        let jitter = jittered_sleep(round_time);

        let status = call_guarded(|| checker.check());
        if status != CheckStatus::Ok {
            record(&gateway, &bus, team_id, service.id, status);
            return;
        }

        thread::sleep(jitter);

        if is_previous {
            let status = call_guarded(|| checker.get(&flag.flag_data, &flag.seed));
            record(&gateway, &bus, team_id, service.id, status);
            return;
        }

        let status = call_guarded(|| checker.put(&flag.flag_data, &flag.seed));
        if status != CheckStatus::Ok {
            record(&gateway, &bus, team_id, service.id, status);
            return;
        }

        thread::sleep(jittered_sleep(round_time));

        let status = call_guarded(|| checker.get(&flag.flag_data, &flag.seed));
        record(&gateway, &bus, team_id, service.id, status);
    });
}

fn jittered_sleep(round_time: Duration) -> Duration {
    let max_millis = (round_time.as_millis() / 3).max(1) as u64;
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_millis))
}

fn record<G, B>(
    gateway: &Arc<G>,
    bus: &Arc<B>,
    team_id: TeamId,
    service_id: ServiceId,
    status: CheckStatus,
) where
    G: PersistenceGateway,
    B: EventBus<GameEvent>,
{
    let timestamp = Utc::now();

    if let Err(e) = gateway.push_check(
        team_id,
        CheckRecord {
            service_id,
            status,
            timestamp,
        },
    ) {
        warn!(error = %e, "failed to record check");
    }
    debug!(team = team_id.value(), service = service_id.value(), %status, "check recorded");

    if let Err(e) = bus.try_put(GameEvent::Check {
        team: team_id,
        service: service_id,
        status,
        timestamp,
    }) {
        warn!(?e, "event queue full, dropping check event");
    }
}
