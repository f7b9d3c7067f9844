//! The Submission Service: validates batched flag submissions, enforces
//! per-team rate limiting, and turns accepted claims into attack events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use warden_core::{RoundNum, TeamId};
use warden_events::{EventBus, GameEvent};

use crate::config::EngineConfig;
use crate::gateway::{GatewayError, PersistenceGateway};
use crate::model::{LostFlagRecord, StolenFlagRecord};
use crate::scheduler::RoundCounter;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("invalid token")]
    InvalidToken,

    #[error("too early or too late to submit a flag")]
    OutOfTimeWindow,

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("service busy")]
    ServiceBusy,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmissionSummary {
    pub num_accepted: usize,
    pub num_invalid: usize,
    pub num_already_submitted: usize,
    pub num_self_flags: usize,
    pub num_old: usize,
    pub num_discarded: usize,
}

/// Per-team token-bucket-of-one slots. Acquire is `compare_exchange(false,
/// true)`; release is a plain `store(false)`, idempotent under a double
/// release. Held behind an `Arc` so detached timer threads can outlive the
/// call that armed them.
#[derive(Debug)]
struct TeamSlots {
    rate_limit_held: AtomicBool,
    service_held: AtomicBool,
    rate_limit_seconds: AtomicU64,
}

impl TeamSlots {
    fn new(default_rate_limit_seconds: u64) -> Self {
        Self {
            rate_limit_held: AtomicBool::new(false),
            service_held: AtomicBool::new(false),
            rate_limit_seconds: AtomicU64::new(default_rate_limit_seconds.max(1)),
        }
    }
}

pub struct SubmissionService<G, B> {
    config: Arc<EngineConfig>,
    gateway: Arc<G>,
    bus: Arc<B>,
    round_counter: Arc<RoundCounter>,
    token_to_team: HashMap<String, TeamId>,
    slots: HashMap<TeamId, Arc<TeamSlots>>,
    flag_regex: Regex,
}

impl<G, B> SubmissionService<G, B>
where
    G: PersistenceGateway + 'static,
    B: EventBus<GameEvent> + 'static,
{
    pub fn new(
        config: Arc<EngineConfig>,
        gateway: Arc<G>,
        bus: Arc<B>,
        round_counter: Arc<RoundCounter>,
    ) -> Self {
        let token_to_team = config.teams.iter().map(|t| (t.token.clone(), t.id)).collect();
        let slots = config
            .teams
            .iter()
            .map(|t| (t.id, Arc::new(TeamSlots::new(config.misc.rate_limit_seconds))))
            .collect();
        let pattern = format!(
            "^{}\\{{[a-f0-9]{{{}}}\\}}$",
            regex::escape(&config.misc.flag_header),
            config.misc.flag_body_len
        );
        let flag_regex = Regex::new(&pattern).expect("flag pattern must compile");

        Self {
            config,
            gateway,
            bus,
            round_counter,
            token_to_team,
            slots,
            flag_regex,
        }
    }

    pub fn submit_flags(
        &self,
        token: &str,
        flags: Vec<String>,
    ) -> Result<SubmissionSummary, SubmissionError> {
        let team_id = *self
            .token_to_team
            .get(token)
            .ok_or(SubmissionError::InvalidToken)?;

        let now = Utc::now();
        if now < self.config.misc.start_time || now > self.config.misc.end_time {
            return Err(SubmissionError::OutOfTimeWindow);
        }

        let slots = self
            .slots
            .get(&team_id)
            .expect("token_to_team and slots are built from the same team list")
            .clone();

        if slots
            .rate_limit_held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SubmissionError::RateLimitExceeded);
        }
        schedule_rate_limit_release(slots.clone());

        if slots
            .service_held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            double_rate_limit(slots.clone(), self.config.misc.round_time_duration());
            return Err(SubmissionError::ServiceBusy);
        }
        let reliability_armed = schedule_reliability_release(slots.clone(), self.config.misc.round_time_duration());

        let summary = self.run_validation_pipeline(team_id, flags);

        if reliability_armed
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            slots.service_held.store(false, Ordering::SeqCst);
        }

        Ok(summary)
    }

    fn run_validation_pipeline(&self, team_id: TeamId, flags: Vec<String>) -> SubmissionSummary {
        let max = self.config.misc.max_flags_per_submission;
        let discarded = flags.len().saturating_sub(max);
        let retained: Vec<String> = flags.into_iter().take(max).collect();

        let summary = Mutex::new(SubmissionSummary {
            num_discarded: discarded,
            ..Default::default()
        });

        let current_round = self.round_counter.get();
        let flag_lifetime = self.config.misc.flag_lifetime;
        let gateway = self.gateway.as_ref();
        let bus = self.bus.as_ref();
        let flag_regex = &self.flag_regex;
        let summary_ref = &summary;

        thread::scope(|scope| {
            for flag_data in retained {
                scope.spawn(move || {
                    let outcome =
                        validate_one(gateway, flag_regex, team_id, &flag_data, current_round, flag_lifetime);

                    if let Outcome::Accepted { owner } = outcome {
                        let now = Utc::now();
                        if let Err(e) = gateway.push_stolen_flag(
                            team_id,
                            StolenFlagRecord {
                                flag_data: flag_data.clone(),
                                timestamp: now,
                            },
                        ) {
                            warn!(error = %e, "failed to record stolen flag");
                        }
                        if let Err(e) = gateway.push_lost_flag(
                            owner,
                            LostFlagRecord {
                                flag_data: flag_data.clone(),
                                timestamp: now,
                            },
                        ) {
                            warn!(error = %e, "failed to record lost flag");
                        }
                        if let Err(e) = bus.try_put(GameEvent::Attack {
                            attacker: team_id,
                            victim: owner,
                            service: service_of(gateway, &flag_data),
                            timestamp: now,
                        }) {
                            warn!(?e, "event queue full, dropping attack event");
                        }
                        debug!(team = team_id.value(), %flag_data, "flag accepted");
                    }

                    let mut summary = summary_ref.lock().expect("submission summary lock poisoned");
                    match outcome {
                        Outcome::Accepted { .. } => summary.num_accepted += 1,
                        Outcome::Invalid => summary.num_invalid += 1,
                        Outcome::SelfFlag => summary.num_self_flags += 1,
                        Outcome::Old => summary.num_old += 1,
                        Outcome::AlreadySubmitted => summary.num_already_submitted += 1,
                    }
                });
            }
        });

        summary.into_inner().expect("submission summary lock poisoned")
    }
}

fn service_of<G: PersistenceGateway>(gateway: &G, flag_data: &str) -> warden_core::ServiceId {
    gateway
        .get_flag_by_data(flag_data)
        .map(|f| f.service_id)
        .unwrap_or(warden_core::ServiceId::new(0))
}

fn schedule_rate_limit_release(slots: Arc<TeamSlots>) {
    let seconds = slots.rate_limit_seconds.load(Ordering::SeqCst);
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(seconds));
        slots.rate_limit_held.store(false, Ordering::SeqCst);
    });
}

/// Arms a reliability release for the service slot and returns the `armed`
/// flag so the caller can disarm it if the validation pipeline finishes
/// first.
fn schedule_reliability_release(slots: Arc<TeamSlots>, round_time: Duration) -> Arc<AtomicBool> {
    let armed = Arc::new(AtomicBool::new(true));
    let armed_clone = armed.clone();
    thread::spawn(move || {
        thread::sleep(round_time.saturating_mul(2));
        if armed_clone
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            slots.service_held.store(false, Ordering::SeqCst);
        }
    });
    armed
}

/// Doubles the team's rate-limit window after a `ServiceBusy` rejection,
/// then schedules a halving after one round so a single burst doesn't
/// permanently slow a team down.
fn double_rate_limit(slots: Arc<TeamSlots>, round_time: Duration) {
    let _ = slots
        .rate_limit_seconds
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_mul(2)));

    thread::spawn(move || {
        thread::sleep(round_time);
        let _ = slots
            .rate_limit_seconds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some((v / 2).max(1)));
    });
}

enum Outcome {
    Accepted { owner: TeamId },
    Invalid,
    SelfFlag,
    Old,
    AlreadySubmitted,
}

fn validate_one<G: PersistenceGateway>(
    gateway: &G,
    flag_regex: &Regex,
    submitter: TeamId,
    flag_data: &str,
    current_round: RoundNum,
    flag_lifetime: u64,
) -> Outcome {
    if !flag_regex.is_match(flag_data) {
        return Outcome::Invalid;
    }

    let flag = match gateway.get_flag_by_data(flag_data) {
        Ok(flag) => flag,
        Err(GatewayError::NotExistent) => return Outcome::Invalid,
        Err(e) => {
            warn!(error = %e, "flag lookup failed");
            return Outcome::Invalid;
        }
    };

    if flag.team_id == submitter {
        return Outcome::SelfFlag;
    }

    let is_old = match current_round.checked_sub(flag_lifetime) {
        Some(cutoff) => flag.round_num < cutoff,
        None => false,
    };
    if is_old {
        return Outcome::Old;
    }

    match gateway.check_stolen_flag(submitter, flag_data) {
        Ok(_) => Outcome::AlreadySubmitted,
        Err(GatewayError::NotExistent) => Outcome::Accepted { owner: flag.team_id },
        Err(e) => {
            warn!(error = %e, "stolen-flag lookup failed");
            Outcome::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineMisc, HttpConfig, ServiceConfig, StoreConfig, TeamConfig};
    use crate::gateway::in_memory::InMemoryGateway;
    use crate::model::{Flag, Team};
    use chrono::Duration as ChronoDuration;
    use warden_core::ServiceId;
    use warden_events::BoundedEventQueue;

    fn test_config() -> EngineConfig {
        let now = Utc::now();
        EngineConfig {
            teams: vec![
                TeamConfig {
                    id: TeamId::new(0),
                    name: "alpha".into(),
                    host: "10.0.0.1".into(),
                    token: "tok-alpha".into(),
                },
                TeamConfig {
                    id: TeamId::new(1),
                    name: "bravo".into(),
                    host: "10.0.0.2".into(),
                    token: "tok-bravo".into(),
                },
            ],
            services: vec![ServiceConfig {
                id: ServiceId::new(0),
                name: "web".into(),
                port: 8080,
                checker: "demo-tcp".into(),
            }],
            store: StoreConfig::default(),
            http: HttpConfig { port: 8000 },
            misc: EngineMisc {
                start_time: now - ChronoDuration::hours(1),
                end_time: now + ChronoDuration::hours(1),
                round_time: 60,
                flag_lifetime: 3,
                atk_weight: 1.0,
                def_weight: 1.0,
                sla_weight: 1.0,
                base_score: 0.0,
                flag_header: "flag".into(),
                flag_body_len: 8,
                rate_limit_seconds: 5,
                max_flags_per_submission: 10,
                scoreboard_cache_update_latency: 5,
                dispatch_frequency: 1,
            },
        }
    }

    fn build() -> SubmissionService<InMemoryGateway, BoundedEventQueue<GameEvent>> {
        let config = Arc::new(test_config());
        let gateway = Arc::new(InMemoryGateway::new());
        for team in &config.teams {
            gateway
                .upsert_team(
                    Team {
                        id: team.id,
                        name: team.name.clone(),
                        host: team.host.clone(),
                        token: team.token.clone(),
                    },
                    &config.service_ids(),
                )
                .unwrap();
        }
        gateway
            .insert_flag(Flag {
                flag_data: "flag{aaaaaaaa}".into(),
                seed: "s".repeat(32),
                round_num: RoundNum(1),
                team_id: TeamId::new(1),
                service_id: ServiceId::new(0),
            })
            .unwrap();

        let bus = Arc::new(BoundedEventQueue::new(16));
        let round_counter = Arc::new(RoundCounter::default());
        SubmissionService::new(config, gateway, bus, round_counter)
    }

    #[test]
    fn rejects_unknown_token() {
        let svc = build();
        assert_eq!(
            svc.submit_flags("nope", vec![]).unwrap_err(),
            SubmissionError::InvalidToken
        );
    }

    #[test]
    fn accepts_valid_opponent_flag() {
        let svc = build();
        let summary = svc
            .submit_flags("tok-alpha", vec!["flag{aaaaaaaa}".into()])
            .unwrap();
        assert_eq!(summary.num_accepted, 1);
    }

    #[test]
    fn rejects_self_flag() {
        let svc = build();
        let summary = svc
            .submit_flags("tok-bravo", vec!["flag{aaaaaaaa}".into()])
            .unwrap();
        assert_eq!(summary.num_self_flags, 1);
    }

    #[test]
    fn second_submission_hits_rate_limit() {
        let svc = build();
        svc.submit_flags("tok-alpha", vec![]).unwrap();
        assert_eq!(
            svc.submit_flags("tok-alpha", vec![]).unwrap_err(),
            SubmissionError::RateLimitExceeded
        );
    }

    #[test]
    fn discards_flags_beyond_the_per_submission_cap() {
        let svc = build();
        let flags: Vec<String> = (0..20).map(|i| format!("flag{{{i:08x}}}")).collect();
        let summary = svc.submit_flags("tok-alpha", flags).unwrap();
        assert_eq!(summary.num_discarded, 10);
        assert_eq!(summary.num_invalid, 10);
    }
}
