//! The Scoreboard Cache: a periodically rebuilt, sanitized view of every
//! team's standing. Rebuilds are serialized through a mutex-guarded flag
//! plus a condition variable, replacing a busy spin-wait with waiters that
//! block until the in-flight rebuild completes.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use warden_core::CheckStatus;

use crate::config::EngineConfig;
use crate::gateway::PersistenceGateway;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ScoreboardError {
    #[error("a refresh is already in progress")]
    ConcurrentUpdate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ServicePoints {
    pub atk_pts: i64,
    pub def_pts: i64,
    pub sla_pts: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamView {
    pub ip_addr: String,
    pub name: String,
    pub points: HashMap<String, ServicePoints>,
    pub last_pts_update: DateTime<Utc>,
    pub overall_score: f64,
    pub service_status: HashMap<String, CheckStatus>,
}

pub struct ScoreboardCache<G> {
    gateway: Arc<G>,
    config: Arc<EngineConfig>,
    snapshot: RwLock<Arc<Vec<TeamView>>>,
    last_update: Mutex<DateTime<Utc>>,
    refreshing: Mutex<bool>,
    refreshed: Condvar,
}

impl<G> ScoreboardCache<G>
where
    G: PersistenceGateway,
{
    pub fn new(gateway: Arc<G>, config: Arc<EngineConfig>) -> Self {
        Self {
            gateway,
            config,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            last_update: Mutex::new(DateTime::<Utc>::UNIX_EPOCH),
            refreshing: Mutex::new(false),
            refreshed: Condvar::new(),
        }
    }

    /// Returns the current snapshot, rebuilding first if it's stale enough.
    /// `wait = true` blocks on a concurrent rebuild instead of failing.
    pub fn get_stats(&self, wait: bool) -> Result<Arc<Vec<TeamView>>, ScoreboardError> {
        let update_latency = self.config.misc.scoreboard_update_latency_duration();
        let now = Utc::now();

        let is_stale = {
            let last_update = self.last_update.lock().expect("last_update lock poisoned");
            chrono::Duration::from_std(update_latency)
                .map(|latency| now >= *last_update + latency)
                .unwrap_or(true)
        };

        if is_stale {
            let mut refreshing = self.refreshing.lock().expect("refresh flag lock poisoned");
            if !*refreshing {
                *refreshing = true;
                drop(refreshing);

                self.rebuild(now);

                let mut refreshing = self.refreshing.lock().expect("refresh flag lock poisoned");
                *refreshing = false;
                self.refreshed.notify_all();
            } else if wait {
                let _finished = self
                    .refreshed
                    .wait_while(refreshing, |r| *r)
                    .expect("refresh flag lock poisoned");
            } else {
                return Err(ScoreboardError::ConcurrentUpdate);
            }
        }

        Ok(self.snapshot.read().expect("snapshot lock poisoned").clone())
    }

    fn rebuild(&self, now: DateTime<Utc>) {
        let states = match self.gateway.all_team_states() {
            Ok(states) => states,
            Err(e) => {
                tracing::warn!(error = %e, "scoreboard rebuild failed to load team states");
                return;
            }
        };

        let service_names: HashMap<_, _> = self
            .config
            .services
            .iter()
            .map(|s| (s.id, s.name.clone()))
            .collect();

        let views = states
            .into_iter()
            .map(|state| {
                let mut points = HashMap::new();
                let mut overall_score = self.config.misc.base_score;

                for record in &state.points {
                    let name = service_names
                        .get(&record.service_id)
                        .cloned()
                        .unwrap_or_else(|| record.service_id.to_string());
                    points.insert(
                        name,
                        ServicePoints {
                            atk_pts: record.atk_pts,
                            def_pts: record.def_pts,
                            sla_pts: record.sla_pts,
                        },
                    );
                    overall_score += record.atk_pts as f64 * self.config.misc.atk_weight
                        + record.def_pts as f64 * self.config.misc.def_weight
                        + record.sla_pts as f64 * self.config.misc.sla_weight;
                }

                let mut sorted_checks = state.checks.clone();
                sorted_checks.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                let mut service_status = HashMap::new();
                for check in &sorted_checks {
                    let name = service_names
                        .get(&check.service_id)
                        .cloned()
                        .unwrap_or_else(|| check.service_id.to_string());
                    service_status.entry(name).or_insert(check.status);
                }

                TeamView {
                    ip_addr: state.team.host.clone(),
                    name: state.team.name.clone(),
                    points,
                    last_pts_update: state.last_pts_update,
                    overall_score,
                    service_status,
                }
            })
            .collect();

        *self.snapshot.write().expect("snapshot lock poisoned") = Arc::new(views);
        *self.last_update.lock().expect("last_update lock poisoned") = now;
        debug!("scoreboard rebuilt");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpConfig, ServiceConfig, StoreConfig, TeamConfig};
    use crate::gateway::in_memory::InMemoryGateway;
    use crate::model::{CheckRecord, Team};
    use warden_core::{ServiceId, TeamId};

    fn config() -> Arc<EngineConfig> {
        let now = Utc::now();
        Arc::new(EngineConfig {
            teams: vec![TeamConfig {
                id: TeamId::new(0),
                name: "alpha".into(),
                host: "10.0.0.1".into(),
                token: "tok".into(),
            }],
            services: vec![ServiceConfig {
                id: ServiceId::new(0),
                name: "web".into(),
                port: 8080,
                checker: "demo-tcp".into(),
            }],
            store: StoreConfig::default(),
            http: HttpConfig { port: 8000 },
            misc: crate::config::EngineMisc {
                start_time: now,
                end_time: now + chrono::Duration::hours(2),
                round_time: 60,
                flag_lifetime: 3,
                atk_weight: 2.0,
                def_weight: 1.0,
                sla_weight: 1.0,
                base_score: 10.0,
                flag_header: "flag".into(),
                flag_body_len: 8,
                rate_limit_seconds: 5,
                max_flags_per_submission: 10,
                scoreboard_cache_update_latency: 0,
                dispatch_frequency: 1,
            },
        })
    }

    #[test]
    fn rebuilds_overall_score_from_weights() {
        let config = config();
        let gateway = Arc::new(InMemoryGateway::new());
        gateway
            .upsert_team(
                Team {
                    id: TeamId::new(0),
                    name: "alpha".into(),
                    host: "10.0.0.1".into(),
                    token: "tok".into(),
                },
                &config.service_ids(),
            )
            .unwrap();
        gateway
            .update_points(
                TeamId::new(0),
                ServiceId::new(0),
                warden_core::PointsKind::Atk,
                3,
                Utc::now(),
            )
            .unwrap();

        let cache = ScoreboardCache::new(gateway, config);
        let snapshot = cache.get_stats(false).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].overall_score, 10.0 + 3.0 * 2.0);
    }

    #[test]
    fn service_status_takes_most_recent_check_per_service() {
        let config = config();
        let gateway = Arc::new(InMemoryGateway::new());
        gateway
            .upsert_team(
                Team {
                    id: TeamId::new(0),
                    name: "alpha".into(),
                    host: "10.0.0.1".into(),
                    token: "tok".into(),
                },
                &config.service_ids(),
            )
            .unwrap();
        let t1 = Utc::now();
        let t2 = t1 + chrono::Duration::seconds(5);
        gateway
            .push_check(
                TeamId::new(0),
                CheckRecord {
                    service_id: ServiceId::new(0),
                    status: CheckStatus::Down,
                    timestamp: t1,
                },
            )
            .unwrap();
        gateway
            .push_check(
                TeamId::new(0),
                CheckRecord {
                    service_id: ServiceId::new(0),
                    status: CheckStatus::Ok,
                    timestamp: t2,
                },
            )
            .unwrap();

        let cache = ScoreboardCache::new(gateway, config);
        let snapshot = cache.get_stats(false).unwrap();
        assert_eq!(snapshot[0].service_status.get("web"), Some(&CheckStatus::Ok));
    }
}
