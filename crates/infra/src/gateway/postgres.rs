//! Postgres-backed gateway.
//!
//! The distillation's embedded arrays (`team.stolen_flags`, `team.checks`,
//! ...) are normalized into their own tables here — the idiomatic
//! relational shape for an append-only history keyed by `team_id`.
//!
//! `PersistenceGateway` is synchronous; this impl bridges to async sqlx
//! calls with `tokio::runtime::Handle::block_on`, the same approach the
//! project's other storage bridge uses. Callers on plain OS threads (the
//! scheduler, dispatcher, submission service) call it directly; the HTTP
//! facade wraps calls in `spawn_blocking` rather than calling from inside
//! an async task.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use warden_core::{CheckStatus, PointsKind, RoundNum, ServiceId, TeamId};

use crate::model::{CheckRecord, Flag, LostFlagRecord, StolenFlagRecord, Team, TeamState};
use crate::scoring;

use super::{GatewayError, GatewayResult, PersistenceGateway};

#[derive(Debug, Clone)]
pub struct PostgresGateway {
    pool: Arc<PgPool>,
    handle: tokio::runtime::Handle,
}

impl PostgresGateway {
    /// Must be called from within a tokio runtime — the handle is captured
    /// once here and reused for every later `block_on`, since the
    /// scheduler, dispatcher, and submission service call this gateway
    /// from plain OS threads that never enter a tokio context themselves.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            handle: tokio::runtime::Handle::current(),
        }
    }

    fn handle(&self) -> GatewayResult<tokio::runtime::Handle> {
        Ok(self.handle.clone())
    }

    #[instrument(skip(self))]
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS team (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                host TEXT NOT NULL,
                token TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS service (
                id INTEGER PRIMARY KEY,
                name TEXT,
                port INTEGER,
                checker TEXT
            );
            CREATE TABLE IF NOT EXISTS flag (
                flag_data TEXT PRIMARY KEY,
                seed TEXT NOT NULL UNIQUE,
                round_num BIGINT NOT NULL,
                team_id INTEGER NOT NULL REFERENCES team(id),
                service_id INTEGER NOT NULL,
                UNIQUE (round_num, team_id, service_id)
            );
            CREATE TABLE IF NOT EXISTS stolen_flag (
                id BIGSERIAL PRIMARY KEY,
                team_id INTEGER NOT NULL REFERENCES team(id),
                flag_data TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS lost_flag (
                id BIGSERIAL PRIMARY KEY,
                team_id INTEGER NOT NULL REFERENCES team(id),
                flag_data TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS check_record (
                id BIGSERIAL PRIMARY KEY,
                team_id INTEGER NOT NULL REFERENCES team(id),
                service_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                ts TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS point_record (
                team_id INTEGER NOT NULL REFERENCES team(id),
                service_id INTEGER NOT NULL,
                atk_pts BIGINT NOT NULL DEFAULT 0,
                def_pts BIGINT NOT NULL DEFAULT 0,
                sla_pts BIGINT NOT NULL DEFAULT 0,
                last_pts_update TIMESTAMPTZ NOT NULL DEFAULT to_timestamp(0),
                PRIMARY KEY (team_id, service_id)
            );
            "#,
        )
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    /// Run schema creation; called once at startup before any worker
    /// starts, per the configuration model's "migrated/ensured" contract.
    pub fn ensure_schema(&self) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle
            .block_on(self.migrate())
            .map_err(|e| map_sqlx_error("ensure_schema", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> GatewayError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return GatewayError::AlreadyExistent;
        }
    }
    if matches!(err, sqlx::Error::RowNotFound) {
        return GatewayError::NotExistent;
    }
    GatewayError::Storage(format!("{operation}: {err}"))
}

impl PersistenceGateway for PostgresGateway {
    fn upsert_team(&self, team: Team, _service_ids: &[ServiceId]) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle.block_on(async {
            sqlx::query(
                "INSERT INTO team (id, name, host, token) VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(team.id.value() as i32)
            .bind(&team.name)
            .bind(&team.host)
            .bind(&team.token)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("upsert_team", e))?;
            Ok(())
        })
    }

    fn upsert_service(&self, service_id: ServiceId) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle.block_on(async {
            sqlx::query("INSERT INTO service (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
                .bind(service_id.value() as i32)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("upsert_service", e))?;
            Ok(())
        })
    }

    fn insert_flag(&self, flag: Flag) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle.block_on(async {
            sqlx::query(
                "INSERT INTO flag (flag_data, seed, round_num, team_id, service_id)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&flag.flag_data)
            .bind(&flag.seed)
            .bind(flag.round_num.0 as i64)
            .bind(flag.team_id.value() as i32)
            .bind(flag.service_id.value() as i32)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_flag", e))?;
            Ok(())
        })
    }

    fn get_flag_by_data(&self, data: &str) -> GatewayResult<Flag> {
        let handle = self.handle()?;
        handle.block_on(async {
            let row = sqlx::query(
                "SELECT flag_data, seed, round_num, team_id, service_id FROM flag WHERE flag_data = $1",
            )
            .bind(data)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_flag_by_data", e))?
            .ok_or(GatewayError::NotExistent)?;
            Ok(row_to_flag(&row))
        })
    }

    fn get_flag_for_round(
        &self,
        round: RoundNum,
        team: TeamId,
        service: ServiceId,
    ) -> GatewayResult<Flag> {
        let handle = self.handle()?;
        handle.block_on(async {
            let row = sqlx::query(
                "SELECT flag_data, seed, round_num, team_id, service_id FROM flag
                 WHERE round_num = $1 AND team_id = $2 AND service_id = $3",
            )
            .bind(round.0 as i64)
            .bind(team.value() as i32)
            .bind(service.value() as i32)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_flag_for_round", e))?
            .ok_or(GatewayError::NotExistent)?;
            Ok(row_to_flag(&row))
        })
    }

    fn push_stolen_flag(&self, team_id: TeamId, record: StolenFlagRecord) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle.block_on(async {
            sqlx::query("INSERT INTO stolen_flag (team_id, flag_data, ts) VALUES ($1, $2, $3)")
                .bind(team_id.value() as i32)
                .bind(&record.flag_data)
                .bind(record.timestamp)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("push_stolen_flag", e))?;
            Ok(())
        })
    }

    fn push_lost_flag(&self, team_id: TeamId, record: LostFlagRecord) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle.block_on(async {
            sqlx::query("INSERT INTO lost_flag (team_id, flag_data, ts) VALUES ($1, $2, $3)")
                .bind(team_id.value() as i32)
                .bind(&record.flag_data)
                .bind(record.timestamp)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("push_lost_flag", e))?;
            Ok(())
        })
    }

    fn push_check(&self, team_id: TeamId, record: CheckRecord) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle.block_on(async {
            sqlx::query(
                "INSERT INTO check_record (team_id, service_id, status, ts) VALUES ($1, $2, $3, $4)",
            )
            .bind(team_id.value() as i32)
            .bind(record.service_id.value() as i32)
            .bind(record.status.as_str())
            .bind(record.timestamp)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("push_check", e))?;
            Ok(())
        })
    }

    fn check_stolen_flag(&self, team_id: TeamId, data: &str) -> GatewayResult<StolenFlagRecord> {
        let handle = self.handle()?;
        handle.block_on(async {
            let row = sqlx::query("SELECT flag_data, ts FROM stolen_flag WHERE team_id = $1 AND flag_data = $2")
                .bind(team_id.value() as i32)
                .bind(data)
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("check_stolen_flag", e))?
                .ok_or(GatewayError::NotExistent)?;
            Ok(StolenFlagRecord {
                flag_data: row.try_get("flag_data").unwrap_or_default(),
                timestamp: row.try_get("ts").unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            })
        })
    }

    fn update_points(
        &self,
        team_id: TeamId,
        service_id: ServiceId,
        pts_type: PointsKind,
        increment: i64,
        ts: DateTime<Utc>,
    ) -> GatewayResult<()> {
        let handle = self.handle()?;
        let column = match pts_type {
            PointsKind::Atk => "atk_pts",
            PointsKind::Def => "def_pts",
            PointsKind::Sla => "sla_pts",
        };
        let query = format!(
            "INSERT INTO point_record (team_id, service_id, {column}, last_pts_update)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (team_id, service_id) DO UPDATE SET
                {column} = point_record.{column} + EXCLUDED.{column},
                last_pts_update = GREATEST(point_record.last_pts_update, EXCLUDED.last_pts_update)"
        );
        handle.block_on(async {
            sqlx::query(&query)
                .bind(team_id.value() as i32)
                .bind(service_id.value() as i32)
                .bind(increment)
                .bind(ts)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("update_points", e))?;
            Ok(())
        })
    }

    fn resume_points(&self) -> GatewayResult<()> {
        let states = self.all_team_states()?;
        let handle = self.handle()?;
        handle.block_on(async {
            for mut state in states {
                let before = state.clone();
                let flags_cache: std::collections::HashMap<String, ServiceId> = {
                    let mut map = std::collections::HashMap::new();
                    for record in before.stolen_flags.iter().chain(before.lost_flags.iter()) {
                        if let Ok(row) = sqlx::query("SELECT service_id FROM flag WHERE flag_data = $1")
                            .bind(&record.flag_data)
                            .fetch_optional(&*self.pool)
                            .await
                        {
                            if let Some(row) = row {
                                let service_id: i32 = row.try_get("service_id").unwrap_or(0);
                                map.insert(record.flag_data.clone(), ServiceId::new(service_id as u32));
                            }
                        }
                    }
                    map
                };

                scoring::recompute_team_state(&mut state, |flag_data| flags_cache.get(flag_data).copied());

                for record in &state.points {
                    sqlx::query(
                        "INSERT INTO point_record (team_id, service_id, atk_pts, def_pts, sla_pts, last_pts_update)
                         VALUES ($1, $2, $3, $4, $5, $6)
                         ON CONFLICT (team_id, service_id) DO UPDATE SET
                            atk_pts = EXCLUDED.atk_pts,
                            def_pts = EXCLUDED.def_pts,
                            sla_pts = EXCLUDED.sla_pts,
                            last_pts_update = EXCLUDED.last_pts_update",
                    )
                    .bind(state.team.id.value() as i32)
                    .bind(record.service_id.value() as i32)
                    .bind(record.atk_pts)
                    .bind(record.def_pts)
                    .bind(record.sla_pts)
                    .bind(state.last_pts_update)
                    .execute(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("resume_points", e))?;
                }
            }
            Ok(())
        })
    }

    fn ensure_flag_index(&self) -> GatewayResult<()> {
        let handle = self.handle()?;
        handle.block_on(async {
            sqlx::query("CREATE UNIQUE INDEX IF NOT EXISTS flag_data_idx ON flag (flag_data)")
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_flag_index", e))?;
            Ok(())
        })
    }

    fn all_team_states(&self) -> GatewayResult<Vec<TeamState>> {
        let handle = self.handle()?;
        handle.block_on(async {
            let team_rows = sqlx::query("SELECT id, name, host, token FROM team")
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("all_team_states", e))?;

            let mut states = Vec::with_capacity(team_rows.len());
            for row in team_rows {
                let id: i32 = row.try_get("id").unwrap_or_default();
                let team = Team {
                    id: TeamId::new(id as u32),
                    name: row.try_get("name").unwrap_or_default(),
                    host: row.try_get("host").unwrap_or_default(),
                    token: row.try_get("token").unwrap_or_default(),
                };

                let point_rows = sqlx::query(
                    "SELECT service_id, atk_pts, def_pts, sla_pts, last_pts_update FROM point_record WHERE team_id = $1",
                )
                .bind(id)
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("all_team_states", e))?;

                let mut last_pts_update = DateTime::<Utc>::UNIX_EPOCH;
                let points = point_rows
                    .iter()
                    .map(|r| {
                        let ts: DateTime<Utc> = r.try_get("last_pts_update").unwrap_or(last_pts_update);
                        last_pts_update = last_pts_update.max(ts);
                        crate::model::PointRecord {
                            service_id: ServiceId::new(r.try_get::<i32, _>("service_id").unwrap_or(0) as u32),
                            atk_pts: r.try_get("atk_pts").unwrap_or(0),
                            def_pts: r.try_get("def_pts").unwrap_or(0),
                            sla_pts: r.try_get("sla_pts").unwrap_or(0),
                        }
                    })
                    .collect();

                let stolen_rows = sqlx::query("SELECT flag_data, ts FROM stolen_flag WHERE team_id = $1")
                    .bind(id)
                    .fetch_all(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("all_team_states", e))?;
                let stolen_flags = stolen_rows
                    .iter()
                    .map(|r| StolenFlagRecord {
                        flag_data: r.try_get("flag_data").unwrap_or_default(),
                        timestamp: r.try_get("ts").unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    })
                    .collect();

                let lost_rows = sqlx::query("SELECT flag_data, ts FROM lost_flag WHERE team_id = $1")
                    .bind(id)
                    .fetch_all(&*self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("all_team_states", e))?;
                let lost_flags = lost_rows
                    .iter()
                    .map(|r| LostFlagRecord {
                        flag_data: r.try_get("flag_data").unwrap_or_default(),
                        timestamp: r.try_get("ts").unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    })
                    .collect();

                let check_rows =
                    sqlx::query("SELECT service_id, status, ts FROM check_record WHERE team_id = $1")
                        .bind(id)
                        .fetch_all(&*self.pool)
                        .await
                        .map_err(|e| map_sqlx_error("all_team_states", e))?;
                let checks = check_rows
                    .iter()
                    .map(|r| CheckRecord {
                        service_id: ServiceId::new(r.try_get::<i32, _>("service_id").unwrap_or(0) as u32),
                        status: parse_status(r.try_get::<String, _>("status").unwrap_or_default()),
                        timestamp: r.try_get("ts").unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
                    })
                    .collect();

                states.push(TeamState {
                    team,
                    points,
                    stolen_flags,
                    lost_flags,
                    checks,
                    last_pts_update,
                });
            }
            Ok(states)
        })
    }
}

fn row_to_flag(row: &sqlx::postgres::PgRow) -> Flag {
    Flag {
        flag_data: row.try_get("flag_data").unwrap_or_default(),
        seed: row.try_get("seed").unwrap_or_default(),
        round_num: RoundNum(row.try_get::<i64, _>("round_num").unwrap_or(0) as u64),
        team_id: TeamId::new(row.try_get::<i32, _>("team_id").unwrap_or(0) as u32),
        service_id: ServiceId::new(row.try_get::<i32, _>("service_id").unwrap_or(0) as u32),
    }
}

fn parse_status(s: String) -> CheckStatus {
    match s.as_str() {
        "ok" => CheckStatus::Ok,
        "mumble" => CheckStatus::Mumble,
        "corrupt" => CheckStatus::Corrupt,
        "down" => CheckStatus::Down,
        _ => CheckStatus::Error,
    }
}
