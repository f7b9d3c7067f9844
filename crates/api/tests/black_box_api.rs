use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::json;

use warden_core::{ServiceId, TeamId};
use warden_events::{BoundedEventQueue, GameEvent};
use warden_infra::config::{EngineConfig, EngineMisc, HttpConfig, ServiceConfig, StoreConfig, TeamConfig};
use warden_infra::gateway::in_memory::InMemoryGateway;
use warden_infra::model::Flag;
use warden_infra::{init_or_resume, scheduler, AnyGateway, PersistenceGateway, ScoreboardCache, SubmissionService};

use warden_api::app::build_app;
use warden_api::state::AppState;

struct TestServer {
    base_url: String,
    gateway: Arc<AnyGateway>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(config: EngineConfig) -> Self {
        let config = Arc::new(config);
        let gateway = Arc::new(AnyGateway::InMemory(InMemoryGateway::new()));
        init_or_resume(gateway.as_ref(), &config).unwrap();

        let bus = Arc::new(BoundedEventQueue::<GameEvent>::new(64));
        let round_counter = Arc::new(scheduler::RoundCounter::default());

        let scoreboard = ScoreboardCache::new(gateway.clone(), config.clone());
        let submission = SubmissionService::new(config.clone(), gateway.clone(), bus.clone(), round_counter.clone());

        let state = Arc::new(AppState {
            config,
            gateway: gateway.clone(),
            bus,
            round_counter,
            scoreboard,
            submission,
        });

        let app = build_app(state, "static");
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{addr}");

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, gateway, handle }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

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
        http: HttpConfig { port: 0 },
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
            scoreboard_cache_update_latency: 0,
            dispatch_frequency: 1,
        },
    }
}

#[tokio::test]
async fn get_stats_returns_teams_round_and_flag_lifetime() {
    let server = TestServer::spawn(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/api/getStats", server.base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["teams"].is_array());
    assert_eq!(body["flagLifetime"], 3);
}

#[tokio::test]
async fn flag_submit_rejects_malformed_json() {
    let server = TestServer::spawn(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/flagSubmit", server.base_url))
        .body("not json")
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Input data is not json");
}

#[tokio::test]
async fn flag_submit_rejects_missing_fields() {
    let server = TestServer::spawn(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/flagSubmit", server.base_url))
        .json(&json!({"token": "tok-alpha"}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "token or flags fields missing");
}

#[tokio::test]
async fn flag_submit_rejects_unknown_token() {
    let server = TestServer::spawn(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/flagSubmit", server.base_url))
        .json(&json!({"token": "nope", "flags": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Invalid token");
}

#[tokio::test]
async fn flag_submit_accepts_a_valid_opponent_flag() {
    let server = TestServer::spawn(test_config()).await;
    let client = reqwest::Client::new();

    server
        .gateway
        .insert_flag(Flag {
            flag_data: "flag{deadbeef}".into(),
            seed: "s".repeat(32),
            round_num: warden_core::RoundNum(1),
            team_id: TeamId::new(1),
            service_id: ServiceId::new(0),
        })
        .unwrap();

    let resp = client
        .post(format!("{}/api/flagSubmit", server.base_url))
        .json(&json!({"token": "tok-alpha", "flags": ["flag{deadbeef}"]}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["num_accepted"], 1);
    assert_eq!(body["num_invalid"], 0);
}

#[tokio::test]
async fn flag_submit_rejects_an_unplanted_flag_as_invalid() {
    let server = TestServer::spawn(test_config()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/flagSubmit", server.base_url))
        .json(&json!({"token": "tok-alpha", "flags": ["flag{deadbeef}"]}))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["num_invalid"], 1);
    assert_eq!(body["num_accepted"], 0);
}
