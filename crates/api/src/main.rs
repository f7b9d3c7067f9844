use std::sync::Arc;

use warden_checkers::CheckerRegistry;
use warden_events::BoundedEventQueue;
use warden_infra::gateway::in_memory::InMemoryGateway;
use warden_infra::gateway::postgres::PostgresGateway;
use warden_infra::{dispatcher, init_or_resume, scheduler, AnyGateway, ScoreboardCache, SubmissionService};

use warden_api::app::build_app;
use warden_api::state::{AppState, Workers};
use warden_api::config_loader;

const EVENT_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() {
    warden_observability::init();

    let config = match config_loader::load() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "configuration failed to load, refusing to start");
            std::process::exit(1);
        }
    };

    let gateway = Arc::new(build_gateway(&config).await);
    if let Err(e) = init_or_resume(gateway.as_ref(), &config) {
        tracing::error!(error = %e, "startup reconciliation failed, refusing to start");
        std::process::exit(1);
    }

    let bus = Arc::new(BoundedEventQueue::new(EVENT_QUEUE_CAPACITY));
    let round_counter = Arc::new(scheduler::RoundCounter::default());
    let registry = Arc::new(CheckerRegistry::new());

    let scheduler_handle = match scheduler::start(
        config.clone(),
        gateway.clone(),
        registry,
        bus.clone(),
        round_counter.clone(),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(error = ?e, "round scheduler failed to start, refusing to start");
            std::process::exit(1);
        }
    };
    let dispatcher_handle = Some(dispatcher::start(
        gateway.clone(),
        bus.clone(),
        config.misc.dispatch_frequency_duration(),
    ));

    let scoreboard = ScoreboardCache::new(gateway.clone(), config.clone());
    let submission = SubmissionService::new(config.clone(), gateway.clone(), bus.clone(), round_counter.clone());

    let state = Arc::new(AppState {
        config: config.clone(),
        gateway,
        bus,
        round_counter,
        scoreboard,
        submission,
    });

    let static_dir = std::env::var("STATIC_DIR").unwrap_or_else(|_| "static".to_string());
    let app = build_app(state, &static_dir);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http.port))
        .await
        .unwrap_or_else(|e| panic!("failed to bind 0.0.0.0:{}: {e}", config.http.port));
    tracing::info!(port = config.http.port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    Workers {
        scheduler: scheduler_handle,
        dispatcher: dispatcher_handle,
    }
    .stop();
}

async fn build_gateway(config: &warden_infra::EngineConfig) -> AnyGateway {
    match &config.store.postgres_url {
        Some(url) => {
            let pool = sqlx::PgPool::connect(url)
                .await
                .unwrap_or_else(|e| panic!("failed to connect to {url}: {e}"));
            let gateway = PostgresGateway::new(pool);
            gateway.ensure_schema().expect("failed to ensure postgres schema");
            AnyGateway::Postgres(gateway)
        }
        None => AnyGateway::InMemory(InMemoryGateway::new()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
