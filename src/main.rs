//! decision-intel-engine binary: wires every component from `Config` and
//! serves the control-endpoint API (§6) alongside the adaptive scheduler's
//! background loops (§4.1). Structured the way the teacher's `main()` does:
//! `load_env` → `init_tracing` → build shared collaborators → spawn
//! background loops → assemble the Axum router → serve.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use decision_intel_engine::api::{self, AppState};
use decision_intel_engine::classifiers::TradingSessionClassifier;
use decision_intel_engine::config::Config;
use decision_intel_engine::pipeline::Orchestrator;
use decision_intel_engine::replay::ReplayGate;
use decision_intel_engine::scheduler::AdaptiveScheduler;
use decision_intel_engine::store::{Db, FeedbackStore, SnapshotBus};
use decision_intel_engine::transport::{
    build_http_client, HttpAgentDispatcher, HttpMarketDataProvider, HttpNotifier, HttpStrategistClient, MarketDataCache,
};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Arc::new(Config::from_env().context("invalid configuration")?);
    info!(symbols = ?config.watched_symbols, port = config.port, "decision-intel-engine starting");

    let http_client = build_http_client(&config).context("failed to build HTTP client")?;

    let db = Db::open(&config.database_path).context("failed to open decision store")?;
    let bus = SnapshotBus::new(config.snapshot_broadcast_buffer);
    let store = FeedbackStore::new(db, bus, config.clone());

    let cache = MarketDataCache::new();

    let zone: chrono_tz::Tz = config.time_zone.parse().context("invalid time zone")?;
    let session_classifier = TradingSessionClassifier::new(zone);

    let market_data = Arc::new(HttpMarketDataProvider::new(http_client.clone(), &config));
    let agent_dispatcher = Arc::new(HttpAgentDispatcher::new(http_client.clone(), &config));
    let strategist = Arc::new(HttpStrategistClient::new(
        http_client.clone(),
        config.strategist_base_url.clone(),
        config.strategist_api_key.clone(),
    ));
    let notifier = Arc::new(HttpNotifier::new(http_client.clone(), config.notifier_base_url.clone(), config.notification_timeout));

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        store.clone(),
        cache,
        session_classifier,
        market_data,
        agent_dispatcher,
        strategist,
        notifier,
    ));

    let replay_gate = ReplayGate::new();

    let scheduler = Arc::new(AdaptiveScheduler::new(
        config.clone(),
        store.clone(),
        orchestrator.clone(),
        session_classifier,
        replay_gate.clone(),
    ));
    scheduler.start(config.watched_symbols.clone()).await;
    info!("adaptive scheduler running for {} symbols", config.watched_symbols.len());

    let app_state = AppState { orchestrator, store, replay_gate, config: config.clone() };
    let app = api::router(app_state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await.context("failed to bind control-endpoint listener")?;
    info!(%addr, "control-endpoint API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.stop().await;
    info!("decision-intel-engine shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "decision_intel_engine=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    dotenv::dotenv().ok();
}
