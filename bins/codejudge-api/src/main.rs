mod handlers;
mod metrics;
mod routes;

use anyhow::{Context, Result};
use axum::Router;
use codejudge_common::config::ServiceConfig;
use codejudge_engine::store::RedisStore;
use codejudge_engine::{
    Collaborators, JudgeService, RunnerLimits, ToolchainRegistry, ToolchainRunner, WorkspaceManager,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct AppState {
    pub service: JudgeService,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("CodeJudge API booting...");

    let config = ServiceConfig::from_env().context("Invalid configuration")?;

    let registry = ToolchainRegistry::load_or_builtin(&config.languages_path)
        .context("Failed to load toolchains")?;
    info!(languages = ?registry.languages(), "Toolchains ready");

    let workspace = WorkspaceManager::new(&config.workdir);
    workspace
        .init()
        .with_context(|| format!("Failed to prepare workdir {}", config.workdir.display()))?;
    info!(workdir = %config.workdir.display(), "Workspace ready");

    let store = RedisStore::connect(&config.redis_url)
        .await
        .context("Failed to connect to Redis")?;
    info!("Connected to Redis: {}", config.redis_url);

    let store = Arc::new(store);
    let collaborators = Collaborators {
        problems: store.clone(),
        ledger: store.clone(),
        identity: store,
    };

    let runner = ToolchainRunner::new(Arc::new(registry), workspace, RunnerLimits::from(&config));
    let service = JudgeService::new(
        runner,
        config.judge_mode,
        collaborators,
        config.max_concurrent_jobs,
    );

    info!(
        timeout_ms = config.timeout_ms,
        compile_timeout_ms = config.compile_timeout_ms,
        max_jobs = config.max_concurrent_jobs,
        judge_mode = ?config.judge_mode,
        "Judge configured"
    );

    let state = Arc::new(AppState { service });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    info!("HTTP server listening on {}", config.bind_addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
