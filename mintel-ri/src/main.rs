//! mintel-ri - Marketing-intelligence report service
//!
//! Accepts onboarding submissions, runs the data-collection and synthesis pipeline in
//! a background worker pool, and serves the finished report.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mintel_common::events::EventBus;
use mintel_ri::api::StaticTokenVerifier;
use mintel_ri::config::ServiceConfig;
use mintel_ri::services::{recover_runs, JobQueue, WorkerPool, WorkflowOrchestrator};
use mintel_ri::AppState;

#[derive(Parser, Debug)]
#[command(name = "mintel-ri", version, about = "Marketing-intelligence report service")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// SQLite database file (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    info!("Starting mintel-ri (Marketing Intelligence) service");
    info!(
        "mintel-ri v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config_path = mintel_common::config::resolve_config_path(
        args.config.as_deref(),
        "MINTEL_CONFIG",
        "mintel-ri.toml",
    );
    let mut config = ServiceConfig::load(config_path.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(database) = args.database {
        config.server.database_path = Some(database);
    }

    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db_pool = mintel_ri::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let orchestrator = Arc::new(WorkflowOrchestrator::new(db_pool.clone(), event_bus.clone(), &config)?);
    info!(
        run_timeout = ?config.pipeline.run_timeout(),
        parallel_stages = config.pipeline.parallel_stages,
        "Workflow orchestrator initialized"
    );

    let shutdown = CancellationToken::new();
    let (queue, receiver) = JobQueue::new(config.pipeline.queue_capacity);
    let workers = WorkerPool::start(orchestrator, receiver, config.pipeline.workers, shutdown.clone());

    recover_runs(&db_pool, &queue).await?;

    let state = AppState::new(
        db_pool,
        event_bus,
        queue,
        Arc::new(StaticTokenVerifier::from_config(&config.auth)),
        config.abuse.clone(),
    );
    let app = mintel_ri::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!("Listening on http://{}", config.server.bind);
    info!("Health check: http://{}/health", config.server.bind);

    let signal_token = shutdown.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested, draining workers");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    workers.join().await;
    info!("mintel-ri stopped");

    Ok(())
}
