use anyhow::Result;
use clap::Parser;
use orchestrator::{router, AppState, Lifecycle, OrchestratorConfig, ScaleController};
use signal_monitors::{FanoutSink, LogSink, SignalTape};
use std::path::PathBuf;
use std::sync::Arc;
use swarm::{MomentumAgent, OrderbookImbalanceAgent, SignalFlowAgent, SwarmManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "omnitrade", version, about = "OmniTrade signal orchestrator")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "OMNITRADE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            OrchestratorConfig::load(path)?
        }
        None => {
            info!("No configuration file given, using defaults");
            OrchestratorConfig::default()
        }
    };
    let addr = config.bind_addr()?;

    // Signals go to the log and to the tape read by the swarm and /signals
    let tape = Arc::new(SignalTape::new(config.signals.tape_capacity));
    let sink = Arc::new(
        FanoutSink::new()
            .with_sink(Arc::new(LogSink))
            .with_sink(tape.clone()),
    );

    let swarm = SwarmManager::new(&config.swarm)
        .with_agent(Arc::new(OrderbookImbalanceAgent::default()))
        .with_agent(Arc::new(MomentumAgent::default()))
        .with_agent(Arc::new(SignalFlowAgent::new(tape.clone(), config.swarm.signal_window)));

    let lifecycle = Arc::new(Lifecycle::from_config(&config, sink, Arc::new(swarm))?);
    lifecycle.startup();

    let scaler = Arc::new(ScaleController::from_config(&config.scaling));
    let app = router(AppState::new(&lifecycle, tape, scaler));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("🌐 Listening on {}", addr);

    let on_signal = lifecycle.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("👋 Shutting down gracefully...");
            // ends open WebSocket sessions so the server can drain
            if let Some(report) = on_signal.shutdown().await {
                if !report.abandoned.is_empty() {
                    warn!("Abandoned monitors: {}", report.abandoned.join(", "));
                }
            }
        })
        .await?;

    lifecycle.shutdown().await;
    Ok(())
}
