//! Headless Topraklama dashboard
//!
//! Polls the monitoring API (or the built-in simulator), keeps the dashboard
//! state current and logs a periodic fleet summary until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use topraklama_core::client::{HttpTelemetryClient, TelemetrySource};
use topraklama_core::config::{ApiConfig, MonitorConfig};
use topraklama_core::dashboard::Dashboard;
use topraklama_core::demo::DemoSource;
use topraklama_core::model::TransformerId;
use topraklama_core::risk::RiskTier;
use topraklama_core::selection::{MapSync, ViewSink};

#[derive(Parser, Debug)]
#[command(name = "topraklama-monitor")]
#[command(
    author,
    version,
    about = "Real-time grounding monitor for transformer fleets",
    long_about = None
)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API base URL, overrides the configuration file
    #[arg(long)]
    base_url: Option<String>,

    /// Use the built-in fleet simulator instead of the API
    #[arg(long)]
    demo: bool,

    /// Seed for the simulator
    #[arg(long, requires = "demo")]
    seed: Option<u64>,

    /// Use the legacy endpoint layout (/realtime-data, /statistics, ...)
    #[arg(long)]
    legacy_endpoints: bool,

    /// Transformer to select once the first fleet snapshot arrives
    #[arg(long)]
    select: Option<u32>,

    /// Seconds between summary log lines
    #[arg(long, default_value_t = 15)]
    report_interval_secs: u64,
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    if args.legacy_endpoints {
        let base_url = config.api.base_url.clone();
        config.api = ApiConfig {
            user_agent: config.api.user_agent.clone(),
            request_timeout_ms: config.api.request_timeout_ms,
            ..ApiConfig::legacy(base_url)
        };
    }
    if let Some(base_url) = &args.base_url {
        config.api.base_url = base_url.clone();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if args.demo {
        let source = match args.seed {
            Some(seed) => DemoSource::with_seed(seed),
            None => DemoSource::new(),
        };
        tracing::info!("running against the fleet simulator");
        run(Arc::new(source), config, &args).await
    } else {
        tracing::info!(base_url = %config.api.base_url, "running against the monitoring API");
        let client = HttpTelemetryClient::new(config.api.clone())
            .context("failed to build HTTP client")?;
        run(Arc::new(client), config, &args).await
    }
}

async fn run<S: TelemetrySource>(
    source: Arc<S>,
    config: MonitorConfig,
    args: &Args,
) -> Result<()> {
    let health = source.check_health().await.with_context(|| {
        format!("monitoring API at {} is not reachable", config.api.base_url)
    })?;
    tracing::info!(status = %health.status, message = ?health.message, "health check passed");

    let map = Arc::new(MapSync::new(config.map.clone()));
    let dashboard = Dashboard::new(source, config, Arc::clone(&map) as Arc<dyn ViewSink>);
    dashboard.start();

    let mut pending_selection = args.select.map(TransformerId);
    let report_every = Duration::from_secs(args.report_interval_secs.max(1));
    let mut report = tokio::time::interval(report_every);
    let mut fleet_updates = dashboard.aggregator().subscribe_fleet();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("interrupt received, shutting down");
                break;
            }
            changed = fleet_updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(id) = pending_selection {
                    match dashboard.select(id) {
                        Ok(()) => pending_selection = None,
                        Err(e) => tracing::debug!(error = %e, "selection not available yet"),
                    }
                }
            }
            _ = report.tick() => log_summary(&dashboard, &map),
        }
    }

    dashboard.shutdown();
    Ok(())
}

fn log_summary<S: TelemetrySource>(dashboard: &Dashboard<S>, map: &MapSync) {
    let view = dashboard.view();
    tracing::info!(
        transformers = view.fleet.len(),
        faulty = view.tiers.get(RiskTier::Faulty),
        high = view.tiers.get(RiskTier::High),
        medium = view.tiers.get(RiskTier::Medium),
        low = view.tiers.get(RiskTier::Low),
        unknown = view.tiers.get(RiskTier::Unknown),
        alerts = view.alerts.len(),
        "fleet summary"
    );

    if let Some(stats) = &view.statistics {
        tracing::info!(
            isolated = stats.isolated_count,
            average_risk = ?stats.average_risk,
            estimated_savings = ?stats.estimated_savings,
            "statistics"
        );
    }

    if let Some(id) = view.selection.selected_id() {
        let score = view
            .detail
            .as_ref()
            .and_then(|d| d.detail.as_ref())
            .and_then(|r| r.risk_score);
        tracing::info!(
            transformer = %id,
            state = ?view.selection,
            risk = ?score,
            zoom = map.viewport().zoom,
            "selection"
        );
    }

    for (name, stats) in dashboard.poller_stats() {
        if stats.failures > 0 {
            tracing::warn!(
                poller = name,
                failures = stats.failures,
                successes = stats.successes,
                "poller failures"
            );
        }
    }
}
