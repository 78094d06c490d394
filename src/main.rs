use anyhow::{Context, Result};
use railwatch::app::supervise;
use railwatch::config::env::ENV_CONFIG_PATH;
use railwatch::config::{load_config, RailwatchConfig};
use railwatch::dashboard::{run_chart_poller, run_stats_poller, ChartView, DashboardClient, StatsView};
use railwatch::live::{ConnectionManager, ConnectionStatus, WsConnector};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "railwatch=info".into()),
        )
        .init();

    info!("Railwatch starting...");

    let mut config = match std::env::var(ENV_CONFIG_PATH) {
        Ok(path) => load_config(&path).with_context(|| format!("Failed to load config from {}", path))?,
        Err(_) => {
            info!("No {} set, using default configuration", ENV_CONFIG_PATH);
            RailwatchConfig::default()
        }
    };
    config.apply_env_overrides();
    config.validate()?;

    info!(
        origin = %config.live.origin,
        base_delay_ms = config.live.base_delay_ms,
        max_attempts = config.live.max_attempts,
        "Configuration loaded"
    );

    let manager = ConnectionManager::new(config.live.clone(), Arc::new(WsConnector::new()));
    let handle = manager.handle();

    handle.on_status_change(|change| match &change.status {
        ConnectionStatus::Connected => info!(at = %change.at, "Live updates connected"),
        ConnectionStatus::Disconnected => warn!(at = %change.at, "Live updates disconnected"),
        ConnectionStatus::Failed(reason) => error!(at = %change.at, reason = %reason, "Live updates failed"),
    });

    let stats_view = StatsView::attach(&handle);
    let chart_view = ChartView::attach(&handle);

    let mut pollers = Vec::new();
    if config.polling.enabled {
        let client = Arc::new(DashboardClient::new(config.live.origin.clone()));
        info!(base_url = %client.base_url(), "Starting polling fallback");

        pollers.push(tokio::spawn(run_stats_poller(
            Arc::clone(&client),
            Arc::clone(&stats_view),
            config.polling.stats_interval_seconds,
        )));
        pollers.push(tokio::spawn(run_chart_poller(
            client,
            Arc::clone(&chart_view),
            config.polling.chart_interval_seconds,
            config.polling.time_range,
        )));
    }

    let manager_task = tokio::spawn(manager.run());

    supervise(&handle, manager_task, pollers, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for ctrl-c");
        }
    })
    .await;

    if let Some(stats) = stats_view.stats() {
        info!(
            active_apis = stats.active_apis,
            total_requests = stats.total_requests,
            error_count = stats.error_count,
            activities = stats_view.activities().len(),
            alerts = stats_view.alerts().len(),
            "Final dashboard snapshot"
        );
    }

    Ok(())
}
