use crate::dashboard::views::{ChartView, StatsView};
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// REST client for the dashboard polling endpoints.
///
/// This is the redundant data path next to the live connection; it does not
/// depend on the connection state.
#[derive(Clone)]
pub struct DashboardClient {
    base_url: String,
    http: reqwest::Client,
}

impl DashboardClient {
    /// `base_url` is the server origin, e.g. "http://localhost:8080"
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// GET /api/dashboard/stats
    pub async fn fetch_stats(&self) -> Result<Value> {
        self.get_json("/api/dashboard/stats", None).await
    }

    /// GET /api/dashboard/activities
    pub async fn fetch_activities(&self) -> Result<Vec<Value>> {
        self.get_json("/api/dashboard/activities", None).await
    }

    /// GET /api/dashboard/alerts
    pub async fn fetch_alerts(&self) -> Result<Vec<Value>> {
        self.get_json("/api/dashboard/alerts", None).await
    }

    /// GET /api/dashboard/chart-data[?timeRange=N]
    pub async fn fetch_chart_data(&self, time_range: Option<u32>) -> Result<Value> {
        self.get_json("/api/dashboard/chart-data", time_range).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, time_range: Option<u32>) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.get(&url).header("Accept", "application/json");
        if let Some(range) = time_range {
            request = request.query(&[("timeRange", range)]);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            bail!("{} returned error status {}: {}", path, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }
}

/// Refresh stats, activities and alerts into `view` on a fixed interval.
///
/// Skips a cycle while the view is paused. Errors are logged and the loop
/// keeps going.
pub async fn run_stats_poller(client: Arc<DashboardClient>, view: Arc<StatsView>, interval_seconds: u64) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        if view.is_paused() {
            debug!("Stats view paused, skipping poll");
            continue;
        }

        poll_stats_once(&client, &view).await;
    }
}

/// One stats refresh cycle. Each endpoint is applied independently.
pub async fn poll_stats_once(client: &DashboardClient, view: &StatsView) {
    let (stats, activities, alerts) = tokio::join!(
        client.fetch_stats(),
        client.fetch_activities(),
        client.fetch_alerts()
    );

    match stats {
        Ok(stats) => view.apply_stats(&stats),
        Err(e) => warn!(error = %format!("{:#}", e), "Error fetching dashboard stats"),
    }
    match activities {
        Ok(activities) => view.merge_activities(activities),
        Err(e) => warn!(error = %format!("{:#}", e), "Error fetching activities"),
    }
    match alerts {
        Ok(alerts) => view.replace_alerts(alerts),
        Err(e) => warn!(error = %format!("{:#}", e), "Error fetching alerts"),
    }
}

/// Refresh chart data into `view` on a fixed interval
pub async fn run_chart_poller(
    client: Arc<DashboardClient>,
    view: Arc<ChartView>,
    interval_seconds: u64,
    time_range: Option<u32>,
) {
    let mut ticker = interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match client.fetch_chart_data(time_range).await {
            Ok(data) => view.apply_chart_data(&data),
            Err(e) => warn!(error = %format!("{:#}", e), "Error loading chart data"),
        }
    }
}
