pub mod env;

use crate::live::{BackoffPolicy, Channel};
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete railwatch configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RailwatchConfig {
    #[serde(default)]
    pub live: LiveConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Live connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    /// Origin of the dashboard server, e.g. "https://ops.example.com".
    /// An https origin connects over wss.
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Channels subscribed on every successful connect
    #[serde(default = "default_channels")]
    pub channels: Vec<Channel>,
}

fn default_origin() -> String {
    "http://localhost:8080".to_string()
}

fn default_path() -> String {
    "/ws/dashboard".to_string()
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    5
}

fn default_channels() -> Vec<Channel> {
    Channel::ALL.to_vec()
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            path: default_path(),
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            channels: default_channels(),
        }
    }
}

impl LiveConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(self.base_delay_ms), self.max_attempts)
    }

    /// WebSocket URL for the configured origin: https → wss, http → ws
    pub fn endpoint_url(&self) -> Result<String> {
        let mut url = reqwest::Url::parse(&self.origin)
            .with_context(|| format!("Invalid origin '{}'", self.origin))?;

        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => bail!("Unsupported origin scheme '{}'", other),
        };
        url.set_scheme(scheme)
            .map_err(|_| anyhow!("Cannot use scheme '{}' for origin '{}'", scheme, self.origin))?;
        url.set_path(&self.path);
        url.set_query(None);
        url.set_fragment(None);

        Ok(url.to_string())
    }
}

/// Polling fallback configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_polling_enabled")]
    pub enabled: bool,
    /// Refresh period for stats, activities and alerts (seconds)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_seconds: u64,
    /// Refresh period for chart data (seconds)
    #[serde(default = "default_chart_interval")]
    pub chart_interval_seconds: u64,
    /// Optional `timeRange` for chart-data requests
    #[serde(default)]
    pub time_range: Option<u32>,
}

fn default_polling_enabled() -> bool {
    true
}

fn default_stats_interval() -> u64 {
    3
}

fn default_chart_interval() -> u64 {
    5
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: default_polling_enabled(),
            stats_interval_seconds: default_stats_interval(),
            chart_interval_seconds: default_chart_interval(),
            time_range: None,
        }
    }
}

impl RailwatchConfig {
    /// Reject settings the manager cannot run with
    pub fn validate(&self) -> Result<()> {
        self.live.backoff().validate()?;
        self.live.endpoint_url()?;
        if self.polling.enabled
            && (self.polling.stats_interval_seconds == 0 || self.polling.chart_interval_seconds == 0)
        {
            bail!("Polling intervals must be > 0");
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<RailwatchConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: RailwatchConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file '{}'", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = RailwatchConfig::default();
        assert_eq!(config.live.origin, "http://localhost:8080");
        assert_eq!(config.live.path, "/ws/dashboard");
        assert_eq!(config.live.base_delay_ms, 1000);
        assert_eq!(config.live.max_attempts, 5);
        assert_eq!(config.live.channels, Channel::ALL.to_vec());
        assert!(config.polling.enabled);
        assert_eq!(config.polling.stats_interval_seconds, 3);
        assert_eq!(config.polling.chart_interval_seconds, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [live]
            origin = "https://ops.example.com"
            base_delay_ms = 250
            max_attempts = 3
            channels = ["stats", "charts"]

            [polling]
            enabled = false
            time_range = 60
        "#;

        let config: RailwatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.live.origin, "https://ops.example.com");
        assert_eq!(config.live.base_delay_ms, 250);
        assert_eq!(config.live.max_attempts, 3);
        assert_eq!(config.live.channels, vec![Channel::Stats, Channel::Charts]);
        assert!(!config.polling.enabled);
        assert_eq!(config.polling.time_range, Some(60));
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [polling]
            stats_interval_seconds = 10
        "#;

        let config: RailwatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.polling.stats_interval_seconds, 10);
        assert_eq!(config.polling.chart_interval_seconds, 5); // Default
        assert_eq!(config.live.max_attempts, 5); // Default
    }

    #[test]
    fn test_endpoint_url_follows_origin_scheme() {
        let mut live = LiveConfig::default();
        assert_eq!(live.endpoint_url().unwrap(), "ws://localhost:8080/ws/dashboard");

        live.origin = "https://ops.example.com/some/page?x=1".to_string();
        assert_eq!(live.endpoint_url().unwrap(), "wss://ops.example.com/ws/dashboard");

        live.origin = "ftp://ops.example.com".to_string();
        assert!(live.endpoint_url().is_err());

        live.origin = "not a url".to_string();
        assert!(live.endpoint_url().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_delay() {
        let mut config = RailwatchConfig::default();
        config.live.base_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[live]\norigin = \"http://10.0.0.5:9000\"").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.live.origin, "http://10.0.0.5:9000");

        assert!(load_config("/nonexistent/railwatch.toml").is_err());
    }
}
