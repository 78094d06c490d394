use super::RailwatchConfig;
use tracing::warn;

pub const ENV_CONFIG_PATH: &str = "RAILWATCH_CONFIG";
pub const ENV_ORIGIN: &str = "RAILWATCH_ORIGIN";
pub const ENV_BASE_DELAY_MS: &str = "RAILWATCH_BASE_DELAY_MS";
pub const ENV_MAX_ATTEMPTS: &str = "RAILWATCH_MAX_ATTEMPTS";
pub const ENV_POLLING_ENABLED: &str = "RAILWATCH_POLLING_ENABLED";

impl RailwatchConfig {
    /// Overlay env vars on top of file/default values.
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_ORIGIN) {
            self.live.origin = v;
        }
        if let Some(v) = lookup(ENV_BASE_DELAY_MS) {
            match v.parse::<u64>() {
                Ok(n) => self.live.base_delay_ms = n,
                Err(_) => warn!(var = ENV_BASE_DELAY_MS, value = %v, "Ignoring invalid override"),
            }
        }
        if let Some(v) = lookup(ENV_MAX_ATTEMPTS) {
            match v.parse::<u32>() {
                Ok(n) => self.live.max_attempts = n,
                Err(_) => warn!(var = ENV_MAX_ATTEMPTS, value = %v, "Ignoring invalid override"),
            }
        }
        if let Some(v) = lookup(ENV_POLLING_ENABLED) {
            match v.parse::<bool>() {
                Ok(b) => self.polling.enabled = b,
                Err(_) => warn!(var = ENV_POLLING_ENABLED, value = %v, "Ignoring invalid override"),
            }
        }
    }
}
