use serde::Deserialize;

use crate::loader::LoaderConfig;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelsConfig {
    /// Bounded capacity of each ingest channel (producers drop on full).
    #[serde(default = "default_ingest_capacity")]
    pub ingest_capacity: usize,
    /// Max number of update events kept in the broadcast channel for
    /// subscribers (slow subscribers may lag).
    #[serde(default = "default_events_capacity")]
    pub events_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// How often to log app stats (messages applied/dropped) at INFO level.
    #[serde(default = "default_stats_log_interval_secs")]
    pub stats_log_interval_secs: u64,
}

fn default_ingest_capacity() -> usize {
    64
}

fn default_events_capacity() -> usize {
    16
}

fn default_stats_log_interval_secs() -> u64 {
    60
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: default_ingest_capacity(),
            events_capacity: default_events_capacity(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            stats_log_interval_secs: default_stats_log_interval_secs(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            ingest_capacity: self.channels.ingest_capacity,
            events_capacity: self.channels.events_capacity,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.channels.ingest_capacity > 0,
            "channels.ingest_capacity must be > 0, got {}",
            self.channels.ingest_capacity
        );
        anyhow::ensure!(
            self.channels.events_capacity > 0,
            "channels.events_capacity must be > 0, got {}",
            self.channels.events_capacity
        );
        anyhow::ensure!(
            self.monitoring.stats_log_interval_secs > 0,
            "monitoring.stats_log_interval_secs must be > 0, got {}",
            self.monitoring.stats_log_interval_secs
        );
        Ok(())
    }
}
