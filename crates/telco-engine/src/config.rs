//! Configuration loading and typed config structures for the simulation.
//!
//! The canonical configuration lives in `telco-config.yaml` in the working
//! directory (or wherever `TELCO_CONFIG` points). Every field has a default,
//! so a missing file or a partial one is fine.

use std::path::Path;

use serde::Deserialize;
use telco_tower::TowerSettings;
use telco_tower::publisher::TOPIC_ID_PLACEHOLDER;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but makes no sense.
    #[error("invalid config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SimulationConfig {
    /// Map size and randomness.
    #[serde(default)]
    pub world: WorldConfig,

    /// Tower population and radio settings.
    #[serde(default)]
    pub towers: TowersConfig,

    /// Caller population and behaviour.
    #[serde(default)]
    pub callers: CallersConfig,

    /// CDR event stream transport.
    #[serde(default)]
    pub stream: StreamConfig,

    /// Run bounds.
    #[serde(default)]
    pub simulation: RunConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `NATS_URL` in the environment overrides `stream.nats_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.stream.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let world = &self.world;
        if !(world.width_m.is_finite() && world.width_m > 0.0)
            || !(world.height_m.is_finite() && world.height_m > 0.0)
        {
            return Err(invalid(format!(
                "world area must be positive, got {} x {}",
                world.width_m, world.height_m
            )));
        }
        if self.towers.count == 0 {
            return Err(invalid("towers.count must be at least 1"));
        }
        if !self
            .towers
            .settings
            .topic_template
            .contains(TOPIC_ID_PLACEHOLDER)
        {
            return Err(invalid(format!(
                "towers.topic_template must contain {TOPIC_ID_PLACEHOLDER}"
            )));
        }
        let callers = &self.callers;
        if callers.count == 0 {
            return Err(invalid("callers.count must be at least 1"));
        }
        if callers.max_attempts == 0 {
            return Err(invalid("callers.max_attempts must be at least 1"));
        }
        if callers.min_call_ms > callers.max_call_ms {
            return Err(invalid("callers.min_call_ms exceeds callers.max_call_ms"));
        }
        if callers.min_idle_ms > callers.max_idle_ms {
            return Err(invalid("callers.min_idle_ms exceeds callers.max_idle_ms"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Map size and randomness.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorldConfig {
    /// Seed for tower placement and per-entity random sources. `None`
    /// seeds from the OS.
    #[serde(default)]
    pub seed: Option<u64>,

    /// East-west extent of the map in meters.
    #[serde(default = "default_extent_m")]
    pub width_m: f64,

    /// North-south extent of the map in meters.
    #[serde(default = "default_extent_m")]
    pub height_m: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            seed: None,
            width_m: default_extent_m(),
            height_m: default_extent_m(),
        }
    }
}

/// Tower population and radio settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TowersConfig {
    /// Number of towers placed uniformly over the map.
    #[serde(default = "default_tower_count")]
    pub count: u32,

    /// Settings shared by every tower.
    #[serde(flatten)]
    pub settings: TowerSettings,
}

impl Default for TowersConfig {
    fn default() -> Self {
        Self {
            count: default_tower_count(),
            settings: TowerSettings::default(),
        }
    }
}

/// Caller population and behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CallersConfig {
    /// Number of concurrent callers.
    #[serde(default = "default_caller_count")]
    pub count: u32,

    /// How long a caller collects signal reports before choosing a tower.
    #[serde(default = "default_report_window_ms")]
    pub report_window_ms: u64,

    /// How long a caller waits for `Connect`/`Fail` before giving up on a tower.
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,

    /// Towers tried per call before the call is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Shortest call duration.
    #[serde(default = "default_min_call_ms")]
    pub min_call_ms: u64,

    /// Longest call duration.
    #[serde(default = "default_max_call_ms")]
    pub max_call_ms: u64,

    /// Shortest pause between calls.
    #[serde(default = "default_min_idle_ms")]
    pub min_idle_ms: u64,

    /// Longest pause between calls.
    #[serde(default = "default_max_idle_ms")]
    pub max_idle_ms: u64,
}

impl Default for CallersConfig {
    fn default() -> Self {
        Self {
            count: default_caller_count(),
            report_window_ms: default_report_window_ms(),
            reply_timeout_ms: default_reply_timeout_ms(),
            max_attempts: default_max_attempts(),
            min_call_ms: default_min_call_ms(),
            max_call_ms: default_max_call_ms(),
            min_idle_ms: default_min_idle_ms(),
            max_idle_ms: default_max_idle_ms(),
        }
    }
}

/// CDR event stream transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamConfig {
    /// NATS server URL. Without one, CDRs stay in memory.
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Flush the connection after every record.
    #[serde(default = "default_true")]
    pub flush_each_publish: bool,

    /// Records kept by the in-memory stream when no NATS URL is set.
    /// Older records are evicted first.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            nats_url: None,
            flush_each_publish: true,
            memory_capacity: default_memory_capacity(),
        }
    }
}

impl StreamConfig {
    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("NATS_URL") {
            self.nats_url = Some(url);
        }
    }
}

/// Run bounds.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Wall-clock run time in seconds. `0` runs until Ctrl-C.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
        }
    }
}

const fn default_extent_m() -> f64 {
    20_000.0
}

const fn default_tower_count() -> u32 {
    10
}

const fn default_caller_count() -> u32 {
    50
}

const fn default_report_window_ms() -> u64 {
    200
}

const fn default_reply_timeout_ms() -> u64 {
    500
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_min_call_ms() -> u64 {
    1_000
}

const fn default_max_call_ms() -> u64 {
    10_000
}

const fn default_min_idle_ms() -> u64 {
    500
}

const fn default_max_idle_ms() -> u64 {
    5_000
}

const fn default_true() -> bool {
    true
}

const fn default_memory_capacity() -> usize {
    10_000
}

const fn default_duration_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = SimulationConfig::parse("{}");
        assert!(config.is_ok());
        let config = config.unwrap_or_default();
        assert_eq!(config.towers.count, 10);
        assert_eq!(config.callers.max_attempts, 3);
        assert_eq!(config.towers.settings, TowerSettings::default());
        assert_eq!(config.simulation.duration_secs, 60);
        assert_eq!(config.stream.memory_capacity, 10_000);
    }

    #[test]
    fn tower_settings_are_flattened() {
        let yaml = "
towers:
  count: 3
  transmit_power: 40.0
  topic_template: \"cdr.tower.{id}\"
";
        let config = SimulationConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.unwrap_or_default();
        assert_eq!(config.towers.count, 3);
        assert!((config.towers.settings.transmit_power - 40.0).abs() < f64::EPSILON);
        assert!((config.towers.settings.reference_distance_m - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.towers.settings.topic_template, "cdr.tower.{id}");
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let yaml = "towers: { topic_template: \"telco:tower\" }";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let yaml = "callers: { min_call_ms: 5000, max_call_ms: 10 }";
        assert!(matches!(
            SimulationConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn zero_towers_is_rejected() {
        assert!(matches!(
            SimulationConfig::parse("towers: { count: 0 }"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn malformed_yaml_is_a_yaml_error() {
        assert!(matches!(
            SimulationConfig::parse("towers: [unclosed"),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
