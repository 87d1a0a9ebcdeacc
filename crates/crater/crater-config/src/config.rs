use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CraterConfig {
    #[serde(default = "defaults::listen")]
    pub listen: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default)]
    pub ring: RingSection,
    #[serde(default)]
    pub roster: RosterSection,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RingSection {
    #[serde(default = "defaults::capacity")]
    pub capacity: u64,
}

/// Which actors must connect before the ring starts running.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RosterSection {
    #[serde(default = "defaults::expect")]
    pub producer: bool,
    #[serde(default = "defaults::expect")]
    pub transformer: bool,
    #[serde(default)]
    pub consumers: usize,
    #[serde(default = "defaults::consumer_stride")]
    pub consumer_stride: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

mod defaults {
    pub fn listen() -> String {
        "127.0.0.1:7070".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn capacity() -> u64 {
        100
    }

    pub fn expect() -> bool {
        true
    }

    pub fn consumer_stride() -> u64 {
        1
    }
}

impl Default for RingSection {
    fn default() -> Self {
        Self {
            capacity: defaults::capacity(),
        }
    }
}

impl Default for RosterSection {
    fn default() -> Self {
        Self {
            producer: defaults::expect(),
            transformer: defaults::expect(),
            consumers: 0,
            consumer_stride: defaults::consumer_stride(),
        }
    }
}

impl Default for CraterConfig {
    fn default() -> Self {
        Self {
            listen: defaults::listen(),
            log_level: defaults::log_level(),
            ring: RingSection::default(),
            roster: RosterSection::default(),
        }
    }
}

impl CraterConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&toml_to_str)
    }

    pub fn from_toml(s: &str) -> Result<Self, ConfigError> {
        let config: CraterConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ring.capacity == 0 {
            return Err(ConfigError::Invalid("ring.capacity must be at least 1".into()));
        }
        if self.roster.consumer_stride == 0 {
            return Err(ConfigError::Invalid(
                "roster.consumer_stride must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
