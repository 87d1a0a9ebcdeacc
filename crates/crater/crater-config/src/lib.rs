mod config;

pub use config::{ConfigError, CraterConfig, RingSection, RosterSection};
