//! Runtime configuration, loaded from RON.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use realms_log::Verbosity;

/// How many worker threads the planning pool should spawn.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerCount {
    /// One less than the number of available cores.
    #[default]
    Auto,
    /// Exactly this many. `0` runs every job on the calling thread.
    Fixed(usize),
}

impl WorkerCount {
    /// Returns the actual number of workers to spawn.
    pub fn resolve(self) -> usize {
        match self {
            Self::Auto => realms_workers::available_workers(),
            Self::Fixed(count) => count,
        }
    }
}

/// An error that might occur while loading a [`Config`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read the configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse the configuration file: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// The configuration of the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The size of the planning pool.
    pub workers: WorkerCount,
    /// The most verbose messages that get logged.
    pub log_verbosity: Verbosity,
    /// The horizontal radius of the reality bubble, in chunks.
    pub bubble_radius: u32,
    /// The lowest level kept resident around the player.
    pub bubble_z_min: i32,
    /// The highest level kept resident around the player.
    pub bubble_z_max: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: WorkerCount::Auto,
            log_verbosity: Verbosity::Info,
            bubble_radius: 5,
            bubble_z_min: -10,
            bubble_z_max: 10,
        }
    }
}

impl Config {
    /// Parses a [`Config`] from RON. Missing fields take their default value.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Loads a [`Config`] from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_are_defaulted() {
        let config = Config::from_ron_str("(bubble_radius: 2, workers: Fixed(3))").unwrap();
        assert_eq!(config.bubble_radius, 2);
        assert_eq!(config.workers, WorkerCount::Fixed(3));
        assert_eq!(config.bubble_z_max, Config::default().bubble_z_max);
        assert_eq!(config.workers.resolve(), 3);
    }

    #[test]
    fn empty_config_is_the_default() {
        assert_eq!(Config::from_ron_str("()").unwrap(), Config::default());
    }

    #[test]
    fn verbosity_is_parsed() {
        let config = Config::from_ron_str("(log_verbosity: Trace)").unwrap();
        assert_eq!(config.log_verbosity, Verbosity::Trace);
    }

    #[test]
    fn errors_are_reported() {
        assert!(matches!(
            Config::from_ron_str("(bubble_radius: -1)"),
            Err(ConfigError::Ron(_))
        ));
        assert!(matches!(
            Config::load("/this/path/does/not/exist.ron"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn serialized_config_parses_back() {
        let config = Config {
            workers: WorkerCount::Fixed(0),
            ..Config::default()
        };
        let text = ron::to_string(&config).unwrap();
        assert_eq!(Config::from_ron_str(&text).unwrap(), config);
    }
}
