//! Run and batch configuration.
//!
//! Batches are described in TOML:
//!
//! ```toml
//! parallelism = 4
//! configurations = ["ignoring", "no_ignoring"]
//! test_cases = ["case_1", "case_2"]
//! repetitions = 3
//!
//! [run]
//! max_cycles = 40
//! max_time_secs = 1800
//! collaborator_timeout_secs = 120
//! output_dir = "archives"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use robosci_archive::Archive;
use serde::{Deserialize, Serialize};

use crate::batch::RunSpec;
use crate::error::ConfigError;

/// Budgets and thresholds for one overseer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_cycles: u64,
    pub max_time_secs: u64,
    /// Below this many working models the overseer asks for more.
    pub threshold_additional_models: usize,
    /// Stagnant cycles tolerated by the ignoring checkpoint policy.
    pub stop_threshold: u64,
    /// Per-call collaborator limit; 0 disables it.
    pub collaborator_timeout_secs: u64,
    pub output_dir: PathBuf,
    pub rng_seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_cycles: 50,
            max_time_secs: 3600,
            threshold_additional_models: 2,
            stop_threshold: 2,
            collaborator_timeout_secs: 0,
            output_dir: PathBuf::from("archives"),
            rng_seed: None,
        }
    }
}

impl RunConfig {
    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_secs)
    }

    /// Empty archive drawing from `rng_seed` when set.
    pub fn new_archive(&self) -> Archive {
        match self.rng_seed {
            Some(seed) => Archive::with_seed(seed),
            None => Archive::new(),
        }
    }

    pub fn collaborator_timeout(&self) -> Option<Duration> {
        (self.collaborator_timeout_secs > 0)
            .then(|| Duration::from_secs(self.collaborator_timeout_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cycles == 0 {
            return Err(ConfigError::Invalid("max_cycles must be positive".into()));
        }
        if self.max_time_secs == 0 {
            return Err(ConfigError::Invalid("max_time_secs must be positive".into()));
        }
        if self.stop_threshold == 0 {
            return Err(ConfigError::Invalid("stop_threshold must be positive".into()));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("output_dir must not be empty".into()));
        }
        Ok(())
    }
}

/// A grid of runs: every configuration against every test case, repeated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    pub configurations: Vec<String>,
    pub test_cases: Vec<String>,
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default)]
    pub run: RunConfig,
}

fn default_parallelism() -> usize {
    1
}

fn default_repetitions() -> u32 {
    1
}

impl BatchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid("parallelism must be positive".into()));
        }
        if self.configurations.is_empty() {
            return Err(ConfigError::Invalid("no configurations listed".into()));
        }
        if self.test_cases.is_empty() {
            return Err(ConfigError::Invalid("no test cases listed".into()));
        }
        if self.repetitions == 0 {
            return Err(ConfigError::Invalid("repetitions must be positive".into()));
        }
        self.run.validate()
    }

    /// Configurations x test cases x repetitions, in that nesting order.
    pub fn run_specs(&self) -> Vec<RunSpec> {
        let mut specs = Vec::new();
        for configuration in &self.configurations {
            for test_case in &self.test_cases {
                for repetition in 0..self.repetitions {
                    specs.push(RunSpec::new(configuration, test_case, repetition));
                }
            }
        }
        specs
    }
}
