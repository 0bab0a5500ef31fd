//! Batch driver: many independent runs, bounded concurrency.
//!
//! Each run owns its archive and collaborators and executes on its own tokio
//! task, so a failing or panicking run is reported without disturbing its
//! siblings. Runs share nothing but the output directory, where the run
//! suffix keeps their archive files apart.

use std::sync::Arc;

use robosci_archive::Archive;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{BatchConfig, RunConfig};
use crate::metrics::METRICS;
use crate::overseer::{Overseer, RunOutcome};
use crate::ports::Collaborators;

/// One cell of the batch grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunSpec {
    pub configuration: String,
    pub test_case: String,
    pub repetition: u32,
}

impl RunSpec {
    pub fn new(configuration: &str, test_case: &str, repetition: u32) -> Self {
        Self {
            configuration: configuration.to_string(),
            test_case: test_case.to_string(),
            repetition,
        }
    }

    /// `<configuration>_<test_case>_<repetition>`, unique within a batch.
    pub fn suffix(&self) -> String {
        format!("{}_{}_{}", self.configuration, self.test_case, self.repetition)
    }
}

/// Builds the initial archive and the collaborators for a run.
pub trait RunFactory: Send + Sync + 'static {
    fn build(&self, spec: &RunSpec, config: &RunConfig) -> anyhow::Result<(Archive, Collaborators)>;
}

#[derive(Debug)]
pub struct BatchReport {
    pub spec: RunSpec,
    pub outcome: Result<RunOutcome, String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct BatchDriver {
    factory: Arc<dyn RunFactory>,
    config: RunConfig,
    parallelism: usize,
}

impl BatchDriver {
    pub fn new(factory: impl RunFactory, config: RunConfig, parallelism: usize) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
            parallelism: parallelism.max(1),
        }
    }

    pub fn from_config(factory: impl RunFactory, batch: &BatchConfig) -> Self {
        Self::new(factory, batch.run.clone(), batch.parallelism)
    }

    /// Run every spec; reports come back in spec order.
    pub async fn run_all(&self, specs: Vec<RunSpec>) -> Vec<BatchReport> {
        let total = specs.len();
        info!(runs = total, parallelism = self.parallelism, "batch started");

        let permits = Arc::new(Semaphore::new(self.parallelism));
        let mut tasks = JoinSet::new();
        for (index, spec) in specs.into_iter().enumerate() {
            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let report = match permits.acquire_owned().await {
                    Ok(_permit) => run_one(factory, spec, config).await,
                    Err(_) => BatchReport {
                        spec,
                        outcome: Err("batch cancelled".to_string()),
                    },
                };
                (index, report)
            });
        }

        let mut reports = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(indexed) => reports.push(indexed),
                Err(e) => warn!(error = %e, "batch task failed"),
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        let failed = reports.iter().filter(|(_, r)| !r.succeeded()).count();
        info!(runs = total, failed, "batch finished");
        METRICS.flush();

        reports.into_iter().map(|(_, report)| report).collect()
    }
}

async fn run_one(factory: Arc<dyn RunFactory>, spec: RunSpec, config: RunConfig) -> BatchReport {
    let (archive, collaborators) = match factory.build(&spec, &config) {
        Ok(parts) => parts,
        Err(e) => {
            warn!(suffix = %spec.suffix(), error = %e, "run setup failed");
            return BatchReport {
                spec,
                outcome: Err(format!("setup failed: {e:#}")),
            };
        }
    };

    let mut overseer = Overseer::new(archive, collaborators, config, spec.suffix());
    let handle = tokio::spawn(async move { overseer.run().await.map_err(|e| e.to_string()) });
    let outcome = match handle.await {
        Ok(outcome) => outcome,
        Err(join) => Err(format!("run task failed: {join}")),
    };

    BatchReport { spec, outcome }
}
