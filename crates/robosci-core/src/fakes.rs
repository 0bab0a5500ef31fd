//! In-memory collaborators for tests and demos.
//!
//! These stand in for the solver-backed revision, design and oracle
//! components. Their behaviour is fixed up front, so a run over them is
//! reproducible.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use robosci_archive::{
    Archive, CompartmentId, Condition, EntityId, Event, ExpResult, Experiment,
    ExperimentDescription, ExperimentType, FailureEvent, Model, ModelId,
};

use crate::ports::{ExperimentDesign, Oracle, RevisionModule};

/// `count` structurally distinct models.
pub fn sample_models(count: u64) -> Vec<Model> {
    (0..count)
        .map(|i| {
            Model::new(
                [Condition::Present {
                    entity: EntityId(i),
                    compartment: CompartmentId("c_01".to_string()),
                }],
                [],
                [Condition::Present {
                    entity: EntityId(1000 + i),
                    compartment: CompartmentId("c_01".to_string()),
                }],
            )
        })
        .collect()
}

/// Archive holding `models` sample models as its initial pool.
pub fn seeded_archive(models: u64, seed: u64) -> Archive {
    let mut archive = Archive::with_seed(seed);
    archive
        .record(Event::initial_models(sample_models(models)))
        .expect("fresh models in a fresh archive always validate");
    archive
}

/// Detection experiments for entities `0..count`.
pub fn detection_experiments(count: u64) -> Vec<ExperimentDescription> {
    (0..count)
        .map(|i| ExperimentDescription::new(ExperimentType::DetectionEntity { entity: EntityId(i) }))
        .collect()
}

/// Revision that refutes a fixed number of models per call.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRevision {
    ignores_results: bool,
    refute_per_call: usize,
    additional: Option<Model>,
    fail_on_call: Option<usize>,
    calls: usize,
}

impl ScriptedRevision {
    pub fn new(ignores_results: bool) -> Self {
        Self {
            ignores_results,
            ..Self::default()
        }
    }

    /// Refute up to `count` working models (lowest IDs first) per call.
    pub fn refuting(mut self, count: usize) -> Self {
        self.refute_per_call = count;
        self
    }

    /// Produce a copy of `template` whenever more models are requested.
    /// Without a template the request fails.
    pub fn producing(mut self, template: Model) -> Self {
        self.additional = Some(template);
        self
    }

    /// Record RevisionFail on the `call`-th test_and_revise_all (0-based).
    pub fn failing_on(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }
}

#[async_trait]
impl RevisionModule for ScriptedRevision {
    fn ignores_results(&self) -> bool {
        self.ignores_results
    }

    async fn test_and_revise_all(&mut self, archive: &mut Archive) -> Result<()> {
        let call = self.calls;
        self.calls += 1;

        if self.fail_on_call == Some(call) {
            archive.record(Event::RevisionFail(FailureEvent::because(
                "no consistent revision",
            )))?;
            return Ok(());
        }

        let refuted: BTreeSet<ModelId> = archive
            .working_model_ids()
            .iter()
            .copied()
            .take(self.refute_per_call)
            .collect();
        if !refuted.is_empty() {
            archive.record(Event::refuted_models(refuted))?;
        }
        Ok(())
    }

    async fn produce_additional_models(&mut self, archive: &mut Archive) -> Result<()> {
        match &self.additional {
            Some(template) => archive.record(Event::additional_models([template.derive()]))?,
            None => archive.record(Event::AdditModProdFail(FailureEvent::because(
                "no additional model",
            )))?,
        };
        Ok(())
    }
}

/// Design that proposes its candidates in order, then gives up.
#[derive(Debug, Clone)]
pub struct RoundRobinDesign {
    candidates: Vec<ExperimentDescription>,
    next: usize,
}

impl RoundRobinDesign {
    pub fn new(candidates: Vec<ExperimentDescription>) -> Self {
        Self {
            candidates,
            next: 0,
        }
    }
}

#[async_trait]
impl ExperimentDesign for RoundRobinDesign {
    async fn get_experiment(&mut self, archive: &mut Archive) -> Result<()> {
        match self.candidates.get(self.next) {
            Some(description) => {
                archive.record(Event::chosen_experiment([description.clone()]))?;
                self.next += 1;
            }
            None => {
                archive.record(Event::ExpDesignFail(FailureEvent::because(
                    "no discriminating experiment left",
                )))?;
            }
        }
        Ok(())
    }
}

/// Oracle answering every chosen experiment with the same outcome.
#[derive(Debug, Clone)]
pub struct ConstantOracle {
    outcome: bool,
    delay: Option<Duration>,
}

impl ConstantOracle {
    pub fn new(outcome: bool) -> Self {
        Self {
            outcome,
            delay: None,
        }
    }

    /// Sleep for `delay` before answering.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Oracle for ConstantOracle {
    async fn execute_exps(&mut self, archive: &mut Archive) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let results: Vec<ExpResult> = archive
            .chosen_experiment_descriptions()
            .iter()
            .map(|d| ExpResult::new(d.clone(), self.outcome))
            .collect();
        archive.record(Event::new_results(Experiment::new(results)))?;
        Ok(())
    }
}

/// Oracle whose backend is broken.
#[derive(Debug, Clone, Default)]
pub struct FailingOracle;

#[async_trait]
impl Oracle for FailingOracle {
    async fn execute_exps(&mut self, _archive: &mut Archive) -> Result<()> {
        Err(anyhow!("oracle backend unavailable"))
    }
}
