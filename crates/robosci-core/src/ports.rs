//! Collaborator ports driven by the overseer.
//!
//! Collaborators do their work by recording events on the archive they are
//! handed. An `Err` is a hard failure of the collaborator itself (crashed
//! solver, unreadable output); "no revision found" and similar outcomes are
//! soft-failure events instead.

use anyhow::Result;
use async_trait::async_trait;
use robosci_archive::Archive;

/// Tests working models against evidence and revises refuted ones.
#[async_trait]
pub trait RevisionModule: Send {
    /// Whether revisions may ignore inconsistent results. Selects the
    /// checkpoint policy for the run.
    fn ignores_results(&self) -> bool;

    /// Records RefutedModels / RevisedModel / RedundantModel /
    /// RevisedIgnoredUpdate, or RevisionFail.
    async fn test_and_revise_all(&mut self, archive: &mut Archive) -> Result<()>;

    /// Records AdditionalModels, or AdditModProdFail.
    async fn produce_additional_models(&mut self, archive: &mut Archive) -> Result<()>;
}

/// Chooses the next experiment to discriminate between working models.
#[async_trait]
pub trait ExperimentDesign: Send {
    /// Records ChosenExperiment, or ExpDesignFail.
    async fn get_experiment(&mut self, archive: &mut Archive) -> Result<()>;
}

/// Runs the chosen experiments against the ground truth.
#[async_trait]
pub trait Oracle: Send {
    /// Reads `archive.chosen_experiment_descriptions()` and records NewResults.
    async fn execute_exps(&mut self, archive: &mut Archive) -> Result<()>;
}

/// Scores working models.
#[async_trait]
pub trait QualityModule: Send {
    /// Records UpdatedModelQuality for every model whose quality changed.
    async fn check_and_update_qualities(&mut self, archive: &mut Archive) -> Result<()>;
}

/// The four collaborators wired into one overseer.
pub struct Collaborators {
    pub revision: Box<dyn RevisionModule>,
    pub design: Box<dyn ExperimentDesign>,
    pub oracle: Box<dyn Oracle>,
    pub quality: Box<dyn QualityModule>,
}

impl Collaborators {
    pub fn new(
        revision: impl RevisionModule + 'static,
        design: impl ExperimentDesign + 'static,
        oracle: impl Oracle + 'static,
        quality: impl QualityModule + 'static,
    ) -> Self {
        Self {
            revision: Box::new(revision),
            design: Box::new(design),
            oracle: Box::new(oracle),
            quality: Box::new(quality),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("ignores_results", &self.revision.ignores_results())
            .finish_non_exhaustive()
    }
}
