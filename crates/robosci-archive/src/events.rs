//! Development events for the append-only history.
//!
//! Events are the ground truth of a run. Working models, known results, ID
//! counters and flags are projections derived from this stream, and the
//! stream alone is enough to rebuild them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::experiment::{Experiment, ExperimentDescription};
use crate::ids::{ModelId, ResultId};
use crate::model::Model;

// ============================================================================
// EVENT TYPES
// ============================================================================

/// Development events - closed set, totally ordered by append sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// The starting pool of candidate models
    InitialModels(InitialModelsEvent),

    /// Results known before the run starts
    InitialResults(InitialResultsEvent),

    /// Experiment descriptions picked for execution
    ChosenExperiment(ChosenExperimentEvent),

    /// Results produced by the oracle, not yet accepted
    NewResults(NewResultsEvent),

    /// Results accepted into the known results
    AcceptedResults(AcceptedResultsEvent),

    /// Models removed from the working pool
    RefutedModels(RefutedModelsEvent),

    /// Replacement models produced by revising an inconsistent one
    RevisedModel(RevisedModelEvent),

    /// A revision candidate structurally equal to an existing model
    RedundantModel(RedundantModelEvent),

    /// Models added to replenish a shrinking pool
    AdditionalModels(AdditionalModelsEvent),

    /// Every working model is empirically indistinguishable; collapse to one
    AllModelsEmpiricallyEquivalent(AllModelsEmpiricallyEquivalentEvent),

    /// A model's quality changed
    UpdatedModelQuality(UpdatedModelQualityEvent),

    /// A model's ignored/covered results changed during revision
    RevisedIgnoredUpdate(RevisedIgnoredUpdateEvent),

    /// The revision collaborator could not revise
    RevisionFail(FailureEvent),

    /// The revision collaborator could not produce additional models
    AdditModProdFail(FailureEvent),

    /// The design collaborator could not design an experiment
    ExpDesignFail(FailureEvent),

    /// The checkpoint policy allowed the run to continue
    CheckPointSuccess(CheckPointEvent),

    /// The checkpoint policy halted the run
    CheckPointFail(CheckPointEvent),

    /// A collaborator call exceeded its time limit and was cancelled
    CollaboratorTimeout(CollaboratorTimeoutEvent),
}

// ============================================================================
// INDIVIDUAL EVENT TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialModelsEvent {
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialResultsEvent {
    pub experiments: Vec<Experiment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChosenExperimentEvent {
    pub descriptions: Vec<ExperimentDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResultsEvent {
    pub experiment: Experiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedResultsEvent {
    pub experiment: Experiment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefutedModelsEvent {
    pub models: BTreeSet<ModelId>,
}

/// Removal of `old_model` is not implied; it arrives as a companion
/// [`RefutedModelsEvent`] in the same revision cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisedModelEvent {
    pub old_model: ModelId,
    pub revised_models: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundantModelEvent {
    pub base_model: ModelId,
    pub model: Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalModelsEvent {
    pub models: Vec<Model>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllModelsEmpiricallyEquivalentEvent {
    pub models: BTreeSet<ModelId>,
    /// Survivor, filled in by the archive when the event is recorded.
    pub model_left: Option<ModelId>,
}

impl AllModelsEmpiricallyEquivalentEvent {
    pub fn new(models: impl IntoIterator<Item = ModelId>) -> Self {
        Self {
            models: models.into_iter().collect(),
            model_left: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedModelQualityEvent {
    pub model: ModelId,
    pub new_quality: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisedIgnoredUpdateEvent {
    pub model: ModelId,
    pub ignored_results: BTreeSet<ResultId>,
    pub results_covered: BTreeSet<ResultId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureEvent {
    /// Free-form detail from the collaborator.
    pub detail: Option<String>,
}

impl FailureEvent {
    pub fn because(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
        }
    }
}

/// Stagnation test used by a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointPolicyKind {
    Ignoring,
    NoIgnoring,
}

impl std::fmt::Display for CheckpointPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointPolicyKind::Ignoring => f.write_str("ignoring"),
            CheckpointPolicyKind::NoIgnoring => f.write_str("no ignoring"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckPointEvent {
    pub policy: CheckpointPolicyKind,
    /// Completed cycles when the check ran.
    pub cycle: u64,
}

/// Collaborator port named in timeout events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collaborator {
    Revision,
    ExperimentDesign,
    Oracle,
    Quality,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Collaborator::Revision => "revision",
            Collaborator::ExperimentDesign => "experiment_design",
            Collaborator::Oracle => "oracle",
            Collaborator::Quality => "quality",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaboratorTimeoutEvent {
    pub collaborator: Collaborator,
    pub limit_secs: u64,
}

// ============================================================================
// EVENT KINDS
// ============================================================================

/// Payload-free discriminant of [`Event`], for logging and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    InitialModels,
    InitialResults,
    ChosenExperiment,
    NewResults,
    AcceptedResults,
    RefutedModels,
    RevisedModel,
    RedundantModel,
    AdditionalModels,
    AllModelsEmpiricallyEquivalent,
    UpdatedModelQuality,
    RevisedIgnoredUpdate,
    RevisionFail,
    AdditModProdFail,
    ExpDesignFail,
    CheckPointSuccess,
    CheckPointFail,
    CollaboratorTimeout,
}

impl EventKind {
    pub const ALL: [EventKind; 18] = [
        EventKind::InitialModels,
        EventKind::InitialResults,
        EventKind::ChosenExperiment,
        EventKind::NewResults,
        EventKind::AcceptedResults,
        EventKind::RefutedModels,
        EventKind::RevisedModel,
        EventKind::RedundantModel,
        EventKind::AdditionalModels,
        EventKind::AllModelsEmpiricallyEquivalent,
        EventKind::UpdatedModelQuality,
        EventKind::RevisedIgnoredUpdate,
        EventKind::RevisionFail,
        EventKind::AdditModProdFail,
        EventKind::ExpDesignFail,
        EventKind::CheckPointSuccess,
        EventKind::CheckPointFail,
        EventKind::CollaboratorTimeout,
    ];

    /// Soft failures latch `error_flag`.
    pub fn is_soft_failure(self) -> bool {
        matches!(
            self,
            EventKind::RevisionFail
                | EventKind::AdditModProdFail
                | EventKind::ExpDesignFail
                | EventKind::CheckPointFail
                | EventKind::CollaboratorTimeout
        )
    }

    /// Events that bring new models into the pool.
    pub fn introduces_models(self) -> bool {
        matches!(
            self,
            EventKind::InitialModels | EventKind::RevisedModel | EventKind::AdditionalModels
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::str::FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|k| k.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown event kind: {s}"))
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::InitialModels(_) => EventKind::InitialModels,
            Event::InitialResults(_) => EventKind::InitialResults,
            Event::ChosenExperiment(_) => EventKind::ChosenExperiment,
            Event::NewResults(_) => EventKind::NewResults,
            Event::AcceptedResults(_) => EventKind::AcceptedResults,
            Event::RefutedModels(_) => EventKind::RefutedModels,
            Event::RevisedModel(_) => EventKind::RevisedModel,
            Event::RedundantModel(_) => EventKind::RedundantModel,
            Event::AdditionalModels(_) => EventKind::AdditionalModels,
            Event::AllModelsEmpiricallyEquivalent(_) => EventKind::AllModelsEmpiricallyEquivalent,
            Event::UpdatedModelQuality(_) => EventKind::UpdatedModelQuality,
            Event::RevisedIgnoredUpdate(_) => EventKind::RevisedIgnoredUpdate,
            Event::RevisionFail(_) => EventKind::RevisionFail,
            Event::AdditModProdFail(_) => EventKind::AdditModProdFail,
            Event::ExpDesignFail(_) => EventKind::ExpDesignFail,
            Event::CheckPointSuccess(_) => EventKind::CheckPointSuccess,
            Event::CheckPointFail(_) => EventKind::CheckPointFail,
            Event::CollaboratorTimeout(_) => EventKind::CollaboratorTimeout,
        }
    }

    /// Models this event introduces into the pool, if any.
    pub fn introduced_models(&self) -> &[Model] {
        match self {
            Event::InitialModels(e) => &e.models,
            Event::RevisedModel(e) => &e.revised_models,
            Event::AdditionalModels(e) => &e.models,
            _ => &[],
        }
    }

    pub fn initial_models(models: impl IntoIterator<Item = Model>) -> Self {
        Event::InitialModels(InitialModelsEvent {
            models: models.into_iter().collect(),
        })
    }

    pub fn refuted_models(models: impl IntoIterator<Item = ModelId>) -> Self {
        Event::RefutedModels(RefutedModelsEvent {
            models: models.into_iter().collect(),
        })
    }

    pub fn revised_model(old_model: ModelId, revised: impl IntoIterator<Item = Model>) -> Self {
        Event::RevisedModel(RevisedModelEvent {
            old_model,
            revised_models: revised.into_iter().collect(),
        })
    }

    pub fn additional_models(models: impl IntoIterator<Item = Model>) -> Self {
        Event::AdditionalModels(AdditionalModelsEvent {
            models: models.into_iter().collect(),
        })
    }

    pub fn new_results(experiment: Experiment) -> Self {
        Event::NewResults(NewResultsEvent { experiment })
    }

    pub fn chosen_experiment(descriptions: impl IntoIterator<Item = ExperimentDescription>) -> Self {
        Event::ChosenExperiment(ChosenExperimentEvent {
            descriptions: descriptions.into_iter().collect(),
        })
    }

    pub fn updated_quality(model: ModelId, new_quality: i64) -> Self {
        Event::UpdatedModelQuality(UpdatedModelQualityEvent { model, new_quality })
    }
}

// ============================================================================
// EVENT RECORDS
// ============================================================================

/// An event as stored in the development history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Position in the history, starting at 0.
    pub sequence: u64,
    /// Seconds since the archive was created; non-decreasing along the log.
    pub timestamp: f64,
    pub event: Event,
}

impl EventRecord {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }
}

// ============================================================================
// TESTS
// ============================================================================
