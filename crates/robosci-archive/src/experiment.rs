//! Experiment descriptions, results and executed experiments.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::catalog::{CompartmentId, Condition};
use crate::ids::{ActivityId, EntityId, ExperimentId, ResultId};

/// What an experiment measures.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExperimentType {
    DetectionEntity {
        entity: EntityId,
    },
    LocalisationEntity {
        entity: EntityId,
        compartment: CompartmentId,
    },
    DetectionActivity {
        activity: ActivityId,
    },
    AdamTwoFactorExperiment {
        gene: EntityId,
        metabolite: EntityId,
    },
    ReconstructionActivity {
        activity: ActivityId,
    },
    ReconstructionEnzReaction {
        reaction: ActivityId,
        enzyme: EntityId,
    },
    ReconstructionTransporterRequired {
        transport_activity: ActivityId,
        transporter: EntityId,
    },
}

/// A change applied to the system before measuring.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "condition", rename_all = "snake_case")]
pub enum Intervention {
    Add(Condition),
    Remove(Condition),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExperimentDescription {
    pub experiment_type: ExperimentType,
    pub interventions: BTreeSet<Intervention>,
}

impl ExperimentDescription {
    pub fn new(experiment_type: ExperimentType) -> Self {
        Self {
            experiment_type,
            interventions: BTreeSet::new(),
        }
    }

    pub fn with_intervention(mut self, intervention: Intervention) -> Self {
        self.interventions.insert(intervention);
        self
    }
}

/// Outcome of running one experiment description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpResult {
    pub id: Option<ResultId>,
    pub exp_description: ExperimentDescription,
    pub outcome: bool,
}

impl ExpResult {
    pub fn new(exp_description: ExperimentDescription, outcome: bool) -> Self {
        Self {
            id: None,
            exp_description,
            outcome,
        }
    }
}

/// A batch of results produced together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: Option<ExperimentId>,
    pub results: Vec<ExpResult>,
}

impl Experiment {
    pub fn new(results: impl IntoIterator<Item = ExpResult>) -> Self {
        Self {
            id: None,
            results: results.into_iter().collect(),
        }
    }

    /// IDs of the results that have been assigned one.
    pub fn result_ids(&self) -> impl Iterator<Item = ResultId> + '_ {
        self.results.iter().filter_map(|r| r.id)
    }
}
