//! Candidate models of the system under study.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::catalog::Condition;
use crate::ids::{ActivityId, ModelId, ResultId};

/// A candidate structural hypothesis.
///
/// Equality and hashing are structural: two models are the same hypothesis
/// when their setup, intermediate and termination sets match, whatever their
/// IDs, qualities or coverage bookkeeping say. Redundancy detection relies on
/// this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Assigned by the archive when the model enters it; `None` before that.
    pub id: Option<ModelId>,
    pub setup_conditions: BTreeSet<Condition>,
    pub intermediate_activities: BTreeSet<ActivityId>,
    pub termination_conditions: BTreeSet<Condition>,
    /// `None` until a quality collaborator scores the model. Unscored models
    /// rank below every scored one.
    pub quality: Option<i64>,
    pub ignored_results: BTreeSet<ResultId>,
    pub results_covered: BTreeSet<ResultId>,
}

impl Model {
    pub fn new(
        setup_conditions: impl IntoIterator<Item = Condition>,
        intermediate_activities: impl IntoIterator<Item = ActivityId>,
        termination_conditions: impl IntoIterator<Item = Condition>,
    ) -> Self {
        Self {
            id: None,
            setup_conditions: setup_conditions.into_iter().collect(),
            intermediate_activities: intermediate_activities.into_iter().collect(),
            termination_conditions: termination_conditions.into_iter().collect(),
            quality: None,
            ignored_results: BTreeSet::new(),
            results_covered: BTreeSet::new(),
        }
    }

    /// Structural copy without identity or scores, ready to be revised and
    /// recorded as a new model.
    pub fn derive(&self) -> Self {
        Self::new(
            self.setup_conditions.iter().cloned(),
            self.intermediate_activities.iter().copied(),
            self.termination_conditions.iter().cloned(),
        )
    }

    pub fn with_quality(mut self, quality: i64) -> Self {
        self.quality = Some(quality);
        self
    }

    /// The ID, for models already in an archive.
    pub fn assigned_id(&self) -> Option<ModelId> {
        self.id
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        self.setup_conditions == other.setup_conditions
            && self.intermediate_activities == other.intermediate_activities
            && self.termination_conditions == other.termination_conditions
    }
}

impl Eq for Model {}

impl Hash for Model {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.setup_conditions.hash(state);
        self.intermediate_activities.hash(state);
        self.termination_conditions.hash(state);
    }
}
