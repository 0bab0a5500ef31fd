//! Stagnation tests run at every checkpoint.

use std::collections::BTreeSet;

use robosci_archive::{Archive, CheckpointPolicyKind, Event, ModelId};

/// Counters carried between checks by the ignoring policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoringState {
    stop_threshold: u64,
    cycles_since_last_new_model: u64,
    cycles_since_best_model_changed: u64,
    best_models: BTreeSet<ModelId>,
}

impl IgnoringState {
    pub fn new(stop_threshold: u64, best_models: BTreeSet<ModelId>) -> Self {
        Self {
            stop_threshold,
            cycles_since_last_new_model: 0,
            cycles_since_best_model_changed: 0,
            best_models,
        }
    }

    pub fn cycles_since_last_new_model(&self) -> u64 {
        self.cycles_since_last_new_model
    }

    pub fn cycles_since_best_model_changed(&self) -> u64 {
        self.cycles_since_best_model_changed
    }

    fn evaluate(&mut self, archive: &Archive) -> bool {
        // Walk back to the previous checkpoint; any model introduced since
        // then resets the counter.
        let mut new_model_seen = false;
        for record in archive.development_history().iter().rev() {
            match record.event {
                Event::RevisedModel(_) | Event::AdditionalModels(_) => {
                    new_model_seen = true;
                    break;
                }
                Event::CheckPointSuccess(_) => break,
                _ => {}
            }
        }
        if new_model_seen {
            self.cycles_since_last_new_model = 0;
        } else {
            self.cycles_since_last_new_model += 1;
        }

        let best = archive.best_models();
        if best == self.best_models {
            self.cycles_since_best_model_changed += 1;
        } else {
            self.cycles_since_best_model_changed = 0;
            self.best_models = best;
        }

        let stagnated = self.cycles_since_last_new_model >= self.stop_threshold
            && self.cycles_since_best_model_changed >= self.stop_threshold;
        !stagnated
    }
}

/// Checkpoint policy, fixed for the lifetime of an overseer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// Fails once neither new models nor a new best model have appeared for
    /// `stop_threshold` checks.
    Ignoring(IgnoringState),
    /// Fails once at most one working model is left.
    NoIgnoring,
}

impl CheckpointPolicy {
    /// Ignoring policy when revision may ignore results, pool-size test
    /// otherwise. The ignoring policy starts from the current best set.
    pub fn for_revision(ignores_results: bool, stop_threshold: u64, archive: &Archive) -> Self {
        if ignores_results {
            CheckpointPolicy::Ignoring(IgnoringState::new(stop_threshold, archive.best_models()))
        } else {
            CheckpointPolicy::NoIgnoring
        }
    }

    pub fn kind(&self) -> CheckpointPolicyKind {
        match self {
            CheckpointPolicy::Ignoring(_) => CheckpointPolicyKind::Ignoring,
            CheckpointPolicy::NoIgnoring => CheckpointPolicyKind::NoIgnoring,
        }
    }

    /// Returns `true` when development may continue.
    pub fn evaluate(&mut self, archive: &Archive) -> bool {
        match self {
            CheckpointPolicy::Ignoring(state) => state.evaluate(archive),
            CheckpointPolicy::NoIgnoring => archive.working_model_count() > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robosci_archive::{CheckPointEvent, CompartmentId, Condition, EntityId, Model};

    fn model(entity: u64) -> Model {
        Model::new(
            [Condition::Present {
                entity: EntityId(entity),
                compartment: CompartmentId("c_01".to_string()),
            }],
            [],
            [],
        )
    }

    fn success(archive: &mut Archive) {
        archive
            .record(Event::CheckPointSuccess(CheckPointEvent {
                policy: CheckpointPolicyKind::Ignoring,
                cycle: 0,
            }))
            .unwrap();
    }

    #[test]
    fn test_new_models_reset_the_stagnation_counter() {
        let mut archive = Archive::with_seed(0);
        archive
            .record(Event::initial_models([model(0), model(1)]))
            .unwrap();
        let mut policy = CheckpointPolicy::for_revision(true, 2, &archive);

        assert!(policy.evaluate(&archive));
        success(&mut archive);
        archive.record(Event::additional_models([model(2)])).unwrap();
        assert!(policy.evaluate(&archive));

        match &policy {
            CheckpointPolicy::Ignoring(state) => {
                assert_eq!(state.cycles_since_last_new_model(), 0);
                // The unscored newcomer joins the tied best set.
                assert_eq!(state.cycles_since_best_model_changed(), 0);
            }
            CheckpointPolicy::NoIgnoring => unreachable!(),
        }
    }

    #[test]
    fn test_changed_best_set_keeps_the_run_alive() {
        let mut archive = Archive::with_seed(0);
        archive
            .record(Event::initial_models([model(0), model(1)]))
            .unwrap();
        let mut policy = CheckpointPolicy::for_revision(true, 2, &archive);

        assert!(policy.evaluate(&archive));
        success(&mut archive);
        archive.record(Event::updated_quality(ModelId(1), 3)).unwrap();
        assert!(policy.evaluate(&archive));
        success(&mut archive);
        // From here on the best set stays {m_1} and no models arrive.
        assert!(policy.evaluate(&archive));
        success(&mut archive);
        assert!(!policy.evaluate(&archive));
    }

    #[test]
    fn test_no_ignoring_tracks_pool_size() {
        let mut archive = Archive::with_seed(0);
        archive.record(Event::initial_models([model(0)])).unwrap();
        let mut policy = CheckpointPolicy::for_revision(false, 2, &archive);
        assert_eq!(policy.kind(), CheckpointPolicyKind::NoIgnoring);
        assert!(!policy.evaluate(&archive));

        archive.record(Event::additional_models([model(1)])).unwrap();
        assert!(policy.evaluate(&archive));
    }
}
