//! Coverage-based model quality.
//!
//! Scores count the results a model explains, optionally only those obtained
//! after the model entered the pool, optionally minus the results it had to
//! ignore. Signed scores are shifted so the worst working model gets 1.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use robosci_archive::{Archive, Event, Model, ModelId, ResultId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ports::QualityModule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoverageMeasure {
    AllCovered,
    AllCoveredMinusIgnored,
    NewCovered,
    NewCoveredMinusIgnored,
    /// Every model scores the same.
    Uniform,
}

impl CoverageMeasure {
    fn counts_ignored(self) -> bool {
        matches!(
            self,
            CoverageMeasure::AllCoveredMinusIgnored | CoverageMeasure::NewCoveredMinusIgnored
        )
    }

    fn new_results_only(self) -> bool {
        matches!(
            self,
            CoverageMeasure::NewCovered | CoverageMeasure::NewCoveredMinusIgnored
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageQuality {
    measure: CoverageMeasure,
}

impl CoverageQuality {
    pub fn new(measure: CoverageMeasure) -> Self {
        Self { measure }
    }

    pub fn measure(&self) -> CoverageMeasure {
        self.measure
    }

    /// Raw score of one model, before normalisation.
    pub fn score(&self, archive: &Archive, model: &Model) -> robosci_archive::Result<i64> {
        if self.measure == CoverageMeasure::Uniform {
            return Ok(1);
        }

        let covered = if self.measure.new_results_only() {
            let Some(id) = model.id else {
                return Ok(0);
            };
            let new_results: BTreeSet<ResultId> = archive
                .get_results_after_model(id)?
                .iter()
                .filter_map(|r| r.id)
                .collect();
            new_results.intersection(&model.results_covered).count()
        } else {
            model.results_covered.len()
        };

        let mut score = covered as i64;
        if self.measure.counts_ignored() {
            score -= model.ignored_results.len() as i64;
        }
        Ok(score)
    }

    /// Normalised quality for every working model.
    pub fn qualities(&self, archive: &Archive) -> robosci_archive::Result<BTreeMap<ModelId, i64>> {
        let mut scores = BTreeMap::new();
        for model in archive.working_models() {
            if let Some(id) = model.id {
                scores.insert(id, self.score(archive, model)?);
            }
        }

        if self.measure.counts_ignored() {
            if let Some(smallest) = scores.values().copied().min() {
                if smallest < 1 {
                    let shift = smallest.abs() + 1;
                    for score in scores.values_mut() {
                        *score += shift;
                    }
                }
            }
        }
        Ok(scores)
    }
}

#[async_trait]
impl QualityModule for CoverageQuality {
    async fn check_and_update_qualities(&mut self, archive: &mut Archive) -> anyhow::Result<()> {
        let qualities = self.qualities(archive)?;
        let mut updated = 0usize;
        for (id, quality) in qualities {
            let current = archive.model(id).and_then(|m| m.quality);
            if current != Some(quality) {
                archive.record(Event::updated_quality(id, quality))?;
                updated += 1;
            }
        }
        debug!(measure = ?self.measure, updated, "model qualities checked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robosci_archive::{
        CompartmentId, Condition, EntityId, ExpResult, Experiment, ExperimentDescription,
        ExperimentType, RevisedIgnoredUpdateEvent,
    };

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

    fn result(entity: u64) -> ExpResult {
        ExpResult::new(
            ExperimentDescription::new(ExperimentType::DetectionEntity {
                entity: EntityId(entity),
            }),
            true,
        )
    }

    fn coverage(archive: &mut Archive, model: u64, covered: &[u64], ignored: &[u64]) {
        archive
            .record(Event::RevisedIgnoredUpdate(RevisedIgnoredUpdateEvent {
                model: ModelId(model),
                results_covered: covered.iter().map(|r| ResultId(*r)).collect(),
                ignored_results: ignored.iter().map(|r| ResultId(*r)).collect(),
            }))
            .unwrap();
    }

    /// m_0 and m_1 exist before res_0; m_2 arrives before res_1 and res_2.
    fn archive() -> Archive {
        let mut archive = Archive::with_seed(0);
        archive
            .record(Event::initial_models([model(0), model(1)]))
            .unwrap();
        archive
            .record(Event::new_results(Experiment::new([result(0)])))
            .unwrap();
        archive.record(Event::additional_models([model(2)])).unwrap();
        archive
            .record(Event::new_results(Experiment::new([result(1), result(2)])))
            .unwrap();
        coverage(&mut archive, 0, &[0, 1, 2], &[]);
        coverage(&mut archive, 1, &[0], &[1, 2]);
        coverage(&mut archive, 2, &[0, 1], &[2]);
        archive
    }

    #[test]
    fn test_all_covered_counts_everything() {
        let q = CoverageQuality::new(CoverageMeasure::AllCovered)
            .qualities(&archive())
            .unwrap();
        assert_eq!(q[&ModelId(0)], 3);
        assert_eq!(q[&ModelId(1)], 1);
        assert_eq!(q[&ModelId(2)], 2);
    }

    #[test]
    fn test_new_covered_skips_results_older_than_the_model() {
        let q = CoverageQuality::new(CoverageMeasure::NewCovered)
            .qualities(&archive())
            .unwrap();
        assert_eq!(q[&ModelId(0)], 3);
        assert_eq!(q[&ModelId(1)], 1);
        assert_eq!(q[&ModelId(2)], 1);
    }

    #[test]
    fn test_minus_ignored_is_shifted_to_start_at_one() {
        // Raw scores 3, -1, 1; shift by |-1| + 1.
        let q = CoverageQuality::new(CoverageMeasure::AllCoveredMinusIgnored)
            .qualities(&archive())
            .unwrap();
        assert_eq!(q[&ModelId(0)], 5);
        assert_eq!(q[&ModelId(1)], 1);
        assert_eq!(q[&ModelId(2)], 3);
    }

    #[test]
    fn test_positive_scores_are_not_shifted() {
        let mut archive = archive();
        coverage(&mut archive, 1, &[0, 1], &[]);
        coverage(&mut archive, 2, &[0, 1, 2], &[]);
        let q = CoverageQuality::new(CoverageMeasure::AllCoveredMinusIgnored)
            .qualities(&archive)
            .unwrap();
        assert_eq!(q[&ModelId(0)], 3);
        assert_eq!(q[&ModelId(1)], 2);
        assert_eq!(q[&ModelId(2)], 3);
    }

    #[tokio::test]
    async fn test_only_changed_qualities_are_recorded() {
        let mut archive = archive();
        let mut quality = CoverageQuality::new(CoverageMeasure::Uniform);

        let before = archive.development_history().len();
        quality.check_and_update_qualities(&mut archive).await.unwrap();
        assert_eq!(archive.development_history().len(), before + 3);

        quality.check_and_update_qualities(&mut archive).await.unwrap();
        assert_eq!(archive.development_history().len(), before + 3);
        assert_eq!(archive.best_models().len(), 3);
    }
}
