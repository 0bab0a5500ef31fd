//! The archive: append-only development history plus derived projections.
//!
//! [`Archive::record`] is the only mutation path for run state. It validates
//! the event, applies its effect to the projections, stamps it and appends it.
//! A rejected event leaves the archive untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::catalog::{
    Activity, ActivityDraft, Catalog, Compartment, ElementRef, Entity, EntityDraft,
};
use crate::error::{ArchiveError, Result};
use crate::events::{Event, EventKind, EventRecord};
use crate::experiment::{ExpResult, Experiment, ExperimentDescription};
use crate::ids::{ActivityId, EntityId, ExperimentId, IdCounters, ModelId, ResultId};
use crate::model::Model;
use crate::replay;

fn entropy_rng() -> StdRng {
    StdRng::from_entropy()
}

/// Event store and single source of truth for one simulation run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Archive {
    archive_id: Uuid,
    started_at: DateTime<Utc>,
    development_history: Vec<EventRecord>,
    /// Every model that ever entered the archive, by ID.
    models: BTreeMap<ModelId, Model>,
    working_models: BTreeSet<ModelId>,
    known_results: Vec<Experiment>,
    pending_results: Option<Experiment>,
    chosen_experiment_descriptions: Vec<ExperimentDescription>,
    catalog: Catalog,
    counters: IdCounters,
    error_flag: bool,
    revflag: bool,
    drift_count: u64,
    stagnation_streak: u64,
    #[serde(skip, default = "entropy_rng")]
    rng: StdRng,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    /// Create an empty archive whose stagnation collapses draw from entropy.
    pub fn new() -> Self {
        Self::with_rng(entropy_rng())
    }

    /// Create an empty archive with a reproducible random source.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            archive_id: Uuid::new_v4(),
            started_at: Utc::now(),
            development_history: Vec::new(),
            models: BTreeMap::new(),
            working_models: BTreeSet::new(),
            known_results: Vec::new(),
            pending_results: None,
            chosen_experiment_descriptions: Vec::new(),
            catalog: Catalog::default(),
            counters: IdCounters::default(),
            error_flag: false,
            revflag: false,
            drift_count: 0,
            stagnation_streak: 0,
            rng,
        }
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Record an event (append-only).
    ///
    /// Returns the event's sequence number.
    pub fn record(&mut self, mut event: Event) -> Result<u64> {
        self.validate(&event)?;
        self.apply(&mut event);

        let sequence = self.development_history.len() as u64;
        let timestamp = self.next_timestamp();
        debug!(seq = sequence, kind = %event.kind(), timestamp, "recorded event");

        self.development_history.push(EventRecord {
            sequence,
            timestamp,
            event,
        });
        Ok(sequence)
    }

    fn validate(&self, event: &Event) -> Result<()> {
        match event {
            Event::InitialModels(e) => fresh_models(&e.models),
            Event::AdditionalModels(e) => fresh_models(&e.models),
            Event::RevisedModel(e) => {
                self.known_model(e.old_model)?;
                fresh_models(&e.revised_models)
            }
            Event::RedundantModel(e) => self.known_model(e.base_model),
            Event::InitialResults(e) => e.experiments.iter().try_for_each(fresh_experiment),
            Event::NewResults(e) => fresh_experiment(&e.experiment),
            Event::AllModelsEmpiricallyEquivalent(e) => {
                if e.models.is_empty() {
                    return Err(ArchiveError::InvalidEvent {
                        kind: EventKind::AllModelsEmpiricallyEquivalent.to_string(),
                        reason: "no models to choose a survivor from".to_string(),
                    });
                }
                e.models.iter().try_for_each(|id| self.working_model(*id))
            }
            Event::AcceptedResults(e) => {
                if self.pending_results.as_ref() == Some(&e.experiment) {
                    Ok(())
                } else {
                    Err(ArchiveError::InvalidEvent {
                        kind: EventKind::AcceptedResults.to_string(),
                        reason: "experiment is not the pending new results".to_string(),
                    })
                }
            }
            Event::UpdatedModelQuality(e) => self.known_model(e.model),
            Event::RevisedIgnoredUpdate(e) => self.known_model(e.model),
            Event::ChosenExperiment(_)
            | Event::RefutedModels(_)
            | Event::RevisionFail(_)
            | Event::AdditModProdFail(_)
            | Event::ExpDesignFail(_)
            | Event::CheckPointSuccess(_)
            | Event::CheckPointFail(_)
            | Event::CollaboratorTimeout(_) => Ok(()),
        }
    }

    fn apply(&mut self, event: &mut Event) {
        match event {
            Event::InitialModels(e) => self.admit_models(&mut e.models),
            Event::AdditionalModels(e) => self.admit_models(&mut e.models),
            Event::RevisedModel(e) => self.admit_models(&mut e.revised_models),
            Event::InitialResults(e) => {
                for experiment in &mut e.experiments {
                    self.assign_experiment_ids(experiment);
                    self.known_results.push(experiment.clone());
                }
            }
            Event::ChosenExperiment(e) => {
                self.chosen_experiment_descriptions = e.descriptions.clone();
                self.stagnation_streak = 0;
            }
            Event::NewResults(e) => {
                self.assign_experiment_ids(&mut e.experiment);
                self.chosen_experiment_descriptions.clear();
                self.pending_results = Some(e.experiment.clone());
            }
            Event::AcceptedResults(e) => {
                self.pending_results = None;
                self.known_results.push(e.experiment.clone());
            }
            Event::RefutedModels(e) => {
                self.working_models.retain(|id| !e.models.contains(id));
            }
            Event::RedundantModel(_) => {}
            Event::AllModelsEmpiricallyEquivalent(e) => {
                let top = self.top_quality(e.models.iter().copied());
                if let Some(survivor) = top.choose(&mut self.rng).copied() {
                    self.working_models = BTreeSet::from([survivor]);
                    e.model_left = Some(survivor);
                }
                self.drift_count += 1;
                self.stagnation_streak += 1;
            }
            Event::UpdatedModelQuality(e) => {
                if let Some(model) = self.models.get_mut(&e.model) {
                    model.quality = Some(e.new_quality);
                }
            }
            Event::RevisedIgnoredUpdate(e) => {
                if let Some(model) = self.models.get_mut(&e.model) {
                    model.ignored_results = e.ignored_results.clone();
                    model.results_covered = e.results_covered.clone();
                }
            }
            Event::RevisionFail(_) | Event::AdditModProdFail(_) => {
                self.revflag = true;
                self.error_flag = true;
            }
            Event::ExpDesignFail(_) | Event::CheckPointFail(_) | Event::CollaboratorTimeout(_) => {
                self.error_flag = true;
            }
            Event::CheckPointSuccess(_) => {}
        }
    }

    fn admit_models(&mut self, models: &mut [Model]) {
        for model in models {
            let id = self.counters.next_model();
            model.id = Some(id);
            self.models.insert(id, model.clone());
            self.working_models.insert(id);
        }
    }

    fn assign_experiment_ids(&mut self, experiment: &mut Experiment) {
        if experiment.id.is_none() {
            experiment.id = Some(self.counters.next_experiment());
        }
        for result in &mut experiment.results {
            if result.id.is_none() {
                result.id = Some(self.counters.next_result());
            }
        }
    }

    fn known_model(&self, id: ModelId) -> Result<()> {
        if self.models.contains_key(&id) {
            Ok(())
        } else {
            Err(ArchiveError::UnknownModel(id.to_string()))
        }
    }

    fn working_model(&self, id: ModelId) -> Result<()> {
        if self.working_models.contains(&id) {
            Ok(())
        } else {
            Err(ArchiveError::InvalidEvent {
                kind: EventKind::AllModelsEmpiricallyEquivalent.to_string(),
                reason: format!("{id} is not a working model"),
            })
        }
    }

    /// IDs among `candidates` sharing the maximum quality, in ID order.
    fn top_quality(&self, candidates: impl Iterator<Item = ModelId>) -> Vec<ModelId> {
        let scored: Vec<(ModelId, Option<i64>)> = candidates
            .filter_map(|id| self.models.get(&id).map(|m| (id, m.quality)))
            .collect();
        let Some(best) = scored.iter().map(|(_, q)| *q).max() else {
            return Vec::new();
        };
        scored
            .into_iter()
            .filter(|(_, q)| *q == best)
            .map(|(id, _)| id)
            .collect()
    }

    fn next_timestamp(&self) -> f64 {
        let now = self.elapsed().as_secs_f64();
        match self.development_history.last() {
            Some(last) if last.timestamp > now => last.timestamp,
            _ => now,
        }
    }

    // ------------------------------------------------------------------
    // ID allocation
    // ------------------------------------------------------------------

    pub fn get_new_model_id(&mut self) -> ModelId {
        self.counters.next_model()
    }

    pub fn get_new_exp_id(&mut self) -> ExperimentId {
        self.counters.next_experiment()
    }

    pub fn get_new_res_id(&mut self) -> ResultId {
        self.counters.next_result()
    }

    pub fn get_new_ent_id(&mut self) -> EntityId {
        self.counters.next_entity()
    }

    pub fn get_new_act_id(&mut self) -> ActivityId {
        self.counters.next_activity()
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    pub fn add_compartment(&mut self, compartment: Compartment) {
        self.catalog.compartments.push(compartment);
    }

    pub fn register_entity(&mut self, draft: EntityDraft) -> EntityId {
        let id = self.get_new_ent_id();
        self.catalog.entities.push(Entity {
            id,
            name: draft.name,
            version: draft.version,
            kind: draft.kind,
            properties: draft.properties,
        });
        id
    }

    /// Add another version of an already registered entity.
    pub fn register_entity_version(&mut self, id: EntityId, draft: EntityDraft) -> Result<()> {
        if !self.catalog.entities.iter().any(|e| e.id == id) {
            return Err(ArchiveError::UnknownEntity(id.to_string()));
        }
        self.catalog.entities.push(Entity {
            id,
            name: draft.name,
            version: draft.version,
            kind: draft.kind,
            properties: draft.properties,
        });
        Ok(())
    }

    pub fn register_activity(&mut self, draft: ActivityDraft) -> ActivityId {
        let id = self.get_new_act_id();
        self.catalog.activities.push(Activity {
            id,
            name: draft.name,
            kind: draft.kind,
            inputs: draft.inputs,
            outputs: draft.outputs,
        });
        id
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Map an element ID from solver output back to the catalog.
    pub fn get_matching_element(&self, id: &str, version: Option<&str>) -> Result<ElementRef<'_>> {
        self.catalog.matching_element(id, version)
    }

    /// Map a result ID from solver output back to a known result.
    pub fn get_matching_result(&self, id: &str) -> Result<&ExpResult> {
        let result_id: ResultId = id.parse()?;
        self.known_results
            .iter()
            .flat_map(|exp| exp.results.iter())
            .find(|r| r.id == Some(result_id))
            .ok_or_else(|| ArchiveError::ResultNotFound(id.to_string()))
    }

    // ------------------------------------------------------------------
    // Provenance queries
    // ------------------------------------------------------------------

    /// First event that introduced `model` into the pool.
    pub fn get_model_origin_event(&self, model: ModelId) -> Result<&EventRecord> {
        self.development_history
            .iter()
            .find(|record| {
                record
                    .event
                    .introduced_models()
                    .iter()
                    .any(|m| m.id == Some(model))
            })
            .ok_or_else(|| ArchiveError::OriginNotFound(model.to_string()))
    }

    /// Events recorded strictly after the event with sequence `sequence`.
    pub fn get_events_after_event(&self, sequence: u64) -> Result<&[EventRecord]> {
        let index = usize::try_from(sequence)
            .ok()
            .filter(|i| *i < self.development_history.len())
            .ok_or(ArchiveError::EventNotFound(sequence))?;
        Ok(&self.development_history[index + 1..])
    }

    /// Results of every NewResults event recorded after `model` entered the
    /// pool.
    pub fn get_results_after_model(&self, model: ModelId) -> Result<Vec<&ExpResult>> {
        let origin = self.get_model_origin_event(model)?;
        let after = self.get_events_after_event(origin.sequence)?;
        Ok(after
            .iter()
            .filter_map(|record| match &record.event {
                Event::NewResults(e) => Some(e.experiment.results.iter()),
                _ => None,
            })
            .flatten()
            .collect())
    }

    // ------------------------------------------------------------------
    // Projections
    // ------------------------------------------------------------------

    pub fn archive_id(&self) -> Uuid {
        self.archive_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Wall-clock time since the archive was created.
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.started_at).to_std().unwrap_or_default()
    }

    pub fn development_history(&self) -> &[EventRecord] {
        &self.development_history
    }

    pub fn last_event(&self) -> Option<&EventRecord> {
        self.development_history.last()
    }

    pub fn working_model_ids(&self) -> &BTreeSet<ModelId> {
        &self.working_models
    }

    pub fn working_models(&self) -> impl Iterator<Item = &Model> + '_ {
        self.working_models.iter().filter_map(|id| self.models.get(id))
    }

    pub fn working_model_count(&self) -> usize {
        self.working_models.len()
    }

    /// Any model that ever entered the archive, refuted or not.
    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(&id)
    }

    pub fn models_introduced(&self) -> usize {
        self.models.len()
    }

    /// Working models sharing the maximum quality.
    pub fn best_models(&self) -> BTreeSet<ModelId> {
        self.top_quality(self.working_models.iter().copied())
            .into_iter()
            .collect()
    }

    pub fn known_results(&self) -> &[Experiment] {
        &self.known_results
    }

    pub fn pending_results(&self) -> Option<&Experiment> {
        self.pending_results.as_ref()
    }

    pub fn chosen_experiment_descriptions(&self) -> &[ExperimentDescription] {
        &self.chosen_experiment_descriptions
    }

    pub fn error_flag(&self) -> bool {
        self.error_flag
    }

    pub fn revflag(&self) -> bool {
        self.revflag
    }

    pub fn drift_count(&self) -> u64 {
        self.drift_count
    }

    pub fn stagnation_streak(&self) -> u64 {
        self.stagnation_streak
    }

    /// Kind of the most recent soft-failure event.
    pub fn last_failure(&self) -> Option<EventKind> {
        self.development_history
            .iter()
            .rev()
            .map(EventRecord::kind)
            .find(|kind| kind.is_soft_failure())
    }

    /// Working set as it stood after the first `prefix` events.
    pub fn working_models_at(&self, prefix: usize) -> BTreeSet<ModelId> {
        let end = prefix.min(self.development_history.len());
        replay::replay_working_models(&self.development_history[..end])
    }

    /// Whether replaying the whole history reproduces the working set.
    pub fn verify_replay(&self) -> bool {
        self.working_models_at(self.development_history.len()) == self.working_models
    }
}

fn fresh_models(models: &[Model]) -> Result<()> {
    match models.iter().find_map(|m| m.id) {
        Some(id) => Err(ArchiveError::IdAlreadyAssigned {
            record: "model",
            id: id.to_string(),
        }),
        None => Ok(()),
    }
}

fn fresh_experiment(experiment: &Experiment) -> Result<()> {
    if let Some(id) = experiment.id {
        return Err(ArchiveError::IdAlreadyAssigned {
            record: "experiment",
            id: id.to_string(),
        });
    }
    match experiment.results.iter().find_map(|r| r.id) {
        Some(id) => Err(ArchiveError::IdAlreadyAssigned {
            record: "result",
            id: id.to_string(),
        }),
        None => Ok(()),
    }
}
