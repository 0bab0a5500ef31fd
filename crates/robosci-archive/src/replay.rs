//! Replay of the development history.
//!
//! The working-model set is a pure function of the event log. This module
//! rebuilds it from a log prefix and summarises a stored archive so the CLI
//! and the tests can check a persisted run without re-running it.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::archive::Archive;
use crate::events::{Event, EventKind, EventRecord};
use crate::ids::ModelId;

/// Rebuild the working-model set from a slice of the history.
pub fn replay_working_models(history: &[EventRecord]) -> BTreeSet<ModelId> {
    let mut working = BTreeSet::new();
    for record in history {
        match &record.event {
            Event::InitialModels(_) | Event::RevisedModel(_) | Event::AdditionalModels(_) => {
                working.extend(record.event.introduced_models().iter().filter_map(|m| m.id));
            }
            Event::RefutedModels(e) => {
                working.retain(|id| !e.models.contains(id));
            }
            Event::AllModelsEmpiricallyEquivalent(e) => {
                if let Some(left) = e.model_left {
                    working = BTreeSet::from([left]);
                }
            }
            _ => {}
        }
    }
    working
}

/// Aggregate view of an archive, as printed by `robosci inspect`.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveSummary {
    pub archive_id: String,
    pub events: usize,
    pub last_timestamp: f64,
    /// Completed cycles, counted as successful checkpoints.
    pub checkpoints_passed: usize,
    pub models_introduced: usize,
    pub working_models: Vec<String>,
    pub best_models: Vec<String>,
    pub known_experiments: usize,
    pub known_results: usize,
    pub pending_results: bool,
    pub error_flag: bool,
    pub revflag: bool,
    pub drift_count: u64,
    pub last_failure: Option<String>,
    pub events_by_kind: BTreeMap<String, usize>,
}

pub fn summarize(archive: &Archive) -> ArchiveSummary {
    let history = archive.development_history();

    let mut events_by_kind = BTreeMap::new();
    for record in history {
        *events_by_kind.entry(record.kind().to_string()).or_insert(0) += 1;
    }

    ArchiveSummary {
        archive_id: archive.archive_id().to_string(),
        events: history.len(),
        last_timestamp: history.last().map(|r| r.timestamp).unwrap_or(0.0),
        checkpoints_passed: history
            .iter()
            .filter(|r| r.kind() == EventKind::CheckPointSuccess)
            .count(),
        models_introduced: archive.models_introduced(),
        working_models: archive
            .working_model_ids()
            .iter()
            .map(ToString::to_string)
            .collect(),
        best_models: archive.best_models().iter().map(ToString::to_string).collect(),
        known_experiments: archive.known_results().len(),
        known_results: archive
            .known_results()
            .iter()
            .map(|exp| exp.results.len())
            .sum(),
        pending_results: archive.pending_results().is_some(),
        error_flag: archive.error_flag(),
        revflag: archive.revflag(),
        drift_count: archive.drift_count(),
        last_failure: archive.last_failure().map(|k| k.to_string()),
        events_by_kind,
    }
}

/// Structural checks over a stored history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    /// Replayed working set equals the stored projection.
    pub working_set_matches: bool,
    /// Sequence numbers run 0, 1, 2, ... without gaps.
    pub sequences_contiguous: bool,
    /// Timestamps never decrease along the log.
    pub timestamps_monotonic: bool,
    /// Model IDs introduced more than once.
    pub duplicate_model_ids: Vec<String>,
}

impl ReplayReport {
    pub fn is_consistent(&self) -> bool {
        self.working_set_matches
            && self.sequences_contiguous
            && self.timestamps_monotonic
            && self.duplicate_model_ids.is_empty()
    }
}

pub fn verify(archive: &Archive) -> ReplayReport {
    let history = archive.development_history();

    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for model in history.iter().flat_map(|r| r.event.introduced_models()) {
        if let Some(id) = model.id {
            if !seen.insert(id) {
                duplicates.insert(id);
            }
        }
    }

    ReplayReport {
        working_set_matches: archive.verify_replay(),
        sequences_contiguous: history
            .iter()
            .enumerate()
            .all(|(i, r)| r.sequence == i as u64),
        timestamps_monotonic: history
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp),
        duplicate_model_ids: duplicates.iter().map(ToString::to_string).collect(),
    }
}
