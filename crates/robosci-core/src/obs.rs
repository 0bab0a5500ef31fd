//! Structured lifecycle events for discovery runs.
//!
//! Every helper logs one event with a stable `event = "..."` field so JSON
//! logs from a batch can be filtered per run suffix and per lifecycle step.

use std::time::Duration;

use robosci_archive::{CheckpointPolicyKind, Collaborator};
use serde::Serialize;
use tracing::{info, warn, Span};

use crate::schedule::{HaltReason, State, TransitionName};

/// Span tagging everything logged while a run executes.
///
/// Attach it to async work with `tracing::Instrument`.
pub fn run_span(suffix: &str) -> Span {
    tracing::info_span!("robosci.run", suffix = %suffix)
}

/// RAII guard entering [`run_span`] for synchronous sections.
pub struct RunSpan {
    _span: tracing::span::EnteredSpan,
}

impl RunSpan {
    pub fn enter(suffix: &str) -> Self {
        Self {
            _span: run_span(suffix).entered(),
        }
    }
}

/// Counters reported whenever a run ends, cleanly or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub cycles: u64,
    pub working_models: usize,
    pub elapsed: Duration,
}

pub fn emit_run_started(suffix: &str, policy: CheckpointPolicyKind, working_models: usize) {
    info!(
        event = "run.started",
        suffix = %suffix,
        policy = %policy,
        working_models = working_models,
    );
}

pub fn emit_transition(suffix: &str, transition: TransitionName, from: State, to: State) {
    tracing::debug!(
        event = "run.transition",
        suffix = %suffix,
        transition = %transition,
        from = %from,
        to = %to,
    );
}

pub fn emit_checkpoint(suffix: &str, policy: CheckpointPolicyKind, cycle: u64, passed: bool) {
    info!(
        event = "run.checkpoint",
        suffix = %suffix,
        policy = %policy,
        cycle = cycle,
        passed = passed,
    );
}

pub fn emit_collaborator_timeout(suffix: &str, collaborator: Collaborator, limit_secs: u64) {
    warn!(
        event = "run.collaborator_timeout",
        suffix = %suffix,
        collaborator = %collaborator,
        limit_secs = limit_secs,
    );
}

/// Which halt guard fired, plus the run's summary counters.
pub fn emit_run_stopped(suffix: &str, halt: HaltReason, summary: &RunSummary) {
    info!(
        event = "run.stopped",
        suffix = %suffix,
        halt = %halt,
        cycles = summary.cycles,
        working_models = summary.working_models,
        elapsed_ms = summary.elapsed.as_millis() as u64,
    );
}

pub fn emit_run_aborted(
    suffix: &str,
    state: State,
    summary: &RunSummary,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "run.aborted",
        suffix = %suffix,
        state = %state,
        cycles = summary.cycles,
        working_models = summary.working_models,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        error = %error,
    );
}
