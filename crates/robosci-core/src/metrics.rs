//! Process-wide counters for discovery runs.
//!
//! Incremented by the overseer and the batch driver; [`Metrics::flush`] logs
//! them once, typically when a batch finishes.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters. Shared by every run in the process.
pub struct Metrics {
    runs_started: AtomicU64,
    runs_aborted: AtomicU64,
    checkpoints_evaluated: AtomicU64,
    collaborator_timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            runs_started: AtomicU64::new(0),
            runs_aborted: AtomicU64::new(0),
            checkpoints_evaluated: AtomicU64::new(0),
            collaborator_timeouts: AtomicU64::new(0),
        }
    }

    pub fn inc_runs_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_started", "counter incremented");
    }

    /// A run that ended on a hard error rather than a halt guard.
    pub fn inc_runs_aborted(&self) {
        self.runs_aborted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "runs_aborted", "counter incremented");
    }

    pub fn inc_checkpoints(&self) {
        self.checkpoints_evaluated.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "checkpoints_evaluated", "counter incremented");
    }

    pub fn inc_collaborator_timeouts(&self) {
        self.collaborator_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "collaborator_timeouts", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            runs_started = self.runs_started(),
            runs_aborted = self.runs_aborted(),
            checkpoints_evaluated = self.checkpoints_evaluated(),
            collaborator_timeouts = self.collaborator_timeouts(),
        );
    }

    pub fn runs_started(&self) -> u64 {
        self.runs_started.load(Ordering::Relaxed)
    }

    pub fn runs_aborted(&self) -> u64 {
        self.runs_aborted.load(Ordering::Relaxed)
    }

    pub fn checkpoints_evaluated(&self) -> u64 {
        self.checkpoints_evaluated.load(Ordering::Relaxed)
    }

    pub fn collaborator_timeouts(&self) -> u64 {
        self.collaborator_timeouts.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests only share the static through this).
    pub fn reset(&self) {
        self.runs_started.store(0, Ordering::Relaxed);
        self.runs_aborted.store(0, Ordering::Relaxed);
        self.checkpoints_evaluated.store(0, Ordering::Relaxed);
        self.collaborator_timeouts.store(0, Ordering::Relaxed);
    }
}
