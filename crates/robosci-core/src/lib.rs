//! RoboSci Core
//!
//! The overseer that drives an automated-discovery run over a
//! [`robosci_archive::Archive`]:
//! - ports: revision, experiment design, oracle and quality collaborators
//! - schedule: states, the guarded transition table and halt guards
//! - checkpoint: ignoring / no-ignoring stagnation tests
//! - overseer: the run loop, collaborator timeouts and the persisted stop
//! - quality: coverage-based quality strategies
//! - batch: bounded-concurrency execution of many independent runs

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod overseer;
pub mod ports;
pub mod quality;
pub mod schedule;
pub mod telemetry;

pub use batch::{BatchDriver, BatchReport, RunFactory, RunSpec};
pub use checkpoint::{CheckpointPolicy, IgnoringState};
pub use config::{BatchConfig, RunConfig};
pub use error::{ConfigError, OverseerError, Result, ScheduleError};
pub use metrics::METRICS;
pub use obs::{RunSpan, RunSummary};
pub use overseer::{Overseer, RunOutcome};
pub use ports::{Collaborators, ExperimentDesign, Oracle, QualityModule, RevisionModule};
pub use quality::{CoverageMeasure, CoverageQuality};
pub use schedule::{
    halt_reason, next_transition, GuardInputs, HaltInputs, HaltReason, State, Transition,
    TransitionName, SCHEDULING_RULES, TRANSITIONS,
};
pub use telemetry::init_tracing;
