//! The overseer: drives one discovery run over its archive.
//!
//! Each loop iteration checks the halt guards, picks the next transition
//! from the schedule, runs the transition's delegate and moves to the
//! transition's destination. Collaborator calls are the only suspension
//! points and each runs under the configured timeout.

use std::future::Future;
use std::time::Duration;

use robosci_archive::{
    save_archive, AcceptedResultsEvent, Archive, CheckPointEvent, CheckpointPolicyKind,
    Collaborator, CollaboratorTimeoutEvent, Event, EventRecord, PersistedArchive,
};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};

use crate::checkpoint::CheckpointPolicy;
use crate::config::RunConfig;
use crate::error::{OverseerError, Result};
use crate::metrics::METRICS;
use crate::obs::{self, RunSummary};
use crate::ports::Collaborators;
use crate::schedule::{
    forced_stop, halt_reason, next_transition, GuardInputs, HaltInputs, HaltReason, State,
    Transition, TransitionName,
};

/// How a run ended.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub halt: HaltReason,
    /// Successful checkpoints.
    pub cycles: u64,
    pub working_models: usize,
    pub events: usize,
    pub elapsed: Duration,
    #[serde(skip)]
    pub persisted: PersistedArchive,
}

/// Await `fut`, giving up after `limit` when one is set.
async fn within<F: Future>(limit: Option<Duration>, fut: F) -> Option<F::Output> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.ok(),
        None => Some(fut.await),
    }
}

pub struct Overseer {
    archive: Archive,
    collaborators: Collaborators,
    config: RunConfig,
    state: State,
    policy: CheckpointPolicy,
    cycles_counter: u64,
    suffix: String,
    started: Instant,
    persisted: Option<PersistedArchive>,
}

impl Overseer {
    /// Wire an overseer around an archive that already holds the initial
    /// models and results. The checkpoint policy is fixed here.
    pub fn new(
        archive: Archive,
        collaborators: Collaborators,
        config: RunConfig,
        suffix: impl Into<String>,
    ) -> Self {
        let policy = CheckpointPolicy::for_revision(
            collaborators.revision.ignores_results(),
            config.stop_threshold,
            &archive,
        );
        Self {
            archive,
            collaborators,
            config,
            state: State::Start,
            policy,
            cycles_counter: 0,
            suffix: suffix.into(),
            started: Instant::now(),
            persisted: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn cycles(&self) -> u64 {
        self.cycles_counter
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn policy(&self) -> &CheckpointPolicy {
        &self.policy
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Where the archive was written by the stop, once stopped.
    pub fn persisted(&self) -> Option<&PersistedArchive> {
        self.persisted.as_ref()
    }

    /// Cycle count, working set size and time spent so far.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            cycles: self.cycles_counter,
            working_models: self.archive.working_model_count(),
            elapsed: self.started.elapsed(),
        }
    }

    pub fn into_archive(self) -> Archive {
        self.archive
    }

    /// Drive the run until a halt guard fires.
    ///
    /// The archive is persisted on every exit. A hard error still forces the
    /// persisted stop and is then returned unchanged.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        if self.state.is_terminal() {
            return Err(OverseerError::AlreadyStopped);
        }
        self.config.validate()?;

        METRICS.inc_runs_started();
        obs::emit_run_started(
            &self.suffix,
            self.policy.kind(),
            self.archive.working_model_count(),
        );

        let span = obs::run_span(&self.suffix);
        let driven = self.drive().instrument(span).await;
        match driven {
            Ok(halt) => {
                let persisted = self.stop_development()?;
                let summary = self.summary();
                obs::emit_run_stopped(&self.suffix, halt, &summary);
                Ok(RunOutcome {
                    halt,
                    cycles: summary.cycles,
                    working_models: summary.working_models,
                    events: self.archive.development_history().len(),
                    elapsed: summary.elapsed,
                    persisted,
                })
            }
            Err(err) => {
                METRICS.inc_runs_aborted();
                obs::emit_run_aborted(&self.suffix, self.state, &self.summary(), &err);
                if let Err(persist_err) = self.stop_development() {
                    warn!(suffix = %self.suffix, error = %persist_err, "failed to persist aborted run");
                }
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<HaltReason> {
        loop {
            if let Some(halt) = halt_reason(&self.halt_inputs()) {
                return Ok(halt);
            }

            let transition = next_transition(&self.guard_inputs())?;
            if transition.name == TransitionName::StopDevelopment {
                return Ok(HaltReason::Scheduled);
            }

            self.execute(transition).await?;
            obs::emit_transition(&self.suffix, transition.name, transition.src, transition.dst);
            self.state = transition.dst;
        }
    }

    fn halt_inputs(&self) -> HaltInputs {
        HaltInputs {
            error_flag: self.archive.error_flag(),
            last_failure: self.archive.last_failure(),
            cycles: self.cycles_counter,
            max_cycles: self.config.max_cycles,
            elapsed: self.started.elapsed(),
            max_time: self.config.max_time(),
        }
    }

    fn guard_inputs(&self) -> GuardInputs {
        GuardInputs {
            state: self.state,
            working_models: self.archive.working_model_count(),
            threshold_additional_models: self.config.threshold_additional_models,
            revflag: self.archive.revflag(),
        }
    }

    async fn execute(&mut self, transition: &Transition) -> Result<()> {
        let limit = self.config.collaborator_timeout();
        match transition.name {
            TransitionName::StartDevelopment => {
                debug!(
                    suffix = %self.suffix,
                    working_models = self.archive.working_model_count(),
                    "development started"
                );
                Ok(())
            }
            TransitionName::TestAndReviseModels => {
                let outcome = within(
                    limit,
                    self.collaborators
                        .revision
                        .test_and_revise_all(&mut self.archive),
                )
                .await;
                self.settle(Collaborator::Revision, outcome)
            }
            TransitionName::RecalculateModelsQuality => {
                let outcome = within(
                    limit,
                    self.collaborators
                        .quality
                        .check_and_update_qualities(&mut self.archive),
                )
                .await;
                self.settle(Collaborator::Quality, outcome)
            }
            TransitionName::ProduceAdditionalModels => {
                let outcome = within(
                    limit,
                    self.collaborators
                        .revision
                        .produce_additional_models(&mut self.archive),
                )
                .await;
                self.settle(Collaborator::Revision, outcome)
            }
            TransitionName::DoCheck => self.do_check().map(|_| ()),
            TransitionName::GetExperiment => {
                let outcome = within(
                    limit,
                    self.collaborators.design.get_experiment(&mut self.archive),
                )
                .await;
                self.settle(Collaborator::ExperimentDesign, outcome)
            }
            TransitionName::ExecuteExperiment => {
                let outcome = within(
                    limit,
                    self.collaborators.oracle.execute_exps(&mut self.archive),
                )
                .await;
                self.settle(Collaborator::Oracle, outcome)
            }
            TransitionName::RecordResult => self.record_result(),
            // `drive` stops before executing this edge.
            TransitionName::StopDevelopment => Ok(()),
        }
    }

    /// Turn a collaborator call outcome into events or a hard error.
    /// `None` means the call timed out.
    fn settle(
        &mut self,
        collaborator: Collaborator,
        outcome: Option<anyhow::Result<()>>,
    ) -> Result<()> {
        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(source)) => Err(OverseerError::Collaborator {
                collaborator,
                source,
            }),
            None => {
                let limit_secs = self.config.collaborator_timeout_secs;
                METRICS.inc_collaborator_timeouts();
                obs::emit_collaborator_timeout(&self.suffix, collaborator, limit_secs);
                self.archive
                    .record(Event::CollaboratorTimeout(CollaboratorTimeoutEvent {
                        collaborator,
                        limit_secs,
                    }))?;
                Ok(())
            }
        }
    }

    /// Run the checkpoint policy and record its verdict.
    ///
    /// Returns whether the checkpoint passed. A pass completes a cycle.
    pub fn do_check(&mut self) -> Result<bool> {
        METRICS.inc_checkpoints();
        let passed = self.policy.evaluate(&self.archive);
        let policy: CheckpointPolicyKind = self.policy.kind();
        let event = CheckPointEvent {
            policy,
            cycle: self.cycles_counter,
        };

        if passed {
            self.archive.record(Event::CheckPointSuccess(event))?;
            self.cycles_counter += 1;
        } else {
            self.archive.record(Event::CheckPointFail(event))?;
        }
        obs::emit_checkpoint(&self.suffix, policy, self.cycles_counter, passed);
        Ok(passed)
    }

    /// Accept the results staged by the last NewResults event.
    pub fn record_result(&mut self) -> Result<()> {
        let experiment = match self.archive.last_event() {
            Some(EventRecord {
                event: Event::NewResults(e),
                ..
            }) => e.experiment.clone(),
            other => {
                return Err(OverseerError::ResultNotPending {
                    last: other.map(EventRecord::kind),
                })
            }
        };
        self.archive
            .record(Event::AcceptedResults(AcceptedResultsEvent { experiment }))?;
        Ok(())
    }

    /// Persist the archive and enter `stop`, from whatever state the run is in.
    pub fn stop_development(&mut self) -> Result<PersistedArchive> {
        let stop = forced_stop(self.state);
        self.state = stop.dst;

        let persisted = save_archive(&self.archive, &self.config.output_dir, &self.suffix)?;
        obs::emit_transition(&self.suffix, stop.name, stop.src, stop.dst);
        self.persisted = Some(persisted.clone());
        Ok(persisted)
    }
}

impl std::fmt::Debug for Overseer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overseer")
            .field("suffix", &self.suffix)
            .field("state", &self.state)
            .field("cycles", &self.cycles_counter)
            .field("policy", &self.policy.kind())
            .finish_non_exhaustive()
    }
}
