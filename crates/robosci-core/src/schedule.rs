//! Overseer states, the guarded transition table and the halt guards.
//!
//! Both the transition table and the rules that pick among enabled
//! transitions are plain data, evaluated in order. Nothing here touches the
//! archive; the overseer snapshots what the guards need into
//! [`GuardInputs`] / [`HaltInputs`] first.

use std::fmt;
use std::time::Duration;

use robosci_archive::EventKind;
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum State {
    Start,
    ModelsTestedAndRevised,
    QualityRecalculated,
    Checkpoint,
    ExperimentReady,
    HasNewResult,
    ResultRecorded,
    ProducedAdditionalModels,
    Stop,
}

impl State {
    pub fn is_terminal(self) -> bool {
        self == State::Stop
    }

    pub fn as_str(self) -> &'static str {
        match self {
            State::Start => "start",
            State::ModelsTestedAndRevised => "models_tested_and_revised",
            State::QualityRecalculated => "quality_recalculated",
            State::Checkpoint => "checkpoint",
            State::ExperimentReady => "experiment_ready",
            State::HasNewResult => "has_new_result",
            State::ResultRecorded => "result_recorded",
            State::ProducedAdditionalModels => "produced_additional_models",
            State::Stop => "stop",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionName {
    StartDevelopment,
    TestAndReviseModels,
    RecalculateModelsQuality,
    ProduceAdditionalModels,
    DoCheck,
    GetExperiment,
    ExecuteExperiment,
    RecordResult,
    StopDevelopment,
}

impl TransitionName {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionName::StartDevelopment => "start_development",
            TransitionName::TestAndReviseModels => "test_and_revise_models",
            TransitionName::RecalculateModelsQuality => "recalculate_models_quality",
            TransitionName::ProduceAdditionalModels => "produce_additional_models",
            TransitionName::DoCheck => "do_check",
            TransitionName::GetExperiment => "get_experiment",
            TransitionName::ExecuteExperiment => "execute_experiment",
            TransitionName::RecordResult => "record_result",
            TransitionName::StopDevelopment => "stop_development",
        }
    }
}

impl fmt::Display for TransitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One edge of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub name: TransitionName,
    pub src: State,
    pub dst: State,
}

const fn edge(name: TransitionName, src: State, dst: State) -> Transition {
    Transition { name, src, dst }
}

pub static TRANSITIONS: &[Transition] = &[
    edge(TransitionName::StartDevelopment, State::Start, State::ModelsTestedAndRevised),
    edge(TransitionName::TestAndReviseModels, State::ResultRecorded, State::ModelsTestedAndRevised),
    edge(TransitionName::TestAndReviseModels, State::Start, State::ModelsTestedAndRevised),
    edge(TransitionName::RecalculateModelsQuality, State::ModelsTestedAndRevised, State::QualityRecalculated),
    edge(TransitionName::RecalculateModelsQuality, State::ProducedAdditionalModels, State::QualityRecalculated),
    edge(TransitionName::ProduceAdditionalModels, State::QualityRecalculated, State::ProducedAdditionalModels),
    edge(TransitionName::DoCheck, State::QualityRecalculated, State::Checkpoint),
    edge(TransitionName::GetExperiment, State::Checkpoint, State::ExperimentReady),
    edge(TransitionName::ExecuteExperiment, State::ExperimentReady, State::HasNewResult),
    edge(TransitionName::RecordResult, State::HasNewResult, State::ResultRecorded),
    edge(TransitionName::StopDevelopment, State::Checkpoint, State::Stop),
    edge(TransitionName::StopDevelopment, State::ExperimentReady, State::Stop),
];

/// Transitions whose source is `state`, in table order.
pub fn enabled_transitions(state: State) -> Vec<&'static Transition> {
    TRANSITIONS.iter().filter(|t| t.src == state).collect()
}

/// The forced stop edge, usable from any state.
pub fn forced_stop(from: State) -> Transition {
    edge(TransitionName::StopDevelopment, from, State::Stop)
}

/// What the scheduling rules may look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardInputs {
    pub state: State,
    pub working_models: usize,
    pub threshold_additional_models: usize,
    pub revflag: bool,
}

type Selector = fn(&[&'static Transition], &GuardInputs) -> Option<&'static Transition>;

pub struct SchedulingRule {
    pub name: &'static str,
    pub select: Selector,
}

/// Rules in priority order; the first one that picks a transition wins.
pub static SCHEDULING_RULES: &[SchedulingRule] = &[
    SchedulingRule {
        name: "single_enabled",
        select: single_enabled,
    },
    SchedulingRule {
        name: "additional_models_needed",
        select: additional_models_needed,
    },
    SchedulingRule {
        name: "checkpoint_ready",
        select: checkpoint_ready,
    },
    SchedulingRule {
        name: "single_non_stop",
        select: single_non_stop,
    },
    SchedulingRule {
        name: "bootstrap",
        select: bootstrap,
    },
];

fn named(enabled: &[&'static Transition], name: TransitionName) -> Option<&'static Transition> {
    enabled.iter().copied().find(|t| t.name == name)
}

fn single_enabled(enabled: &[&'static Transition], _: &GuardInputs) -> Option<&'static Transition> {
    match enabled {
        [only] => Some(*only),
        _ => None,
    }
}

fn additional_models_needed(
    enabled: &[&'static Transition],
    inputs: &GuardInputs,
) -> Option<&'static Transition> {
    let needed = inputs.state == State::QualityRecalculated
        && inputs.working_models < inputs.threshold_additional_models
        && !inputs.revflag;
    needed
        .then(|| named(enabled, TransitionName::ProduceAdditionalModels))
        .flatten()
}

fn checkpoint_ready(
    enabled: &[&'static Transition],
    inputs: &GuardInputs,
) -> Option<&'static Transition> {
    let ready = (inputs.revflag || inputs.working_models >= inputs.threshold_additional_models)
        && inputs.state == State::QualityRecalculated;
    ready.then(|| named(enabled, TransitionName::DoCheck)).flatten()
}

fn single_non_stop(enabled: &[&'static Transition], _: &GuardInputs) -> Option<&'static Transition> {
    let mut candidates = enabled
        .iter()
        .copied()
        .filter(|t| t.name != TransitionName::StopDevelopment);
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

fn bootstrap(enabled: &[&'static Transition], inputs: &GuardInputs) -> Option<&'static Transition> {
    if inputs.state == State::Start {
        named(enabled, TransitionName::StartDevelopment)
    } else {
        None
    }
}

/// Pick the next transition from `inputs.state`.
pub fn next_transition(inputs: &GuardInputs) -> Result<&'static Transition, ScheduleError> {
    let enabled = enabled_transitions(inputs.state);
    SCHEDULING_RULES
        .iter()
        .find_map(|rule| {
            (rule.select)(&enabled, inputs).map(|t| {
                tracing::trace!(rule = rule.name, transition = %t.name, "scheduling rule matched");
                t
            })
        })
        .ok_or(ScheduleError::NoRuleMatched {
            state: inputs.state,
        })
}

// ----------------------------------------------------------------------------
// Halt guards
// ----------------------------------------------------------------------------

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    /// Error flag set by a failed checkpoint: the pool stagnated.
    CheckpointFailed,
    /// Error flag set by another soft failure.
    SoftFailure(EventKind),
    CycleBudget,
    TimeBudget,
    /// `stop_development` picked through the transition table.
    Scheduled,
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::CheckpointFailed => f.write_str("checkpoint failed"),
            HaltReason::SoftFailure(kind) => write!(f, "soft failure ({kind})"),
            HaltReason::CycleBudget => f.write_str("cycle budget exhausted"),
            HaltReason::TimeBudget => f.write_str("time budget exhausted"),
            HaltReason::Scheduled => f.write_str("scheduled stop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaltInputs {
    pub error_flag: bool,
    pub last_failure: Option<EventKind>,
    pub cycles: u64,
    pub max_cycles: u64,
    pub elapsed: Duration,
    pub max_time: Duration,
}

type HaltGuard = fn(&HaltInputs) -> Option<HaltReason>;

/// Guards checked at the top of every loop iteration, in order.
pub static HALT_GUARDS: &[HaltGuard] = &[error_flag_guard, cycle_budget_guard, time_budget_guard];

fn error_flag_guard(inputs: &HaltInputs) -> Option<HaltReason> {
    if !inputs.error_flag {
        return None;
    }
    Some(match inputs.last_failure {
        Some(EventKind::CheckPointFail) => HaltReason::CheckpointFailed,
        Some(kind) => HaltReason::SoftFailure(kind),
        None => HaltReason::SoftFailure(EventKind::CheckPointFail),
    })
}

fn cycle_budget_guard(inputs: &HaltInputs) -> Option<HaltReason> {
    (inputs.cycles >= inputs.max_cycles).then_some(HaltReason::CycleBudget)
}

fn time_budget_guard(inputs: &HaltInputs) -> Option<HaltReason> {
    (inputs.elapsed >= inputs.max_time).then_some(HaltReason::TimeBudget)
}

pub fn halt_reason(inputs: &HaltInputs) -> Option<HaltReason> {
    HALT_GUARDS.iter().find_map(|guard| guard(inputs))
}
