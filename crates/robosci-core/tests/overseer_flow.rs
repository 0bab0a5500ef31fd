//! End-to-end overseer runs over the in-memory collaborators.

use std::path::Path;
use std::time::Duration;

use robosci_archive::{load_archive, CheckpointPolicyKind, Collaborator, Event, EventKind};
use robosci_core::fakes::{
    detection_experiments, sample_models, seeded_archive, ConstantOracle, FailingOracle,
    RoundRobinDesign, ScriptedRevision,
};
use robosci_core::{
    Collaborators, CoverageMeasure, CoverageQuality, HaltReason, Overseer, OverseerError,
    RunConfig, State,
};

fn config(dir: &Path) -> RunConfig {
    RunConfig {
        output_dir: dir.to_path_buf(),
        rng_seed: Some(7),
        ..RunConfig::default()
    }
}

fn collaborators(revision: ScriptedRevision, experiments: u64) -> Collaborators {
    Collaborators::new(
        revision,
        RoundRobinDesign::new(detection_experiments(experiments)),
        ConstantOracle::new(true),
        CoverageQuality::new(CoverageMeasure::Uniform),
    )
}

fn kinds(overseer: &Overseer) -> Vec<EventKind> {
    overseer
        .archive()
        .development_history()
        .iter()
        .map(|r| r.kind())
        .collect()
}

// ---------------------------------------------------------------------------
// Checkpoints
// ---------------------------------------------------------------------------

#[test]
fn ignoring_policy_fails_on_second_stagnant_check() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        stop_threshold: 2,
        ..config(dir.path())
    };
    let mut overseer = Overseer::new(
        seeded_archive(3, 0),
        collaborators(ScriptedRevision::new(true), 5),
        cfg,
        "ignoring_b_0",
    );

    assert!(overseer.do_check().unwrap());
    assert_eq!(overseer.cycles(), 1);
    assert!(!overseer.archive().error_flag());

    assert!(!overseer.do_check().unwrap());
    assert_eq!(overseer.cycles(), 1);
    assert!(overseer.archive().error_flag());
    match &overseer.archive().last_event().unwrap().event {
        Event::CheckPointFail(e) => assert_eq!(e.policy, CheckpointPolicyKind::Ignoring),
        other => panic!("expected CheckPointFail, got {other:?}"),
    }
}

#[test]
fn no_ignoring_policy_fails_with_a_single_model() {
    let dir = tempfile::tempdir().unwrap();
    let mut overseer = Overseer::new(
        seeded_archive(1, 0),
        collaborators(ScriptedRevision::new(false), 5),
        config(dir.path()),
        "no_ignoring_c_0",
    );

    assert!(!overseer.do_check().unwrap());
    assert_eq!(overseer.cycles(), 0);
    match &overseer.archive().last_event().unwrap().event {
        Event::CheckPointFail(e) => assert_eq!(e.policy, CheckpointPolicyKind::NoIgnoring),
        other => panic!("expected CheckPointFail, got {other:?}"),
    }
    assert_eq!(CheckpointPolicyKind::NoIgnoring.to_string(), "no ignoring");
}

#[test]
fn no_ignoring_policy_passes_with_two_models() {
    let dir = tempfile::tempdir().unwrap();
    let mut overseer = Overseer::new(
        seeded_archive(2, 0),
        collaborators(ScriptedRevision::new(false), 5),
        config(dir.path()),
        "no_ignoring_c_1",
    );

    assert!(overseer.do_check().unwrap());
    assert_eq!(overseer.cycles(), 1);
    assert_eq!(
        overseer.archive().last_event().unwrap().kind(),
        EventKind::CheckPointSuccess
    );
}

#[test]
fn record_result_requires_pending_new_results() {
    let dir = tempfile::tempdir().unwrap();
    let mut overseer = Overseer::new(
        seeded_archive(2, 0),
        collaborators(ScriptedRevision::new(false), 5),
        config(dir.path()),
        "rr_0",
    );

    let err = overseer.record_result().unwrap_err();
    assert!(matches!(
        err,
        OverseerError::ResultNotPending {
            last: Some(EventKind::InitialModels)
        }
    ));
    assert_eq!(overseer.archive().development_history().len(), 1);
}

// ---------------------------------------------------------------------------
// Full runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn run_stops_on_cycle_budget_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        max_cycles: 2,
        ..config(dir.path())
    };
    let mut overseer = Overseer::new(
        seeded_archive(3, 0),
        collaborators(ScriptedRevision::new(false), 10),
        cfg,
        "budget_case_0",
    );

    let outcome = overseer.run().await.unwrap();
    assert_eq!(outcome.halt, HaltReason::CycleBudget);
    assert_eq!(outcome.cycles, 2);
    assert_eq!(outcome.working_models, 3);
    assert_eq!(overseer.state(), State::Stop);

    assert_eq!(
        kinds(&overseer),
        vec![
            EventKind::InitialModels,
            EventKind::UpdatedModelQuality,
            EventKind::UpdatedModelQuality,
            EventKind::UpdatedModelQuality,
            EventKind::CheckPointSuccess,
            EventKind::ChosenExperiment,
            EventKind::NewResults,
            EventKind::AcceptedResults,
            EventKind::CheckPointSuccess,
        ]
    );

    let name = outcome
        .persisted
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .to_string();
    assert!(name.ends_with("_budget_case_0"));

    let loaded = load_archive(&outcome.persisted.path).unwrap();
    assert_eq!(loaded.content_digest, outcome.persisted.content_digest);
    assert_eq!(loaded.archive.known_results().len(), 1);
    assert!(robosci_archive::verify(&loaded.archive).is_consistent());
}

#[tokio::test]
async fn refuting_down_to_one_model_fails_the_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        threshold_additional_models: 1,
        ..config(dir.path())
    };
    let mut overseer = Overseer::new(
        seeded_archive(2, 0),
        collaborators(ScriptedRevision::new(false).refuting(1), 10),
        cfg,
        "refute_case_0",
    );

    let outcome = overseer.run().await.unwrap();
    assert_eq!(outcome.halt, HaltReason::CheckpointFailed);
    assert_eq!(outcome.cycles, 1);
    assert_eq!(outcome.working_models, 1);
    assert_eq!(overseer.archive().last_failure(), Some(EventKind::CheckPointFail));
}

#[tokio::test]
async fn small_pool_requests_additional_models() {
    let dir = tempfile::tempdir().unwrap();
    let template = sample_models(5).pop().unwrap();
    let cfg = RunConfig {
        max_cycles: 1,
        ..config(dir.path())
    };
    let mut overseer = Overseer::new(
        seeded_archive(1, 0),
        collaborators(ScriptedRevision::new(false).producing(template), 10),
        cfg,
        "additional_case_0",
    );

    let outcome = overseer.run().await.unwrap();
    assert_eq!(outcome.halt, HaltReason::CycleBudget);
    assert_eq!(outcome.working_models, 2);
    assert!(kinds(&overseer).contains(&EventKind::AdditionalModels));
    assert!(!overseer.archive().revflag());
}

#[tokio::test]
async fn failed_model_production_halts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let mut overseer = Overseer::new(
        seeded_archive(1, 0),
        collaborators(ScriptedRevision::new(false), 10),
        config(dir.path()),
        "addit_fail_case_0",
    );

    let outcome = overseer.run().await.unwrap();
    assert_eq!(
        outcome.halt,
        HaltReason::SoftFailure(EventKind::AdditModProdFail)
    );
    assert!(overseer.archive().revflag());
    assert_eq!(outcome.cycles, 0);
}

#[tokio::test]
async fn exhausted_design_halts_with_soft_failure() {
    let dir = tempfile::tempdir().unwrap();
    let mut overseer = Overseer::new(
        seeded_archive(3, 0),
        collaborators(ScriptedRevision::new(false), 0),
        config(dir.path()),
        "design_case_0",
    );

    let outcome = overseer.run().await.unwrap();
    assert_eq!(outcome.halt, HaltReason::SoftFailure(EventKind::ExpDesignFail));
    assert_eq!(outcome.cycles, 1);
}

#[tokio::test]
async fn ignoring_run_stops_once_the_pool_stagnates() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        max_cycles: 10,
        stop_threshold: 2,
        ..config(dir.path())
    };
    let mut overseer = Overseer::new(
        seeded_archive(3, 0),
        collaborators(ScriptedRevision::new(true), 10),
        cfg,
        "stagnation_case_0",
    );

    let outcome = overseer.run().await.unwrap();
    assert_eq!(outcome.halt, HaltReason::CheckpointFailed);
    assert_eq!(outcome.cycles, 1);
    assert_eq!(overseer.archive().known_results().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn slow_collaborator_is_cut_off_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        collaborator_timeout_secs: 5,
        ..config(dir.path())
    };
    let collaborators = Collaborators::new(
        ScriptedRevision::new(false),
        RoundRobinDesign::new(detection_experiments(10)),
        ConstantOracle::new(true).slow(Duration::from_secs(60)),
        CoverageQuality::new(CoverageMeasure::Uniform),
    );
    let mut overseer = Overseer::new(seeded_archive(3, 0), collaborators, cfg, "timeout_case_0");

    let outcome = overseer.run().await.unwrap();
    assert_eq!(
        outcome.halt,
        HaltReason::SoftFailure(EventKind::CollaboratorTimeout)
    );

    let last = overseer.archive().last_event().unwrap();
    match &last.event {
        Event::CollaboratorTimeout(e) => {
            assert_eq!(e.collaborator, Collaborator::Oracle);
            assert_eq!(e.limit_secs, 5);
        }
        other => panic!("expected CollaboratorTimeout, got {other:?}"),
    }
    assert!(!kinds(&overseer).contains(&EventKind::NewResults));
    assert!(overseer.archive().pending_results().is_none());
}

#[tokio::test]
async fn hard_error_forces_persisted_stop_and_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let collaborators = Collaborators::new(
        ScriptedRevision::new(false),
        RoundRobinDesign::new(detection_experiments(10)),
        FailingOracle,
        CoverageQuality::new(CoverageMeasure::Uniform),
    );
    let mut overseer = Overseer::new(
        seeded_archive(3, 0),
        collaborators,
        config(dir.path()),
        "broken_case_0",
    );

    let err = overseer.run().await.unwrap_err();
    assert!(matches!(
        err,
        OverseerError::Collaborator {
            collaborator: Collaborator::Oracle,
            ..
        }
    ));
    assert_eq!(overseer.state(), State::Stop);

    let summary = overseer.summary();
    assert_eq!(summary.cycles, 1);
    assert_eq!(summary.working_models, 3);

    let persisted = overseer.persisted().cloned().unwrap();
    let loaded = load_archive(&persisted.path).unwrap();
    assert_eq!(
        loaded.archive.last_event().unwrap().kind(),
        EventKind::ChosenExperiment
    );

    assert!(matches!(
        overseer.run().await,
        Err(OverseerError::AlreadyStopped)
    ));
}

#[tokio::test]
async fn invalid_config_is_rejected_before_the_run_starts() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = RunConfig {
        max_cycles: 0,
        ..config(dir.path())
    };
    let mut overseer = Overseer::new(
        seeded_archive(3, 0),
        collaborators(ScriptedRevision::new(false), 10),
        cfg,
        "zero_budget_case_0",
    );

    let err = overseer.run().await.unwrap_err();
    assert!(matches!(err, OverseerError::Config(_)));
    assert_eq!(overseer.state(), State::Start);
    assert!(overseer.persisted().is_none());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn revision_failure_latches_revflag_and_halts() {
    let dir = tempfile::tempdir().unwrap();
    let mut overseer = Overseer::new(
        seeded_archive(3, 0),
        collaborators(ScriptedRevision::new(false).failing_on(0), 10),
        config(dir.path()),
        "revision_case_0",
    );

    let outcome = overseer.run().await.unwrap();
    assert_eq!(outcome.halt, HaltReason::SoftFailure(EventKind::RevisionFail));
    assert!(overseer.archive().revflag());
    assert!(overseer.archive().error_flag());
}
