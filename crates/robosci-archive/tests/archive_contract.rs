//! Contract tests for the archive: ID assignment, working-set projection,
//! provenance queries, flag latching and on-disk persistence.

use std::collections::BTreeSet;

use robosci_archive::{
    load_archive, save_archive, AllModelsEmpiricallyEquivalentEvent, Archive, ArchiveError,
    CompartmentId, Condition, EntityId, Event, ExpResult, Experiment, ExperimentDescription,
    ExperimentType, FailureEvent, Model, ModelId, ResultId,
};

fn present(entity: u64) -> Condition {
    Condition::Present {
        entity: EntityId(entity),
        compartment: CompartmentId("c_01".to_string()),
    }
}

fn model(entity: u64) -> Model {
    Model::new([present(entity)], [], [present(entity + 100)])
}

fn detection(entity: u64, outcome: bool) -> ExpResult {
    ExpResult::new(
        ExperimentDescription::new(ExperimentType::DetectionEntity {
            entity: EntityId(entity),
        }),
        outcome,
    )
}

#[test]
fn initial_models_get_fresh_ids_and_refutation_removes_them() {
    let mut archive = Archive::with_seed(0);
    archive
        .record(Event::initial_models([model(0), model(1)]))
        .expect("record initial models");

    assert_eq!(
        archive.working_model_ids(),
        &BTreeSet::from([ModelId(0), ModelId(1)])
    );
    let ids: Vec<String> = archive
        .working_models()
        .map(|m| m.id.expect("assigned").to_string())
        .collect();
    assert_eq!(ids, vec!["m_0", "m_1"]);

    archive
        .record(Event::refuted_models([ModelId(0)]))
        .expect("record refutation");
    assert_eq!(archive.working_model_ids(), &BTreeSet::from([ModelId(1)]));

    // Refuted models stay resolvable for provenance.
    assert!(archive.model(ModelId(0)).is_some());
}

#[test]
fn refuting_unknown_ids_is_a_no_op() {
    let mut archive = Archive::with_seed(0);
    archive.record(Event::initial_models([model(0)])).unwrap();
    archive.record(Event::refuted_models([ModelId(42)])).unwrap();
    assert_eq!(archive.working_model_count(), 1);
    assert_eq!(archive.development_history().len(), 2);
}

#[test]
fn model_ids_are_unique_across_introducing_events() {
    let mut archive = Archive::with_seed(0);
    archive
        .record(Event::initial_models([model(0), model(1)]))
        .unwrap();
    archive
        .record(Event::revised_model(ModelId(0), [model(2), model(3)]))
        .unwrap();
    archive
        .record(Event::additional_models([model(4), model(0)]))
        .unwrap();
    archive
        .record(Event::revised_model(ModelId(5), [model(6)]))
        .unwrap();

    let ids: Vec<ModelId> = archive
        .development_history()
        .iter()
        .flat_map(|r| r.event.introduced_models())
        .map(|m| m.id.expect("assigned"))
        .collect();
    let unique: BTreeSet<ModelId> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 7);
    assert_eq!(unique.len(), ids.len());
    assert!(robosci_archive::verify(&archive).duplicate_model_ids.is_empty());
}

#[test]
fn collapse_never_keeps_a_lower_quality_model() {
    for seed in 0..32 {
        let mut archive = Archive::with_seed(seed);
        archive
            .record(Event::initial_models([model(0), model(1), model(2)]))
            .unwrap();
        archive.record(Event::updated_quality(ModelId(0), 3)).unwrap();
        archive.record(Event::updated_quality(ModelId(1), 5)).unwrap();
        archive.record(Event::updated_quality(ModelId(2), 5)).unwrap();

        archive
            .record(Event::AllModelsEmpiricallyEquivalent(
                AllModelsEmpiricallyEquivalentEvent::new([ModelId(0), ModelId(1), ModelId(2)]),
            ))
            .unwrap();

        let working = archive.working_model_ids().clone();
        assert_eq!(working.len(), 1);
        let survivor = *working.iter().next().unwrap();
        assert!(survivor == ModelId(1) || survivor == ModelId(2));

        match &archive.last_event().unwrap().event {
            Event::AllModelsEmpiricallyEquivalent(e) => assert_eq!(e.model_left, Some(survivor)),
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[test]
fn results_after_model_only_cover_later_new_results() {
    let mut archive = Archive::with_seed(0);
    archive.record(Event::initial_models([model(0)])).unwrap();
    archive
        .record(Event::new_results(Experiment::new([detection(0, true)])))
        .unwrap();
    archive
        .record(Event::additional_models([model(1)]))
        .unwrap();

    assert!(archive
        .get_results_after_model(ModelId(1))
        .unwrap()
        .is_empty());
    assert_eq!(archive.get_results_after_model(ModelId(0)).unwrap().len(), 1);

    archive
        .record(Event::new_results(Experiment::new([
            detection(1, false),
            detection(2, true),
        ])))
        .unwrap();

    let after: Vec<Option<ResultId>> = archive
        .get_results_after_model(ModelId(1))
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(after, vec![Some(ResultId(1)), Some(ResultId(2))]);
    assert_eq!(archive.get_results_after_model(ModelId(0)).unwrap().len(), 3);

    assert!(matches!(
        archive.get_results_after_model(ModelId(9)),
        Err(ArchiveError::OriginNotFound(_))
    ));
}

#[test]
fn origin_event_is_the_introducing_event() {
    let mut archive = Archive::with_seed(0);
    archive.record(Event::initial_models([model(0)])).unwrap();
    archive
        .record(Event::revised_model(ModelId(0), [model(1)]))
        .unwrap();

    assert_eq!(archive.get_model_origin_event(ModelId(0)).unwrap().sequence, 0);
    assert_eq!(archive.get_model_origin_event(ModelId(1)).unwrap().sequence, 1);
}

#[test]
fn flags_latch_for_the_rest_of_the_run() {
    let mut archive = Archive::with_seed(0);
    archive.record(Event::initial_models([model(0)])).unwrap();
    assert!(!archive.error_flag());

    archive
        .record(Event::RevisionFail(FailureEvent::because("unsatisfiable")))
        .unwrap();

    let followups = vec![
        Event::additional_models([model(1)]),
        Event::refuted_models([ModelId(0)]),
        Event::updated_quality(ModelId(1), 2),
        Event::new_results(Experiment::new([detection(3, true)])),
    ];
    for event in followups {
        archive.record(event).unwrap();
        assert!(archive.error_flag());
        assert!(archive.revflag());
    }
}

#[test]
fn persisted_archive_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = Archive::with_seed(0);
    archive
        .record(Event::initial_models([model(0), model(1)]))
        .unwrap();
    archive
        .record(Event::new_results(Experiment::new([detection(0, true)])))
        .unwrap();
    archive.record(Event::refuted_models([ModelId(1)])).unwrap();

    let saved = save_archive(&archive, dir.path(), "1_0_0").unwrap();
    let file_name = saved.path.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("archive_"));
    assert!(file_name.ends_with("_1_0_0"));

    let loaded = load_archive(&saved.path).unwrap();
    assert_eq!(loaded.content_digest, saved.content_digest);
    assert_eq!(loaded.suffix, "1_0_0");
    assert_eq!(
        loaded.archive.development_history(),
        archive.development_history()
    );
    assert_eq!(
        loaded.archive.working_model_ids(),
        archive.working_model_ids()
    );
    assert!(loaded.archive.pending_results().is_some());
    assert!(loaded.archive.verify_replay());

    // No temp files left behind.
    let entries = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(entries, 1);
}

#[test]
fn tampered_archive_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut archive = Archive::with_seed(0);
    archive
        .record(Event::initial_models([model(0), model(1)]))
        .unwrap();
    let saved = save_archive(&archive, dir.path(), "tamper").unwrap();

    let text = std::fs::read_to_string(&saved.path).unwrap();
    let tampered = text.replacen("\"error_flag\": false", "\"error_flag\": true", 1);
    assert_ne!(text, tampered);
    std::fs::write(&saved.path, tampered).unwrap();

    assert!(matches!(
        load_archive(&saved.path),
        Err(ArchiveError::DigestMismatch { .. })
    ));
}
