//! RoboSci Archive
//!
//! Event-sourced store for one automated-discovery run:
//! - Event: closed set of development events, appended with sequence and timestamp
//! - Archive: the append-only history plus projections (working models, known
//!   results, pending results, flags)
//! - Model / Experiment: candidate hypotheses and the evidence that tests them
//! - Catalog: entities, activities and compartments that models refer to
//!
//! The archive is the single source of truth; every projection can be rebuilt
//! by replaying the history. Archives persist as digest-checked JSON files.

pub mod archive;
pub mod catalog;
pub mod error;
pub mod events;
pub mod experiment;
pub mod ids;
pub mod model;
pub mod persist;
pub mod replay;

pub use archive::Archive;
pub use catalog::{
    Activity, ActivityDraft, ActivityKind, Catalog, Compartment, CompartmentId, Condition,
    ElementRef, Entity, EntityDraft, EntityKind, Property,
};
pub use error::{ArchiveError, Result};
pub use events::{
    AcceptedResultsEvent, AdditionalModelsEvent, AllModelsEmpiricallyEquivalentEvent,
    CheckPointEvent, CheckpointPolicyKind, ChosenExperimentEvent, Collaborator,
    CollaboratorTimeoutEvent, Event, EventKind, EventRecord, FailureEvent, InitialModelsEvent,
    InitialResultsEvent, NewResultsEvent, RedundantModelEvent, RefutedModelsEvent,
    RevisedIgnoredUpdateEvent, RevisedModelEvent, UpdatedModelQualityEvent,
};
pub use experiment::{ExpResult, Experiment, ExperimentDescription, ExperimentType, Intervention};
pub use ids::{ActivityId, EntityId, ExperimentId, IdCounters, ModelId, ResultId};
pub use model::Model;
pub use persist::{
    archive_file_name, content_digest, load_archive, save_archive, LoadedArchive,
    PersistedArchive, FORMAT_VERSION,
};
pub use replay::{replay_working_models, summarize, verify, ArchiveSummary, ReplayReport};

/// RoboSci archive version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
