//! Static element catalog of the system under study.
//!
//! The catalog is reference data: compartments, entities and activities that
//! models and experiment descriptions point at by ID. It is populated by the
//! construction code before the run starts and is only read afterwards.

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};
use crate::ids::{ActivityId, EntityId};

/// Compartment identifier, supplied by the test case rather than allocated.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompartmentId(pub String);

impl std::fmt::Display for CompartmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compartment {
    pub id: CompartmentId,
    pub name: String,
}

/// A structural fact: an entity present in a compartment, or an activity
/// taking place.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Present {
        entity: EntityId,
        compartment: CompartmentId,
    },
    Active {
        activity: ActivityId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Gene,
    Metabolite,
    Protein,
    Complex,
}

/// What an entity can do for an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "activity", rename_all = "snake_case")]
pub enum Property {
    Catalyses(ActivityId),
    Transports(ActivityId),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub version: Option<String>,
    pub kind: EntityKind,
    pub properties: Vec<Property>,
}

/// Entity fields before the archive assigns an ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDraft {
    pub name: String,
    pub version: Option<String>,
    pub kind: EntityKind,
    pub properties: Vec<Property>,
}

impl EntityDraft {
    pub fn new(name: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            name: name.into(),
            version: None,
            kind,
            properties: Vec::new(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Growth,
    Expression,
    NonEnzymaticReaction,
    EnzymaticReaction,
    TransporterNotRequired,
    TransporterRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub name: String,
    pub kind: ActivityKind,
    /// Conditions the activity requires (substrates, source conditions, ...).
    pub inputs: Vec<Condition>,
    /// Conditions the activity produces.
    pub outputs: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityDraft {
    pub name: String,
    pub kind: ActivityKind,
    pub inputs: Vec<Condition>,
    pub outputs: Vec<Condition>,
}

impl ActivityDraft {
    pub fn new(name: impl Into<String>, kind: ActivityKind) -> Self {
        Self {
            name: name.into(),
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = Condition>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn with_outputs(mut self, outputs: impl IntoIterator<Item = Condition>) -> Self {
        self.outputs.extend(outputs);
        self
    }
}

/// Borrowed view of a catalog element found by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRef<'a> {
    Entity(&'a Entity),
    Activity(&'a Activity),
    Compartment(&'a Compartment),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub compartments: Vec<Compartment>,
    pub entities: Vec<Entity>,
    pub activities: Vec<Activity>,
}

impl Catalog {
    pub fn entity(&self, id: EntityId, version: Option<&str>) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.id == id && version.map_or(true, |v| e.version.as_deref() == Some(v)))
    }

    pub fn activity(&self, id: ActivityId) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == id)
    }

    /// Reverse-lookup an element from an ID string as it appears in solver
    /// output. `version` only narrows entity matches.
    pub fn matching_element(&self, id: &str, version: Option<&str>) -> Result<ElementRef<'_>> {
        let not_found = || ArchiveError::ElementNotFound {
            id: id.to_string(),
            version: version.map(str::to_string),
        };

        if let Ok(entity_id) = id.parse::<EntityId>() {
            return self
                .entity(entity_id, version)
                .map(ElementRef::Entity)
                .ok_or_else(not_found);
        }
        if let Ok(activity_id) = id.parse::<ActivityId>() {
            return self
                .activity(activity_id)
                .map(ElementRef::Activity)
                .ok_or_else(not_found);
        }
        self.compartments
            .iter()
            .find(|c| c.id.0 == id)
            .map(ElementRef::Compartment)
            .ok_or_else(not_found)
    }
}
