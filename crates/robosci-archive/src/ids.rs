//! Archive-assigned identifiers.
//!
//! Every identifier is a prefixed counter (`m_0`, `exp_3`, ...). The prefix
//! makes IDs readable in solver input and lets [`std::str::FromStr`] reject an
//! ID of the wrong kind when mapping solver output back to domain records.

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

macro_rules! archive_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub u64);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// The raw counter value.
            pub fn value(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}_{}", Self::PREFIX, self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ArchiveError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.strip_prefix(Self::PREFIX)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .and_then(|digits| digits.parse::<u64>().ok())
                    .map($name)
                    .ok_or_else(|| ArchiveError::MalformedId {
                        kind: stringify!($name),
                        raw: s.to_string(),
                    })
            }
        }

        impl TryFrom<String> for $name {
            type Error = ArchiveError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_string()
            }
        }
    };
}

archive_id!(
    /// Identifier of a candidate model.
    ModelId,
    "m"
);
archive_id!(
    /// Identifier of an executed experiment (a set of results).
    ExperimentId,
    "exp"
);
archive_id!(
    /// Identifier of a single experimental result.
    ResultId,
    "res"
);
archive_id!(
    /// Identifier of a catalog entity.
    EntityId,
    "e"
);
archive_id!(
    /// Identifier of a catalog activity.
    ActivityId,
    "a"
);

/// Per-kind monotonically increasing counters.
///
/// Counters never move backwards, so a value handed out once is never handed
/// out again even after the owning record is refuted or discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCounters {
    model: u64,
    experiment: u64,
    result: u64,
    entity: u64,
    activity: u64,
}

impl IdCounters {
    pub fn next_model(&mut self) -> ModelId {
        ModelId(bump(&mut self.model))
    }

    pub fn next_experiment(&mut self) -> ExperimentId {
        ExperimentId(bump(&mut self.experiment))
    }

    pub fn next_result(&mut self) -> ResultId {
        ResultId(bump(&mut self.result))
    }

    pub fn next_entity(&mut self) -> EntityId {
        EntityId(bump(&mut self.entity))
    }

    pub fn next_activity(&mut self) -> ActivityId {
        ActivityId(bump(&mut self.activity))
    }

    /// Number of model IDs handed out so far.
    pub fn models_issued(&self) -> u64 {
        self.model
    }
}

fn bump(counter: &mut u64) -> u64 {
    let value = *counter;
    *counter += 1;
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uses_prefix() {
        assert_eq!(ModelId(0).to_string(), "m_0");
        assert_eq!(ExperimentId(12).to_string(), "exp_12");
        assert_eq!(ResultId(3).to_string(), "res_3");
        assert_eq!(EntityId(7).to_string(), "e_7");
        assert_eq!(ActivityId(1).to_string(), "a_1");
    }

    #[test]
    fn test_parse_accepts_own_prefix_only() {
        assert_eq!("m_4".parse::<ModelId>().unwrap(), ModelId(4));
        assert!("exp_4".parse::<ModelId>().is_err());
        assert!("m_".parse::<ModelId>().is_err());
        assert!("m4".parse::<ModelId>().is_err());
        assert_eq!("exp_4".parse::<ExperimentId>().unwrap(), ExperimentId(4));
    }

    #[test]
    fn test_counters_are_independent_and_monotonic() {
        let mut counters = IdCounters::default();
        assert_eq!(counters.next_model(), ModelId(0));
        assert_eq!(counters.next_model(), ModelId(1));
        assert_eq!(counters.next_result(), ResultId(0));
        assert_eq!(counters.next_model(), ModelId(2));
        assert_eq!(counters.models_issued(), 3);
    }

    #[test]
    fn test_ids_serialize_as_prefixed_strings() {
        let json = serde_json::to_string(&ModelId(9)).unwrap();
        assert_eq!(json, "\"m_9\"");
        let back: ModelId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ModelId(9));
    }
}
