//! Error types for the overseer layer.

use std::path::PathBuf;

use robosci_archive::{ArchiveError, Collaborator, EventKind};
use thiserror::Error;

use crate::schedule::State;

/// Rejected run or batch configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Transition-table misconfiguration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("no scheduling rule matched in state {state}")]
    NoRuleMatched { state: State },
}

/// Hard errors that end a run.
///
/// Soft outcomes (failed revision, stagnation, timeouts) are archive events
/// and never surface here.
#[derive(Error, Debug)]
pub enum OverseerError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{collaborator} collaborator failed: {source}")]
    Collaborator {
        collaborator: Collaborator,
        #[source]
        source: anyhow::Error,
    },

    #[error("record_result needs NewResults as the last event, found {last:?}")]
    ResultNotPending { last: Option<EventKind> },

    #[error("overseer already stopped")]
    AlreadyStopped,
}

pub type Result<T> = std::result::Result<T, OverseerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rule_names_the_state() {
        let err = ScheduleError::NoRuleMatched { state: State::Stop };
        assert_eq!(err.to_string(), "no scheduling rule matched in state stop");
    }

    #[test]
    fn test_collaborator_error_keeps_source() {
        let err = OverseerError::Collaborator {
            collaborator: Collaborator::Oracle,
            source: anyhow::anyhow!("solver crashed"),
        };
        assert!(err.to_string().contains("oracle collaborator failed"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_archive_errors_convert() {
        let err: OverseerError = ArchiveError::UnknownModel("m_3".to_string()).into();
        assert!(matches!(err, OverseerError::Archive(_)));
    }
}
