//! Error taxonomy for admission and lifecycle control.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ContentHash, JobId, OperationId};

/// A single reference inside a payload could not be resolved.
///
/// These never abort a batch: the offending reference is logged and dropped
/// while its siblings continue to resolve.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("malformed content hash '{0}'")]
    MalformedHash(String),

    #[error("malformed file index '{index}' in reference '{line}'")]
    MalformedIndex { line: String, index: String },

    #[error("no content known for hash {0}")]
    UnknownContent(ContentHash),

    #[error("no file at index {index} under {hash}")]
    UnknownFile { hash: ContentHash, index: u32 },

    #[error("not a regular file or directory: {0}")]
    MissingPath(PathBuf),

    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A whole batch was refused. Nothing from the batch has been queued.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("payload format not recognised")]
    NotHandled,

    #[error("no candidate survived admission filtering")]
    NothingAdmitted,

    #[error("target '{0}' has no profiles")]
    NoProfiles(String),

    #[error("no targets available for selection")]
    NoTargets,

    #[error("unknown target '{0}'")]
    UnknownTarget(String),

    #[error("selection dismissed, drop abandoned")]
    SelectionAbandoned,

    #[error("a selection is already in progress for this batch")]
    SelectionInFlight,
}

/// A user or engine control call was refused.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("cannot {action} from state {state}")]
    IllegalTransition { action: &'static str, state: String },

    #[error("removal vetoed: {0}")]
    RemovalVeto(String),

    #[error("failed to delete artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ControlError {
    pub(crate) fn illegal(action: &'static str, state: impl std::fmt::Display) -> Self {
        ControlError::IllegalTransition {
            action,
            state: state.to_string(),
        }
    }

    /// Whether this is the rejected-as-no-op case.
    pub fn is_illegal_transition(&self) -> bool {
        matches!(self, ControlError::IllegalTransition { .. })
    }
}

/// Failure reported by the execution engine for one job.
///
/// The job is parked in `FAILED` and kept for a user-initiated retry.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{0}")]
#[serde(transparent)]
pub struct EngineFailure(pub String);

impl EngineFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Invalid configuration input.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}
