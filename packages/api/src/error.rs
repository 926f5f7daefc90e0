//! Errors returned across the presentation boundary.

use dropq_core::{AdmissionError, ControlError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid id '{id}': {reason}")]
    InvalidId { id: String, reason: String },

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

impl ApiError {
    pub(crate) fn invalid_id(id: &str, reason: impl std::fmt::Display) -> Self {
        ApiError::InvalidId {
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }
}
