//! Presentation-facing API for the drop queue.
//!
//! This crate wires the core and the actor runtime together behind
//! [`Services`]:
//! - Drop handling (resolve, admit, select, submit)
//! - Job controls (single and batch actions, removal, artifacts)
//! - Operation controls (pause, resume, schedule, cancel)
//! - Listener registration

mod drops;
mod error;
mod init;
mod jobs;
mod operations;
mod realtime;

pub use drops::DropOutcome;
pub use error::ApiError;
pub use init::{Collaborators, Services};
pub use jobs::RemovalSummary;
pub use realtime::format_event_line;

pub use dropq_actors::{ListenerId, QueueListener};

// Re-export core types for convenience
pub use dropq_core::{
    AdmissionConfig, BatchAction, BatchPredicate, Job, JobAction, JobId, JobMenu, JobState,
    OperationAction, OperationControls, OperationId, OperationSnapshot, Payload, QueueEvent,
};
