//! Core of the drop queue: admission of dropped content, the ranked job
//! queue and control of background operations.
//!
//! - [`ContentResolver`] turns raw payloads into candidates
//! - [`AdmissionGate`] applies size and count policy and submits jobs
//! - [`TargetProfileSelector`] picks target, profile and requirement per batch
//! - [`JobQueue`] owns job ranks and lifecycle
//! - [`OperationRegistry`] tracks pausable, cancellable background work

mod artifact;
mod config;
mod content;
mod controls;
mod engine;
mod error;
mod events;
mod gate;
mod job;
mod operation;
mod queue;
pub mod resolver;
mod selector;
mod target;
mod throughput;

pub use artifact::{Artifact, ArtifactHandle};
pub use config::{
    AdmissionConfig, DEFAULT_COALESCE_WINDOW_MS, DEFAULT_MAX_BATCH_SIZE,
    DEFAULT_MIN_CANDIDATE_SIZE,
};
pub use content::{Candidate, CandidateKind, ContentFile, ContentHash, ContentRef};
pub use controls::{BatchAction, BatchPredicate, JobMenu, OperationControls};
pub use engine::ExecutionEngine;
pub use error::{AdmissionError, ConfigError, ControlError, EngineFailure, ResolutionError};
pub use events::{EVENT_CHANNEL_CAPACITY, QueueEvent, RemovalReason, event_channel};
pub use gate::{AdmissionGate, AdmissionReport};
pub use job::{Job, JobAction, JobId, JobOutcome, JobState};
pub use operation::{
    Operation, OperationAction, OperationId, OperationKind, OperationRegistry,
    OperationSnapshot, SupportedStates, TaskState,
};
pub use queue::JobQueue;
pub use resolver::{
    ContentLookup, ContentResolver, LogTone, Payload, PayloadTag, Resolution,
    encode_transcode_block,
};
pub use selector::{
    BatchId, Chooser, ChooserFuture, FlowState, ProfileChoice, Selection, SelectionFlow,
    TargetProfileSelector,
};
pub use target::{
    BLANK_PROFILE_ID, Profile, ProfileId, Target, TargetId, TargetRegistry, TargetSpec,
    TranscodeRequirement,
};
pub use throughput::ThroughputLimiter;
