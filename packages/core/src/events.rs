//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{Job, JobId, JobState, OperationId, OperationKind, TaskState};

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Why a job left the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    Removed,
    Completed,
}

/// Events emitted by the queue and the operation registry.
///
/// Published only after the state change is committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    // Job events
    /// A new job was enqueued.
    JobAdded { job: Job, timestamp: DateTime<Utc> },
    /// A job's state changed.
    JobStateChanged {
        job_id: JobId,
        old_state: JobState,
        new_state: JobState,
        timestamp: DateTime<Utc>,
    },
    /// A job moved in the queue.
    JobRankChanged {
        job_id: JobId,
        old_rank: u32,
        new_rank: u32,
        timestamp: DateTime<Utc>,
    },
    /// The engine reported a failure.
    JobFailed {
        job_id: JobId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// A job left the queue.
    JobRemoved {
        job_id: JobId,
        reason: RemovalReason,
        timestamp: DateTime<Utc>,
    },

    // Operation events
    OperationAdded {
        operation_id: OperationId,
        kind: OperationKind,
        name: String,
        timestamp: DateTime<Utc>,
    },
    OperationChanged {
        operation_id: OperationId,
        state: TaskState,
        auto_pause: bool,
        timestamp: DateTime<Utc>,
    },
    OperationRemoved {
        operation_id: OperationId,
        timestamp: DateTime<Utc>,
    },
    /// Coalesced notification for a burst of operation adds and removes.
    OperationsRefreshed {
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Listeners missed events and should reload everything.
    Resync { timestamp: DateTime<Utc> },
}

impl QueueEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            QueueEvent::JobAdded { timestamp, .. } => *timestamp,
            QueueEvent::JobStateChanged { timestamp, .. } => *timestamp,
            QueueEvent::JobRankChanged { timestamp, .. } => *timestamp,
            QueueEvent::JobFailed { timestamp, .. } => *timestamp,
            QueueEvent::JobRemoved { timestamp, .. } => *timestamp,
            QueueEvent::OperationAdded { timestamp, .. } => *timestamp,
            QueueEvent::OperationChanged { timestamp, .. } => *timestamp,
            QueueEvent::OperationRemoved { timestamp, .. } => *timestamp,
            QueueEvent::OperationsRefreshed { timestamp, .. } => *timestamp,
            QueueEvent::Resync { timestamp } => *timestamp,
        }
    }

    /// Get the job ID associated with this event, if any.
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            QueueEvent::JobAdded { job, .. } => Some(job.id),
            QueueEvent::JobStateChanged { job_id, .. } => Some(*job_id),
            QueueEvent::JobRankChanged { job_id, .. } => Some(*job_id),
            QueueEvent::JobFailed { job_id, .. } => Some(*job_id),
            QueueEvent::JobRemoved { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }

    /// Get the operation ID associated with this event, if any.
    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            QueueEvent::OperationAdded { operation_id, .. } => Some(*operation_id),
            QueueEvent::OperationChanged { operation_id, .. } => Some(*operation_id),
            QueueEvent::OperationRemoved { operation_id, .. } => Some(*operation_id),
            _ => None,
        }
    }

    /// Operation adds and removes arrive in bursts and are coalesced.
    pub fn is_operation_churn(&self) -> bool {
        matches!(
            self,
            QueueEvent::OperationAdded { .. } | QueueEvent::OperationRemoved { .. }
        )
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            QueueEvent::JobAdded { job, .. } => {
                format!("Job {} added at rank {} ({})", job.id, job.rank, job.source)
            }
            QueueEvent::JobStateChanged {
                job_id,
                old_state,
                new_state,
                ..
            } => format!("Job {} {} -> {}", job_id, old_state, new_state),
            QueueEvent::JobRankChanged {
                job_id,
                old_rank,
                new_rank,
                ..
            } => format!("Job {} rank {} -> {}", job_id, old_rank, new_rank),
            QueueEvent::JobFailed { job_id, error, .. } => {
                format!("Job {} failed: {}", job_id, error)
            }
            QueueEvent::JobRemoved { job_id, reason, .. } => match reason {
                RemovalReason::Removed => format!("Job {} removed", job_id),
                RemovalReason::Completed => format!("Job {} completed", job_id),
            },
            QueueEvent::OperationAdded {
                operation_id,
                kind,
                name,
                ..
            } => format!("Operation {} ({}) '{}' added", operation_id, kind, name),
            QueueEvent::OperationChanged {
                operation_id,
                state,
                auto_pause,
                ..
            } => {
                let scheduled = if *auto_pause { " (scheduled)" } else { "" };
                format!("Operation {} -> {}{}", operation_id, state, scheduled)
            }
            QueueEvent::OperationRemoved { operation_id, .. } => {
                format!("Operation {} removed", operation_id)
            }
            QueueEvent::OperationsRefreshed { count, .. } => {
                format!("{} operation changes", count)
            }
            QueueEvent::Resync { .. } => "Resync".to_string(),
        }
    }
}

/// Create the broadcast channel shared by the queue and the registry.
pub fn event_channel() -> (
    broadcast::Sender<QueueEvent>,
    broadcast::Receiver<QueueEvent>,
) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
