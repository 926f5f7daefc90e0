//! Job domain types for work items in the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{ArtifactHandle, ContentRef, Profile, TargetId, TranscodeRequirement};

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Current state of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for the scheduler.
    #[default]
    Queued,
    /// Handed to the execution engine.
    Running,
    /// Suspended by the user; only resume brings it back.
    Paused,
    /// Stopped by the user; re-queue to run again.
    Stopped,
    /// The engine reported an error. Kept for a manual retry.
    Failed,
}

impl JobState {
    /// Get a simple state string for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Stopped => "stopped",
            JobState::Failed => "failed",
        }
    }

    /// States `queue()` accepts.
    pub fn can_queue(&self) -> bool {
        matches!(self, JobState::Paused | JobState::Stopped | JobState::Failed)
    }

    /// States `stop()` accepts.
    pub fn can_stop(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Running | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-level control on a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Queue,
    Stop,
    Pause,
    Resume,
    MoveUp,
    MoveDown,
    Remove,
}

impl JobAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobAction::Queue => "queue",
            JobAction::Stop => "stop",
            JobAction::Pause => "pause",
            JobAction::Resume => "resume",
            JobAction::MoveUp => "move up",
            JobAction::MoveDown => "move down",
            JobAction::Remove => "remove",
        }
    }
}

impl std::fmt::Display for JobAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result reported by the engine for a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Human-readable summary of the result.
    pub summary: String,
    /// Optional structured output data as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
}

impl JobOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            output: None,
        }
    }

    pub fn with_output(summary: impl Into<String>, output: serde_json::Value) -> Self {
        Self {
            summary: summary.into(),
            output: Some(output),
        }
    }
}

/// A queued unit of work: one source against one target and profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// 1-based position in the queue.
    pub rank: u32,
    pub state: JobState,
    pub target: TargetId,
    pub profile: Profile,
    pub source: ContentRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<ArtifactHandle>,
    pub requirement: TranscodeRequirement,
    /// Last error reported by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new queued job. Rank is assigned on enqueue.
    pub fn new(
        target: TargetId,
        profile: Profile,
        requirement: TranscodeRequirement,
        source: ContentRef,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            rank: 0,
            state: JobState::Queued,
            target,
            profile,
            source,
            artifact: None,
            requirement,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the engine should actually process this job.
    pub fn needs_processing(&self) -> bool {
        self.requirement != TranscodeRequirement::Never && !self.profile.is_blank()
    }

    pub(crate) fn set_state(&mut self, state: JobState) -> JobState {
        let old = self.state;
        self.state = state;
        self.updated_at = Utc::now();
        old
    }
}
