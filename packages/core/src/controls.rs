//! Enablement predicates for presentation controls.

use serde::{Deserialize, Serialize};

use crate::{Job, JobState, OperationAction, OperationId, OperationSnapshot};

/// Which batch controls apply to a selection of jobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPredicate {
    pub can_stop: bool,
    pub can_queue: bool,
    pub can_move_up: bool,
    pub can_move_down: bool,
}

impl BatchPredicate {
    /// Evaluate over the live jobs of a selection in a queue of `queue_len`.
    pub fn for_jobs(jobs: &[Job], queue_len: usize) -> Self {
        if jobs.is_empty() {
            return Self::default();
        }

        let max_rank = queue_len as u32;
        let can_queue = jobs.iter().all(|j| j.state.can_queue());
        let can_stop = jobs.iter().all(|j| j.state.can_stop());

        Self {
            // A selection that could go either way only offers queue.
            can_stop: can_stop && !can_queue,
            can_queue,
            can_move_up: jobs.iter().all(|j| j.rank != 1),
            can_move_down: jobs.iter().all(|j| j.rank != max_rank),
        }
    }

    /// What a start/stop toggle resolves to.
    pub fn toggle(&self) -> Option<BatchAction> {
        if self.can_queue {
            Some(BatchAction::Start)
        } else if self.can_stop {
            Some(BatchAction::Stop)
        } else {
            None
        }
    }
}

/// A control applied to every job in a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchAction {
    Start,
    Stop,
    StartStop,
    MoveUp,
    MoveDown,
}

/// Per-job pause/resume menu entries for a selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMenu {
    pub can_pause: bool,
    pub can_resume: bool,
}

impl JobMenu {
    pub fn for_jobs(jobs: &[Job], is_pausable: impl Fn(&Job) -> bool) -> Self {
        if jobs.is_empty() {
            return Self::default();
        }
        Self {
            can_pause: jobs
                .iter()
                .all(|j| j.state == JobState::Running && is_pausable(j)),
            can_resume: jobs.iter().all(|j| j.state == JobState::Paused),
        }
    }
}

/// Menu and toolbar enablement for a selection of operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationControls {
    pub pausable: Vec<OperationId>,
    pub resumable: Vec<OperationId>,
    pub schedulable: Vec<OperationId>,
    pub cancellable: Vec<OperationId>,
    /// Every selected operation can be cancelled.
    pub can_cancel: bool,
}

impl OperationControls {
    pub fn from_snapshots(ops: &[OperationSnapshot]) -> Self {
        let ids = |pred: fn(&OperationSnapshot) -> bool| -> Vec<OperationId> {
            ops.iter().filter(|op| pred(op)).map(|op| op.id).collect()
        };

        let cancellable = ids(OperationSnapshot::can_cancel);
        Self {
            pausable: ids(OperationSnapshot::can_pause),
            resumable: ids(OperationSnapshot::can_resume),
            schedulable: ids(OperationSnapshot::can_schedule),
            can_cancel: !ops.is_empty() && cancellable.len() == ops.len(),
            cancellable,
        }
    }

    pub fn can_pause(&self) -> bool {
        !self.pausable.is_empty()
    }

    pub fn can_resume(&self) -> bool {
        !self.resumable.is_empty()
    }

    pub fn can_schedule(&self) -> bool {
        !self.schedulable.is_empty()
    }

    /// Resolve the pause/resume toggle by majority. Ties pause.
    pub fn toggle(&self) -> Option<OperationAction> {
        match (self.pausable.len(), self.resumable.len()) {
            (0, 0) => None,
            (p, r) if p >= r => Some(OperationAction::Pause),
            _ => Some(OperationAction::Resume),
        }
    }

    /// Ids a concrete action applies to.
    pub fn eligible(&self, action: OperationAction) -> &[OperationId] {
        match action {
            OperationAction::Pause => &self.pausable,
            OperationAction::Resume => &self.resumable,
            OperationAction::Schedule => &self.schedulable,
            OperationAction::Cancel => &self.cancellable,
            OperationAction::Toggle => &[],
        }
    }
}
