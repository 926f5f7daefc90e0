//! Job management for presentation layers.

use dropq_core::{
    BatchAction, BatchPredicate, ControlError, EngineFailure, Job, JobAction, JobId, JobMenu,
    JobOutcome,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::{ApiError, Services};

/// Per-job outcome of a multi-job removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalSummary {
    pub removed: Vec<JobId>,
    /// Jobs the engine refused to let go of, with its reason.
    pub vetoed: Vec<(JobId, String)>,
    pub failed: Vec<(JobId, String)>,
}

impl RemovalSummary {
    pub fn is_complete(&self) -> bool {
        self.vetoed.is_empty() && self.failed.is_empty()
    }
}

pub(crate) fn parse_job_id(id: &str) -> Result<JobId, ApiError> {
    JobId::parse(id).map_err(|e| ApiError::invalid_id(id, e))
}

pub(crate) fn parse_job_ids<S: AsRef<str>>(ids: &[S]) -> Result<Vec<JobId>, ApiError> {
    ids.iter().map(|id| parse_job_id(id.as_ref())).collect()
}

impl Services {
    /// Enqueue an already-built job at the bottom of the queue.
    pub fn enqueue(&self, job: Job) -> Job {
        let job = self.queue.enqueue(job);
        self.wake_scheduler();
        job
    }

    /// Get a job by ID, queued or finished.
    pub fn get_job(&self, id: &str) -> Result<Option<Job>, ApiError> {
        Ok(self.queue.lookup(parse_job_id(id)?))
    }

    /// Jobs in rank order.
    pub fn list_jobs(&self) -> Vec<Job> {
        self.queue.jobs()
    }

    /// Completed jobs whose artifacts are still tracked.
    pub fn list_finished(&self) -> Vec<Job> {
        self.queue.finished()
    }

    /// Apply one action to one job.
    pub fn control_job(&self, id: &str, action: JobAction) -> Result<Option<Job>, ApiError> {
        let job_id = parse_job_id(id)?;
        self.queue.control(job_id, action)?;
        if matches!(action, JobAction::Queue | JobAction::Resume) {
            self.wake_scheduler();
        }
        Ok(self.queue.lookup(job_id))
    }

    /// Toolbar enablement for a selection.
    pub fn batch_predicate<S: AsRef<str>>(&self, ids: &[S]) -> Result<BatchPredicate, ApiError> {
        Ok(self.queue.batch_predicate(&parse_job_ids(ids)?))
    }

    /// Context menu enablement for a selection.
    pub fn job_menu<S: AsRef<str>>(&self, ids: &[S]) -> Result<JobMenu, ApiError> {
        Ok(self.queue.job_menu(&parse_job_ids(ids)?))
    }

    /// Apply a toolbar action to a selection. Returns how many jobs changed.
    pub fn apply_batch<S: AsRef<str>>(
        &self,
        ids: &[S],
        action: BatchAction,
    ) -> Result<usize, ApiError> {
        let changed = self.queue.apply_batch(&parse_job_ids(ids)?, action)?;
        if matches!(action, BatchAction::Start | BatchAction::StartStop) {
            self.wake_scheduler();
        }
        Ok(changed)
    }

    /// Remove every selected job the engine allows, optionally deleting
    /// artifacts. One veto does not stop the others.
    pub async fn remove_jobs<S: AsRef<str>>(
        &self,
        ids: &[S],
        delete_artifacts: bool,
    ) -> Result<RemovalSummary, ApiError> {
        let ids = parse_job_ids(ids)?;
        let results = join_all(ids.iter().map(|id| async move {
            (*id, self.queue.remove_with_cleanup(*id, delete_artifacts).await)
        }))
        .await;

        let mut summary = RemovalSummary::default();
        for (id, result) in results {
            match result {
                Ok(_) => summary.removed.push(id),
                Err(ControlError::RemovalVeto(reason)) => summary.vetoed.push((id, reason)),
                Err(e) => summary.failed.push((id, e.to_string())),
            }
        }

        if !summary.is_complete() {
            tracing::warn!(
                removed = summary.removed.len(),
                vetoed = summary.vetoed.len(),
                failed = summary.failed.len(),
                "Removal partially refused"
            );
        }
        Ok(summary)
    }

    /// Whether deleting the selection would destroy output on disk.
    pub async fn needs_delete_confirmation<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> Result<bool, ApiError> {
        for id in parse_job_ids(ids)? {
            if self.queue.needs_delete_confirmation(id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Retry copying a finished job's artifact to its destination.
    pub fn retry_copy(&self, id: &str) -> Result<bool, ApiError> {
        Ok(self.queue.retry_copy(parse_job_id(id)?)?)
    }

    /// Encode completed artifacts of a selection for dragging out.
    pub fn drag_out<S: AsRef<str>>(&self, ids: &[S]) -> Result<Option<String>, ApiError> {
        Ok(self.queue.encode_artifacts(&parse_job_ids(ids)?))
    }

    /// Engine callback: the job finished.
    pub fn complete_job(&self, id: JobId, outcome: JobOutcome) -> Result<Job, ApiError> {
        let job = self.queue.job_completed(id, outcome)?;
        self.wake_scheduler();
        Ok(job)
    }

    /// Engine callback: the job failed. It waits for a manual retry.
    pub fn fail_job(&self, id: JobId, failure: EngineFailure) -> Result<(), ApiError> {
        self.queue.job_failed(id, failure)?;
        self.wake_scheduler();
        Ok(())
    }
}
