//! Seam to the component that actually executes jobs.

use crate::{Artifact, EngineFailure, Job};

/// The execution engine behind the queue.
///
/// Calls receive a snapshot of the job; the engine reports back through
/// [`JobQueue::job_completed`](crate::JobQueue::job_completed) and
/// [`JobQueue::job_failed`](crate::JobQueue::job_failed).
///
/// `start_job`, `is_pausable` and `produce_artifact` run with no queue lock
/// held and may call back into the queue.
pub trait ExecutionEngine: Send + Sync + 'static {
    /// Begin executing a job that has just moved to `Running`.
    fn start_job(&self, job: &Job) -> Result<(), EngineFailure>;

    /// Whether a running job can be suspended.
    fn is_pausable(&self, job: &Job) -> bool;

    /// Veto a removal by returning the reason.
    ///
    /// Runs while the queue holds its locks, so the answer applies to the
    /// exact state being removed. It must not call back into the
    /// [`JobQueue`](crate::JobQueue); doing so deadlocks.
    fn check_remove(&self, _job: &Job) -> Result<(), String> {
        Ok(())
    }

    /// Describe the artifact the job will produce.
    fn produce_artifact(&self, job: &Job) -> Artifact;
}
