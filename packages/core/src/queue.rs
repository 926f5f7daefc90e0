//! The ranked job queue.
//!
//! Rank is the position in `order`, 1-based, and is mirrored into each
//! job's `rank` field under the order lock. Locks are always taken order
//! first, then job. Events are published after every lock is released.
//!
//! Completed jobs leave the ranked order and are kept in a finished list
//! so their artifacts stay reachable until the user removes them.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    ArtifactHandle, BatchAction, BatchPredicate, ControlError, EngineFailure, ExecutionEngine, Job,
    JobAction, JobId, JobMenu, JobOutcome, JobState, QueueEvent, RemovalReason,
    encode_transcode_block,
};

type JobCell = Arc<Mutex<Job>>;

pub struct JobQueue {
    order: Mutex<Vec<JobCell>>,
    finished: Mutex<Vec<Job>>,
    engine: Arc<dyn ExecutionEngine>,
    events: broadcast::Sender<QueueEvent>,
}

impl JobQueue {
    pub fn new(engine: Arc<dyn ExecutionEngine>, events: broadcast::Sender<QueueEvent>) -> Self {
        Self {
            order: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            engine,
            events,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    /// Append a job at the lowest rank and attach its artifact.
    pub fn enqueue(&self, mut job: Job) -> Job {
        job.state = JobState::Queued;
        job.artifact = Some(self.engine.produce_artifact(&job).into());

        let snapshot = {
            let mut order = self.order.lock();
            job.rank = order.len() as u32 + 1;
            let snapshot = job.clone();
            order.push(Arc::new(Mutex::new(job)));
            snapshot
        };

        tracing::info!(id = %snapshot.id, rank = snapshot.rank, source = %snapshot.source, "Job enqueued");
        self.emit(QueueEvent::JobAdded {
            job: snapshot.clone(),
            timestamp: Utc::now(),
        });
        snapshot
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.find(id).map(|cell| cell.lock().clone())
    }

    /// All jobs in rank order.
    pub fn jobs(&self) -> Vec<Job> {
        self.order.lock().iter().map(|cell| cell.lock().clone()).collect()
    }

    /// Completed jobs, oldest first.
    pub fn finished(&self) -> Vec<Job> {
        self.finished.lock().clone()
    }

    /// A queued or finished job.
    pub fn lookup(&self, id: JobId) -> Option<Job> {
        self.get(id)
            .or_else(|| self.finished.lock().iter().find(|j| j.id == id).cloned())
    }

    pub fn len(&self) -> usize {
        self.order.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.lock().is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.order
            .lock()
            .iter()
            .filter(|cell| cell.lock().state == JobState::Running)
            .count()
    }

    /// Dispatch a single-job control.
    pub fn control(&self, id: JobId, action: JobAction) -> Result<(), ControlError> {
        match action {
            JobAction::Queue => self.queue(id),
            JobAction::Stop => self.stop(id),
            JobAction::Pause => self.pause(id),
            JobAction::Resume => self.resume(id),
            JobAction::MoveUp => self.move_up(id).map(|_| ()),
            JobAction::MoveDown => self.move_down(id).map(|_| ()),
            JobAction::Remove => self.remove(id).map(|_| ()),
        }
    }

    /// Put a paused, stopped or failed job back in line.
    pub fn queue(&self, id: JobId) -> Result<(), ControlError> {
        self.transition(id, JobAction::Queue, JobState::Queued, |job| {
            job.state.can_queue()
        })
    }

    pub fn stop(&self, id: JobId) -> Result<(), ControlError> {
        self.transition(id, JobAction::Stop, JobState::Stopped, |job| {
            job.state.can_stop()
        })
    }

    /// Only running jobs the engine can suspend.
    ///
    /// The engine is asked about a snapshot with no lock held, and the job
    /// is paused only if it is still running afterwards.
    pub fn pause(&self, id: JobId) -> Result<(), ControlError> {
        let snapshot = self.get(id).ok_or(ControlError::JobNotFound(id))?;
        if snapshot.state != JobState::Running || !self.engine.is_pausable(&snapshot) {
            return Err(ControlError::illegal(JobAction::Pause.as_str(), snapshot.state));
        }
        self.transition(id, JobAction::Pause, JobState::Paused, |job| {
            job.state == JobState::Running
        })
    }

    pub fn resume(&self, id: JobId) -> Result<(), ControlError> {
        self.transition(id, JobAction::Resume, JobState::Running, |job| {
            job.state == JobState::Paused
        })
    }

    /// Look the job up and move it under the order lock, so a concurrent
    /// removal either happens first or sees the new state.
    fn transition(
        &self,
        id: JobId,
        action: JobAction,
        to: JobState,
        allowed: impl FnOnce(&Job) -> bool,
    ) -> Result<(), ControlError> {
        let old = {
            let order = self.order.lock();
            let idx = position(&order, id).ok_or(ControlError::JobNotFound(id))?;
            let mut job = order[idx].lock();
            if !allowed(&*job) {
                return Err(ControlError::illegal(action.as_str(), job.state));
            }
            if to == JobState::Queued {
                job.error = None;
            }
            job.set_state(to)
        };

        tracing::debug!(%id, %action, from = %old, to = %to, "Job transition");
        self.emit(QueueEvent::JobStateChanged {
            job_id: id,
            old_state: old,
            new_state: to,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Swap with the job ranked above. `Ok(false)` at rank 1.
    pub fn move_up(&self, id: JobId) -> Result<bool, ControlError> {
        self.shift(id, true)
    }

    /// Swap with the job ranked below. `Ok(false)` at the last rank.
    pub fn move_down(&self, id: JobId) -> Result<bool, ControlError> {
        self.shift(id, false)
    }

    fn shift(&self, id: JobId, up: bool) -> Result<bool, ControlError> {
        let mut changes = Vec::new();
        {
            let mut order = self.order.lock();
            let idx = position(&order, id).ok_or(ControlError::JobNotFound(id))?;
            let other = match (up, idx) {
                (true, 0) => return Ok(false),
                (true, i) => i - 1,
                (false, i) if i + 1 >= order.len() => return Ok(false),
                (false, i) => i + 1,
            };
            order.swap(idx, other);
            let lo = idx.min(other);
            renumber(&order[lo..=lo + 1], lo, &mut changes);
        }
        self.emit_all(changes);
        Ok(true)
    }

    /// Remove a queued or finished job unless the engine vetoes it.
    ///
    /// The veto check and the removal see the same state: the engine is
    /// consulted while the queue is locked.
    pub fn remove(&self, id: JobId) -> Result<Job, ControlError> {
        let veto = |job: &Job, engine: &dyn ExecutionEngine| {
            engine.check_remove(job).map_err(ControlError::RemovalVeto)
        };
        match self.take(id, RemovalReason::Removed, veto) {
            Err(ControlError::JobNotFound(_)) => self.take_finished(id, veto),
            other => other,
        }
    }

    fn take_finished(
        &self,
        id: JobId,
        check: impl FnOnce(&Job, &dyn ExecutionEngine) -> Result<(), ControlError>,
    ) -> Result<Job, ControlError> {
        let removed = {
            let mut finished = self.finished.lock();
            let idx = finished
                .iter()
                .position(|j| j.id == id)
                .ok_or(ControlError::JobNotFound(id))?;
            check(&finished[idx], self.engine.as_ref())?;
            finished.remove(idx)
        };

        tracing::info!(%id, "Finished job removed");
        self.emit(QueueEvent::JobRemoved {
            job_id: id,
            reason: RemovalReason::Removed,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }

    /// Remove a job, then optionally delete its artifact file.
    ///
    /// A vetoed removal leaves the artifact alone.
    pub async fn remove_with_cleanup(
        &self,
        id: JobId,
        delete_artifact: bool,
    ) -> Result<Job, ControlError> {
        let job = self.remove(id)?;
        if delete_artifact {
            if let Some(artifact) = &job.artifact {
                artifact.delete_file().await?;
                tracing::info!(%id, path = %artifact.path().display(), "Artifact deleted");
            }
        }
        Ok(job)
    }

    fn take(
        &self,
        id: JobId,
        reason: RemovalReason,
        check: impl FnOnce(&Job, &dyn ExecutionEngine) -> Result<(), ControlError>,
    ) -> Result<Job, ControlError> {
        let mut changes = Vec::new();
        let removed = {
            let mut order = self.order.lock();
            let idx = position(&order, id).ok_or(ControlError::JobNotFound(id))?;
            let removed = {
                let job = order[idx].lock();
                check(&*job, self.engine.as_ref())?;
                job.clone()
            };
            order.remove(idx);
            renumber(&order[idx..], idx, &mut changes);
            removed
        };

        tracing::info!(%id, ?reason, "Job left the queue");
        self.emit(QueueEvent::JobRemoved {
            job_id: id,
            reason,
            timestamp: Utc::now(),
        });
        self.emit_all(changes);
        Ok(removed)
    }

    /// Move the top-ranked queued job to running and hand it to the engine.
    ///
    /// A start failure parks the job in `Failed`.
    pub fn start_next(&self) -> Option<JobId> {
        let snapshot = {
            let order = self.order.lock();
            order.iter().find_map(|cell| {
                let mut job = cell.lock();
                (job.state == JobState::Queued).then(|| {
                    job.set_state(JobState::Running);
                    job.clone()
                })
            })
        }?;

        let id = snapshot.id;
        tracing::debug!(%id, rank = snapshot.rank, "Job started");
        self.emit(QueueEvent::JobStateChanged {
            job_id: id,
            old_state: JobState::Queued,
            new_state: JobState::Running,
            timestamp: Utc::now(),
        });

        if let Err(failure) = self.engine.start_job(&snapshot) {
            if let Err(e) = self.job_failed(id, failure) {
                tracing::warn!(%id, error = %e, "Could not record start failure");
            }
        }
        Some(id)
    }

    /// Engine callback: the job finished. Its artifact becomes complete and
    /// the job moves from the ranked order to the finished list.
    pub fn job_completed(&self, id: JobId, outcome: JobOutcome) -> Result<Job, ControlError> {
        let job = self.take(id, RemovalReason::Completed, |job, _| {
            if matches!(job.state, JobState::Running | JobState::Paused) {
                Ok(())
            } else {
                Err(ControlError::illegal("complete", job.state))
            }
        })?;
        if let Some(artifact) = &job.artifact {
            artifact.with_mut(|a| a.complete = true);
        }
        self.finished.lock().push(job.clone());
        tracing::info!(%id, summary = %outcome.summary, "Job completed");
        Ok(job)
    }

    /// Engine callback: the job failed. It stays in the queue for a manual
    /// retry through [`JobQueue::queue`].
    pub fn job_failed(&self, id: JobId, failure: EngineFailure) -> Result<(), ControlError> {
        let old = {
            let order = self.order.lock();
            let idx = position(&order, id).ok_or(ControlError::JobNotFound(id))?;
            let mut job = order[idx].lock();
            job.error = Some(failure.0.clone());
            job.set_state(JobState::Failed)
        };

        tracing::warn!(%id, error = %failure, "Job failed");
        self.emit(QueueEvent::JobStateChanged {
            job_id: id,
            old_state: old,
            new_state: JobState::Failed,
            timestamp: Utc::now(),
        });
        self.emit(QueueEvent::JobFailed {
            job_id: id,
            error: failure.0,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Snapshots of the selected jobs that still exist.
    pub fn select(&self, selection: &[JobId]) -> Vec<Job> {
        selection.iter().filter_map(|id| self.get(*id)).collect()
    }

    pub fn batch_predicate(&self, selection: &[JobId]) -> BatchPredicate {
        let (jobs, len) = {
            let order = self.order.lock();
            let jobs: Vec<Job> = selection
                .iter()
                .filter_map(|id| position(&order, *id).map(|i| order[i].lock().clone()))
                .collect();
            (jobs, order.len())
        };
        BatchPredicate::for_jobs(&jobs, len)
    }

    pub fn job_menu(&self, selection: &[JobId]) -> JobMenu {
        let jobs = self.select(selection);
        JobMenu::for_jobs(&jobs, |job| self.engine.is_pausable(job))
    }

    /// Apply a batch control to a selection.
    ///
    /// Returns how many jobs it was applied to. A selection the predicate
    /// rules out is rejected as a whole.
    pub fn apply_batch(
        &self,
        selection: &[JobId],
        action: BatchAction,
    ) -> Result<usize, ControlError> {
        let predicate = self.batch_predicate(selection);
        let action = match action {
            BatchAction::StartStop => predicate
                .toggle()
                .ok_or_else(|| ControlError::illegal("start/stop", "selection"))?,
            other => other,
        };

        let allowed = match action {
            BatchAction::Start => predicate.can_queue,
            BatchAction::Stop => predicate.can_stop,
            BatchAction::MoveUp => predicate.can_move_up,
            BatchAction::MoveDown => predicate.can_move_down,
            BatchAction::StartStop => false,
        };
        if !allowed {
            return Err(ControlError::illegal(batch_name(action), "selection"));
        }

        let mut jobs = self.select(selection);
        // Moves run nearest-the-edge first so neighbours in the selection
        // keep their relative order.
        match action {
            BatchAction::MoveDown => jobs.sort_by(|a, b| b.rank.cmp(&a.rank)),
            _ => jobs.sort_by_key(|j| j.rank),
        }

        let mut applied = 0;
        for job in jobs {
            let result = match action {
                BatchAction::Start => self.queue(job.id),
                BatchAction::Stop => self.stop(job.id),
                BatchAction::MoveUp => self.move_up(job.id).map(|_| ()),
                BatchAction::MoveDown => self.move_down(job.id).map(|_| ()),
                BatchAction::StartStop => Ok(()),
            };
            match result {
                Ok(()) => applied += 1,
                Err(e) => tracing::debug!(id = %job.id, error = %e, "Batch control skipped"),
            }
        }
        Ok(applied)
    }

    /// Reset copy bookkeeping on a job's artifact.
    pub fn retry_copy(&self, id: JobId) -> Result<bool, ControlError> {
        Ok(self.artifact(id)?.is_some_and(|a| a.retry_copy()))
    }

    /// Whether removing a job with its artifact should be confirmed first.
    pub async fn needs_delete_confirmation(&self, id: JobId) -> Result<bool, ControlError> {
        match self.artifact(id)? {
            Some(artifact) => Ok(artifact.needs_delete_confirmation().await),
            None => Ok(false),
        }
    }

    /// `TranscodeFile` block listing the complete artifacts of a selection,
    /// or `None` when there are none.
    pub fn encode_artifacts(&self, selection: &[JobId]) -> Option<String> {
        let paths: Vec<_> = selection
            .iter()
            .filter_map(|id| self.lookup(*id)?.artifact)
            .map(|a| a.snapshot())
            .filter(|a| a.complete)
            .map(|a| a.path)
            .collect();
        if paths.is_empty() {
            return None;
        }
        Some(encode_transcode_block(paths.iter().map(|p| p.as_path())))
    }

    fn artifact(&self, id: JobId) -> Result<Option<ArtifactHandle>, ControlError> {
        let job = self.lookup(id).ok_or(ControlError::JobNotFound(id))?;
        Ok(job.artifact)
    }

    fn find(&self, id: JobId) -> Option<JobCell> {
        let order = self.order.lock();
        position(&order, id).map(|i| order[i].clone())
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }

    fn emit_all(&self, events: Vec<QueueEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}

fn position(order: &[JobCell], id: JobId) -> Option<usize> {
    order.iter().position(|cell| cell.lock().id == id)
}

/// Rewrite ranks for `cells`, which start at index `start` of the order.
fn renumber(cells: &[JobCell], start: usize, changes: &mut Vec<QueueEvent>) {
    for (offset, cell) in cells.iter().enumerate() {
        let rank = (start + offset) as u32 + 1;
        let mut job = cell.lock();
        if job.rank != rank {
            changes.push(QueueEvent::JobRankChanged {
                job_id: job.id,
                old_rank: job.rank,
                new_rank: rank,
                timestamp: Utc::now(),
            });
            job.rank = rank;
        }
    }
}

fn batch_name(action: BatchAction) -> &'static str {
    match action {
        BatchAction::Start => "start",
        BatchAction::Stop => "stop",
        BatchAction::StartStop => "start/stop",
        BatchAction::MoveUp => "move up",
        BatchAction::MoveDown => "move down",
    }
}
