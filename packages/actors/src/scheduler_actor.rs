//! Scheduler actor: keeps the engine busy with the top-ranked queued jobs.

use std::sync::Arc;
use std::time::Duration;

use dropq_core::JobQueue;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::task::JoinHandle;

use crate::messages::SchedulerMessage;

/// Interval between scheduling passes when nobody wakes the scheduler.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Scheduler actor arguments.
pub struct SchedulerArgs {
    pub queue: Arc<JobQueue>,
    /// Jobs allowed to run at once.
    pub concurrency: usize,
    pub heartbeat: Duration,
}

/// State for the scheduler actor.
pub struct SchedulerState {
    queue: Arc<JobQueue>,
    concurrency: usize,
    heartbeat: JoinHandle<()>,
}

impl SchedulerState {
    /// Start queued jobs until the concurrency limit is reached.
    fn fill(&self) -> usize {
        let mut started = 0;
        while self.queue.running_count() < self.concurrency {
            match self.queue.start_next() {
                Some(id) => {
                    tracing::debug!(%id, "Scheduler started job");
                    started += 1;
                }
                None => break,
            }
        }
        started
    }
}

/// Scheduler actor that hands queued jobs to the execution engine.
pub struct SchedulerActor;

impl Actor for SchedulerActor {
    type Msg = SchedulerMessage;
    type State = SchedulerState;
    type Arguments = SchedulerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(concurrency = args.concurrency, "Starting scheduler");

        let myself_clone = myself.clone();
        let interval = args.heartbeat;
        let heartbeat = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if myself_clone
                    .send_message(SchedulerMessage::Heartbeat)
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok(SchedulerState {
            queue: args.queue,
            concurrency: args.concurrency.max(1),
            heartbeat,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SchedulerMessage::Wake | SchedulerMessage::Heartbeat => {
                state.fill();
            }

            SchedulerMessage::RunningCount { reply } => {
                let _ = reply.send(state.queue.running_count());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.heartbeat.abort();
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}
