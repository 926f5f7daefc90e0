//! Supervisor actor owning the notifier and the scheduler.

use std::sync::Arc;
use std::time::Duration;

use dropq_core::{JobQueue, QueueEvent};
use ractor::{Actor, ActorCell, ActorProcessingErr, ActorRef, SupervisionEvent};
use tokio::sync::broadcast;

use crate::listeners::ListenerRegistry;
use crate::messages::{NotifierMessage, SchedulerMessage, SupervisorMessage};
use crate::notifier_actor::{NotifierActor, NotifierArgs};
use crate::scheduler_actor::{HEARTBEAT_INTERVAL, SchedulerActor, SchedulerArgs};

const NOTIFIER_NAME: &str = "dropq-notifier";
const SCHEDULER_NAME: &str = "dropq-scheduler";

/// Everything the supervisor needs to (re)spawn its children.
#[derive(Clone)]
pub struct SupervisorArgs {
    pub queue: Arc<JobQueue>,
    pub events: broadcast::Sender<QueueEvent>,
    pub listeners: Arc<ListenerRegistry>,
    pub concurrency: usize,
    pub coalesce_window: Duration,
}

/// State for the supervisor actor.
pub struct SupervisorState {
    args: SupervisorArgs,
    notifier: Option<ActorRef<NotifierMessage>>,
    scheduler: Option<ActorRef<SchedulerMessage>>,
    shutting_down: bool,
}

async fn spawn_notifier(
    supervisor: ActorCell,
    args: &SupervisorArgs,
) -> Result<ActorRef<NotifierMessage>, ActorProcessingErr> {
    let notifier_args = NotifierArgs {
        events: args.events.clone(),
        listeners: args.listeners.clone(),
        window: args.coalesce_window,
    };
    let (actor, _handle) = Actor::spawn_linked(
        Some(NOTIFIER_NAME.to_string()),
        NotifierActor,
        notifier_args,
        supervisor,
    )
    .await
    .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn notifier: {}", e)))?;
    Ok(actor)
}

async fn spawn_scheduler(
    supervisor: ActorCell,
    args: &SupervisorArgs,
) -> Result<ActorRef<SchedulerMessage>, ActorProcessingErr> {
    let scheduler_args = SchedulerArgs {
        queue: args.queue.clone(),
        concurrency: args.concurrency,
        heartbeat: HEARTBEAT_INTERVAL,
    };
    let (actor, _handle) = Actor::spawn_linked(
        Some(SCHEDULER_NAME.to_string()),
        SchedulerActor,
        scheduler_args,
        supervisor,
    )
    .await
    .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn scheduler: {}", e)))?;
    Ok(actor)
}

/// Supervisor actor that owns the runtime's children.
pub struct Supervisor;

impl Actor for Supervisor {
    type Msg = SupervisorMessage;
    type State = SupervisorState;
    type Arguments = SupervisorArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting drop queue supervisor");

        let notifier = spawn_notifier(myself.get_cell(), &args).await?;
        let scheduler = spawn_scheduler(myself.get_cell(), &args).await?;

        Ok(SupervisorState {
            args,
            notifier: Some(notifier),
            scheduler: Some(scheduler),
            shutting_down: false,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisorMessage::WakeScheduler => {
                if let Some(scheduler) = &state.scheduler {
                    scheduler.send_message(SchedulerMessage::Wake)?;
                }
            }

            SupervisorMessage::FlushNotifications { reply } => {
                if let Some(notifier) = &state.notifier {
                    let (tx, rx) = ractor::concurrency::oneshot();
                    if notifier
                        .send_message(NotifierMessage::Flush { reply: tx.into() })
                        .is_ok()
                    {
                        let _ = rx.await;
                    }
                }
                let _ = reply.send(());
            }

            SupervisorMessage::Shutdown => {
                tracing::info!("Shutting down supervisor");
                state.shutting_down = true;
                if let Some(scheduler) = state.scheduler.take() {
                    scheduler.stop(None);
                }
                if let Some(notifier) = state.notifier.take() {
                    notifier.stop(None);
                }
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, err) if !state.shutting_down => {
                let name = cell.get_name().unwrap_or_default();
                tracing::warn!("Child actor {} failed: {}, restarting", name, err);
                match name.as_str() {
                    NOTIFIER_NAME => {
                        state.notifier = Some(spawn_notifier(myself.get_cell(), &state.args).await?);
                    }
                    SCHEDULER_NAME => {
                        state.scheduler =
                            Some(spawn_scheduler(myself.get_cell(), &state.args).await?);
                    }
                    _ => {}
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                tracing::debug!(
                    "Child actor {} terminated: {:?}",
                    cell.get_name().unwrap_or_default(),
                    reason
                );
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start the supervisor and its children.
pub async fn start_supervisor(
    args: SupervisorArgs,
) -> Result<(ActorRef<SupervisorMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let (actor, handle) =
        Actor::spawn(Some("dropq-supervisor".to_string()), Supervisor, args).await?;

    Ok((actor, handle))
}
