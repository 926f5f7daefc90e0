//! Service initialization for the drop queue.

use std::sync::Arc;

use dropq_actors::{
    ActorRef, ListenerRegistry, SupervisorArgs, SupervisorMessage, start_supervisor,
};
use dropq_core::{
    AdmissionConfig, AdmissionGate, Chooser, ContentLookup, ContentResolver, ExecutionEngine,
    JobQueue, OperationRegistry, QueueEvent, TargetProfileSelector, TargetRegistry,
    ThroughputLimiter, event_channel,
};
use tokio::sync::broadcast;

use crate::ApiError;

/// Collaborators supplied by the host application.
pub struct Collaborators {
    pub engine: Arc<dyn ExecutionEngine>,
    pub lookup: Arc<dyn ContentLookup>,
    pub chooser: Arc<dyn Chooser>,
    pub targets: Arc<TargetRegistry>,
}

/// Everything a presentation layer talks to, wired together once at startup.
pub struct Services {
    pub(crate) config: AdmissionConfig,
    pub(crate) queue: Arc<JobQueue>,
    pub(crate) operations: Arc<OperationRegistry>,
    pub(crate) targets: Arc<TargetRegistry>,
    pub(crate) resolver: ContentResolver,
    pub(crate) gate: AdmissionGate,
    pub(crate) selector: TargetProfileSelector,
    pub(crate) listeners: Arc<ListenerRegistry>,
    pub(crate) limiter: Arc<ThroughputLimiter>,
    pub(crate) events: broadcast::Sender<QueueEvent>,
    pub(crate) supervisor: ActorRef<SupervisorMessage>,
}

impl Services {
    /// Initialize the queue, the operation registry and the actor runtime.
    ///
    /// This should be called once at startup before handling drops.
    pub async fn init(
        config: AdmissionConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ApiError> {
        tracing::info!(
            max_batch_size = config.max_batch_size,
            min_candidate_size = config.min_candidate_size,
            concurrency = config.concurrency,
            "Initializing drop queue services..."
        );

        let (events, _rx) = event_channel();
        let queue = Arc::new(JobQueue::new(collaborators.engine, events.clone()));
        let operations = Arc::new(OperationRegistry::new(events.clone()));
        let listeners = Arc::new(ListenerRegistry::new());

        let (supervisor, _handle) = start_supervisor(SupervisorArgs {
            queue: queue.clone(),
            events: events.clone(),
            listeners: listeners.clone(),
            concurrency: config.concurrency,
            coalesce_window: config.coalesce_window(),
        })
        .await
        .map_err(|e| ApiError::Runtime(format!("Failed to start supervisor: {}", e)))?;

        let services = Self {
            resolver: ContentResolver::new(collaborators.lookup),
            gate: AdmissionGate::new(config.clone()),
            selector: TargetProfileSelector::new(
                collaborators.targets.clone(),
                collaborators.chooser,
            ),
            limiter: Arc::new(ThroughputLimiter::new(config.max_bytes_per_sec)),
            targets: collaborators.targets,
            config,
            queue,
            operations,
            listeners,
            events,
            supervisor,
        };

        tracing::info!("Drop queue services initialized");
        Ok(services)
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn operations(&self) -> &Arc<OperationRegistry> {
        &self.operations
    }

    pub fn targets(&self) -> &Arc<TargetRegistry> {
        &self.targets
    }

    /// Shared limiter engines draw from before moving data.
    pub fn limiter(&self) -> Arc<ThroughputLimiter> {
        self.limiter.clone()
    }

    /// Ask the scheduler to fill free slots now instead of on its next tick.
    pub fn wake_scheduler(&self) {
        if let Err(e) = self.supervisor.send_message(SupervisorMessage::WakeScheduler) {
            tracing::warn!("Failed to wake scheduler: {}", e);
        }
    }

    /// Stop the actor runtime. Pending coalesced notifications are delivered.
    pub async fn shutdown(&self) -> Result<(), ApiError> {
        self.flush_notifications().await?;
        self.supervisor
            .send_message(SupervisorMessage::Shutdown)
            .map_err(|e| ApiError::Runtime(format!("Failed to send message: {}", e)))?;
        tracing::info!("Drop queue services stopped");
        Ok(())
    }
}
