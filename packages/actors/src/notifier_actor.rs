//! Notifier actor: fans committed events out to listeners.
//!
//! Job events are delivered as they arrive. Operation adds and removes come
//! in bursts, so they are counted and delivered as one
//! `OperationsRefreshed` per coalescing window. A burst always ends with a
//! trailing notification.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dropq_core::QueueEvent;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::listeners::ListenerRegistry;
use crate::messages::NotifierMessage;

/// Counts operation churn between window ticks.
#[derive(Debug, Default)]
pub struct Coalescer {
    pending: usize,
}

impl Coalescer {
    /// Absorb a churn event. Returns `false` for events that pass through.
    pub fn absorb(&mut self, event: &QueueEvent) -> bool {
        if event.is_operation_churn() {
            self.pending += 1;
            true
        } else {
            false
        }
    }

    /// The coalesced notification for the window just ended, if any.
    pub fn flush(&mut self) -> Option<QueueEvent> {
        if self.pending == 0 {
            return None;
        }
        let count = std::mem::take(&mut self.pending);
        Some(QueueEvent::OperationsRefreshed {
            count,
            timestamp: Utc::now(),
        })
    }

    pub fn pending(&self) -> usize {
        self.pending
    }
}

/// Notifier actor arguments.
pub struct NotifierArgs {
    pub events: broadcast::Sender<QueueEvent>,
    pub listeners: Arc<ListenerRegistry>,
    pub window: Duration,
}

/// State for the notifier actor.
pub struct NotifierState {
    listeners: Arc<ListenerRegistry>,
    coalescer: Coalescer,
    forwarder: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl NotifierState {
    fn deliver(&self, event: &QueueEvent) {
        tracing::trace!(event = %event.description(), "Dispatching event");
        self.listeners.dispatch(event);
    }

    fn flush(&mut self) {
        if let Some(event) = self.coalescer.flush() {
            self.deliver(&event);
        }
    }
}

/// Notifier actor that delivers events off the transition path.
pub struct NotifierActor;

impl Actor for NotifierActor {
    type Msg = NotifierMessage;
    type State = NotifierState;
    type Arguments = NotifierArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(window_ms = args.window.as_millis() as u64, "Starting notifier");

        // Forward the broadcast channel into the mailbox
        let mut rx = args.events.subscribe();
        let forward_to = myself.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                let msg = match rx.recv().await {
                    Ok(event) => NotifierMessage::Event(Box::new(event)),
                    Err(RecvError::Lagged(skipped)) => NotifierMessage::Lagged(skipped),
                    Err(RecvError::Closed) => break,
                };
                if forward_to.send_message(msg).is_err() {
                    break;
                }
            }
        });

        // Window ticks
        let tick_to = myself.clone();
        let window = args.window.max(Duration::from_millis(1));
        let ticker = tokio::spawn(async move {
            let mut interval = tokio::time::interval(window);
            loop {
                interval.tick().await;
                if tick_to.send_message(NotifierMessage::Tick).is_err() {
                    break;
                }
            }
        });

        Ok(NotifierState {
            listeners: args.listeners,
            coalescer: Coalescer::default(),
            forwarder,
            ticker,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            NotifierMessage::Event(event) => {
                if !state.coalescer.absorb(&event) {
                    state.deliver(&event);
                }
            }

            NotifierMessage::Lagged(skipped) => {
                tracing::warn!(skipped, "Notifier lagged, requesting full refresh");
                state.coalescer = Coalescer::default();
                state.deliver(&QueueEvent::Resync {
                    timestamp: Utc::now(),
                });
            }

            NotifierMessage::Flush { reply } => {
                state.flush();
                let _ = reply.send(());
            }

            NotifierMessage::Tick => state.flush(),
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.forwarder.abort();
        state.ticker.abort();
        state.flush();
        tracing::info!("Notifier stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropq_core::{OperationId, OperationKind};

    fn added() -> QueueEvent {
        QueueEvent::OperationAdded {
            operation_id: OperationId::new(),
            kind: OperationKind::Copy,
            name: "copy".into(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn burst_collapses_into_one_refresh() {
        let mut coalescer = Coalescer::default();
        for _ in 0..5 {
            assert!(coalescer.absorb(&added()));
        }
        assert!(!coalescer.absorb(&QueueEvent::Resync {
            timestamp: Utc::now()
        }));

        match coalescer.flush() {
            Some(QueueEvent::OperationsRefreshed { count, .. }) => assert_eq!(count, 5),
            other => panic!("unexpected {other:?}"),
        }
        assert!(coalescer.flush().is_none());
    }
}
