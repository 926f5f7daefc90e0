//! Actor runtime for the drop queue.
//!
//! The core crate commits state changes synchronously and publishes them on a
//! broadcast channel. This crate runs the pieces that react to those changes:
//!
//! - `Supervisor` - Owns the other actors and restarts them on failure
//! - `NotifierActor` - Delivers events to registered listeners, coalescing
//!   operation churn
//! - `SchedulerActor` - Starts queued jobs up to the concurrency limit
//!
//! # Usage
//!
//! ```ignore
//! use dropq_actors::{ListenerRegistry, SupervisorArgs, SupervisorMessage, start_supervisor};
//!
//! let (supervisor, handle) = start_supervisor(args).await?;
//! supervisor.send_message(SupervisorMessage::WakeScheduler)?;
//! ```

mod listeners;
mod messages;
mod notifier_actor;
mod scheduler_actor;
mod supervisor;

pub use listeners::{ListenerId, ListenerRegistry, QueueListener};
pub use messages::{NotifierMessage, SchedulerMessage, SupervisorMessage};
pub use notifier_actor::{Coalescer, NotifierActor, NotifierArgs};
pub use scheduler_actor::{HEARTBEAT_INTERVAL, SchedulerActor, SchedulerArgs};
pub use supervisor::{Supervisor, SupervisorArgs, start_supervisor};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
