//! Message types for actor communication.

use dropq_core::QueueEvent;
use ractor::RpcReplyPort;

/// Messages for the NotifierActor.
#[derive(Debug)]
pub enum NotifierMessage {
    /// An event forwarded from the broadcast channel.
    Event(Box<QueueEvent>),

    /// The forwarder fell behind and skipped this many events.
    Lagged(u64),

    /// Deliver any coalesced notifications now.
    Flush { reply: RpcReplyPort<()> },

    /// Coalescing window elapsed.
    Tick,
}

/// Messages for the SchedulerActor.
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Jobs may be startable; fill free slots now.
    Wake,

    /// Number of jobs currently running.
    RunningCount { reply: RpcReplyPort<usize> },

    /// Periodic tick.
    Heartbeat,
}

/// Messages for the Supervisor.
#[derive(Debug)]
pub enum SupervisorMessage {
    /// Forward a wake-up to the scheduler.
    WakeScheduler,

    /// Deliver coalesced notifications and wait for them.
    FlushNotifications { reply: RpcReplyPort<()> },

    /// Stop all children, then the supervisor.
    Shutdown,
}
