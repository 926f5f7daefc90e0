//! Background operations and the registry that tracks them.
//!
//! Operations are created by other subsystems (disk allocation, checking,
//! export, copy, move). The registry only mediates user control: every
//! action is gated on the operation's current state and on the states it
//! declares support for.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::{ControlError, OperationControls, QueueEvent};

/// Unique identifier for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub Ulid);

impl OperationId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Allocation,
    Verification,
    Export,
    Copy,
    Move,
    Other,
}

impl OperationKind {
    /// Filesystem operations shown in the disk operations listing.
    pub fn is_disk_op(&self) -> bool {
        !matches!(self, OperationKind::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Allocation => "allocation",
            OperationKind::Verification => "verification",
            OperationKind::Export => "export",
            OperationKind::Copy => "copy",
            OperationKind::Move => "move",
            OperationKind::Other => "other",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    #[default]
    None,
    Queued,
    Pause,
    Resume,
    Cancel,
}

impl TaskState {
    pub fn bit(&self) -> u8 {
        match self {
            TaskState::None => 1,
            TaskState::Queued => 1 << 1,
            TaskState::Pause => 1 << 2,
            TaskState::Resume => 1 << 3,
            TaskState::Cancel => 1 << 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::None => "none",
            TaskState::Queued => "queued",
            TaskState::Pause => "pause",
            TaskState::Resume => "resume",
            TaskState::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bitmask of the task states an operation can enter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupportedStates(pub u8);

impl SupportedStates {
    pub const ALL: SupportedStates = SupportedStates(0b1_1111);

    pub fn of(states: &[TaskState]) -> Self {
        Self(states.iter().fold(0, |acc, s| acc | s.bit()))
    }

    pub fn contains(&self, state: TaskState) -> bool {
        self.0 & state.bit() != 0
    }
}

impl From<TaskState> for SupportedStates {
    fn from(state: TaskState) -> Self {
        Self(state.bit())
    }
}

impl std::ops::BitOr for SupportedStates {
    type Output = SupportedStates;

    fn bitor(self, rhs: Self) -> Self::Output {
        SupportedStates(self.0 | rhs.0)
    }
}

impl std::ops::BitOr<TaskState> for SupportedStates {
    type Output = SupportedStates;

    fn bitor(self, rhs: TaskState) -> Self::Output {
        SupportedStates(self.0 | rhs.bit())
    }
}

/// A user control on an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationAction {
    Pause,
    Resume,
    /// Hand a user-paused operation back to the scheduler.
    Schedule,
    Cancel,
    /// Pause or resume, whichever most of the selection supports.
    Toggle,
}

impl OperationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationAction::Pause => "pause",
            OperationAction::Resume => "resume",
            OperationAction::Schedule => "schedule",
            OperationAction::Cancel => "cancel",
            OperationAction::Toggle => "toggle",
        }
    }
}

/// Point-in-time view of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub id: OperationId,
    pub name: String,
    pub kind: OperationKind,
    pub state: TaskState,
    pub auto_pause: bool,
    pub supported: SupportedStates,
}

impl OperationSnapshot {
    pub fn can_pause(&self) -> bool {
        self.supported.contains(TaskState::Pause)
            && match self.state {
                TaskState::None | TaskState::Queued => true,
                TaskState::Pause => self.auto_pause,
                _ => false,
            }
    }

    pub fn can_resume(&self) -> bool {
        self.supported.contains(TaskState::Resume) && self.state == TaskState::Pause
    }

    pub fn can_schedule(&self) -> bool {
        self.supported.contains(TaskState::Resume)
            && self.state == TaskState::Pause
            && !self.auto_pause
    }

    pub fn can_cancel(&self) -> bool {
        self.supported.contains(TaskState::Cancel) && self.state != TaskState::Cancel
    }

    pub fn allows(&self, action: OperationAction) -> bool {
        match action {
            OperationAction::Pause => self.can_pause(),
            OperationAction::Resume => self.can_resume(),
            OperationAction::Schedule => self.can_schedule(),
            OperationAction::Cancel => self.can_cancel(),
            OperationAction::Toggle => self.can_pause() || self.can_resume(),
        }
    }
}

#[derive(Debug)]
struct OperationInner {
    state: TaskState,
    auto_pause: bool,
}

/// A pausable, cancellable background unit of work.
#[derive(Debug)]
pub struct Operation {
    id: OperationId,
    name: String,
    kind: OperationKind,
    supported: SupportedStates,
    inner: Mutex<OperationInner>,
}

impl Operation {
    pub fn new(name: impl Into<String>, kind: OperationKind, supported: SupportedStates) -> Self {
        Self {
            id: OperationId::new(),
            name: name.into(),
            kind,
            supported,
            inner: Mutex::new(OperationInner {
                state: TaskState::None,
                auto_pause: false,
            }),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn supported(&self) -> SupportedStates {
        self.supported
    }

    pub fn state(&self) -> TaskState {
        self.inner.lock().state
    }

    pub fn auto_pause(&self) -> bool {
        self.inner.lock().auto_pause
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        let inner = self.inner.lock();
        self.snapshot_of(&inner)
    }

    fn snapshot_of(&self, inner: &OperationInner) -> OperationSnapshot {
        OperationSnapshot {
            id: self.id,
            name: self.name.clone(),
            kind: self.kind,
            state: inner.state,
            auto_pause: inner.auto_pause,
            supported: self.supported,
        }
    }

    /// Apply a user action. The check and the change happen under one lock.
    fn apply(&self, action: OperationAction) -> Result<OperationSnapshot, ControlError> {
        let mut inner = self.inner.lock();
        let current = self.snapshot_of(&inner);

        let action = match action {
            OperationAction::Toggle if current.can_pause() => OperationAction::Pause,
            OperationAction::Toggle => OperationAction::Resume,
            other => other,
        };
        if !current.allows(action) {
            return Err(ControlError::illegal(action.as_str(), inner.state));
        }

        match action {
            OperationAction::Pause if inner.state == TaskState::Pause => {
                // Scheduled pause becomes a user pause.
                inner.auto_pause = false;
            }
            OperationAction::Pause => inner.state = TaskState::Pause,
            OperationAction::Resume | OperationAction::Toggle => {
                inner.state = TaskState::Resume;
                inner.auto_pause = false;
            }
            OperationAction::Schedule => inner.auto_pause = true,
            OperationAction::Cancel => inner.state = TaskState::Cancel,
        }
        Ok(self.snapshot_of(&inner))
    }

    /// Move to a state on behalf of the creating component.
    ///
    /// Rejected once cancelled or when the state is not supported.
    fn set_state(&self, state: TaskState) -> Result<OperationSnapshot, ControlError> {
        let mut inner = self.inner.lock();
        if inner.state == TaskState::Cancel || !self.supported.contains(state) {
            return Err(ControlError::illegal("set state", inner.state));
        }
        inner.state = state;
        if state != TaskState::Pause {
            inner.auto_pause = false;
        }
        Ok(self.snapshot_of(&inner))
    }

    fn set_auto_pause(&self, auto_pause: bool) -> OperationSnapshot {
        let mut inner = self.inner.lock();
        inner.auto_pause = auto_pause;
        self.snapshot_of(&inner)
    }
}

/// All live operations. Constructed once and shared.
pub struct OperationRegistry {
    ops: RwLock<Vec<Arc<Operation>>>,
    events: broadcast::Sender<QueueEvent>,
}

impl OperationRegistry {
    pub fn new(events: broadcast::Sender<QueueEvent>) -> Self {
        Self {
            ops: RwLock::new(Vec::new()),
            events,
        }
    }

    pub fn add(&self, operation: Operation) -> Arc<Operation> {
        let operation = Arc::new(operation);
        self.ops.write().push(operation.clone());
        tracing::debug!(id = %operation.id, kind = %operation.kind, "Operation added");
        self.emit(QueueEvent::OperationAdded {
            operation_id: operation.id,
            kind: operation.kind,
            name: operation.name.clone(),
            timestamp: Utc::now(),
        });
        operation
    }

    /// Drop an operation. Called by its creator once the work is over.
    pub fn remove(&self, id: OperationId) -> Result<Arc<Operation>, ControlError> {
        let removed = {
            let mut ops = self.ops.write();
            let pos = ops
                .iter()
                .position(|op| op.id == id)
                .ok_or(ControlError::OperationNotFound(id))?;
            ops.remove(pos)
        };
        tracing::debug!(%id, "Operation removed");
        self.emit(QueueEvent::OperationRemoved {
            operation_id: id,
            timestamp: Utc::now(),
        });
        Ok(removed)
    }

    pub fn get(&self, id: OperationId) -> Option<Arc<Operation>> {
        self.ops.read().iter().find(|op| op.id == id).cloned()
    }

    pub fn list(&self) -> Vec<OperationSnapshot> {
        self.ops.read().iter().map(|op| op.snapshot()).collect()
    }

    pub fn disk_ops(&self) -> Vec<OperationSnapshot> {
        self.ops
            .read()
            .iter()
            .filter(|op| op.kind.is_disk_op())
            .map(|op| op.snapshot())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ops.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.read().is_empty()
    }

    /// Apply a user action to one operation.
    pub fn control(
        &self,
        id: OperationId,
        action: OperationAction,
    ) -> Result<OperationSnapshot, ControlError> {
        let op = self.get(id).ok_or(ControlError::OperationNotFound(id))?;
        let snapshot = op.apply(action)?;
        tracing::debug!(%id, action = action.as_str(), state = %snapshot.state, "Operation control");
        self.emit_changed(&snapshot);
        Ok(snapshot)
    }

    /// Creator-side state change.
    pub fn set_state(
        &self,
        id: OperationId,
        state: TaskState,
    ) -> Result<OperationSnapshot, ControlError> {
        let op = self.get(id).ok_or(ControlError::OperationNotFound(id))?;
        let snapshot = op.set_state(state)?;
        self.emit_changed(&snapshot);
        Ok(snapshot)
    }

    /// Creator-side scheduling flag.
    pub fn set_auto_pause(
        &self,
        id: OperationId,
        auto_pause: bool,
    ) -> Result<OperationSnapshot, ControlError> {
        let op = self.get(id).ok_or(ControlError::OperationNotFound(id))?;
        let snapshot = op.set_auto_pause(auto_pause);
        self.emit_changed(&snapshot);
        Ok(snapshot)
    }

    /// Enablement for a selection of operations. Unknown ids are ignored.
    pub fn controls(&self, selection: &[OperationId]) -> OperationControls {
        let snapshots: Vec<_> = selection
            .iter()
            .filter_map(|id| self.get(*id))
            .map(|op| op.snapshot())
            .collect();
        OperationControls::from_snapshots(&snapshots)
    }

    /// Apply an action to every eligible operation in the selection.
    ///
    /// Returns the ids the action was applied to.
    pub fn apply(&self, selection: &[OperationId], action: OperationAction) -> Vec<OperationId> {
        let controls = self.controls(selection);
        let (action, eligible) = match action {
            OperationAction::Toggle => match controls.toggle() {
                Some(resolved) => (resolved, controls.eligible(resolved).to_vec()),
                None => return Vec::new(),
            },
            other => (other, controls.eligible(other).to_vec()),
        };

        eligible
            .into_iter()
            .filter(|id| match self.control(*id, action) {
                Ok(_) => true,
                Err(e) => {
                    // State moved between the check and the action.
                    tracing::debug!(%id, error = %e, "Operation control skipped");
                    false
                }
            })
            .collect()
    }

    fn emit_changed(&self, snapshot: &OperationSnapshot) {
        self.emit(QueueEvent::OperationChanged {
            operation_id: snapshot.id,
            state: snapshot.state,
            auto_pause: snapshot.auto_pause,
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: QueueEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_channel;

    fn registry() -> OperationRegistry {
        let (tx, _rx) = event_channel();
        OperationRegistry::new(tx)
    }

    #[test]
    fn cancel_without_support_is_rejected() {
        let ops = registry();
        let op = ops.add(Operation::new(
            "alloc",
            OperationKind::Allocation,
            SupportedStates::of(&[TaskState::None, TaskState::Pause, TaskState::Resume]),
        ));

        let err = ops.control(op.id(), OperationAction::Cancel).unwrap_err();
        assert!(err.is_illegal_transition());
        assert_eq!(op.state(), TaskState::None);
    }

    #[test]
    fn pause_on_scheduled_pause_clears_auto_pause_only() -> Result<(), ControlError> {
        let ops = registry();
        let op = ops.add(Operation::new("check", OperationKind::Verification, SupportedStates::ALL));
        ops.set_state(op.id(), TaskState::Pause)?;
        ops.set_auto_pause(op.id(), true)?;

        let snap = ops.control(op.id(), OperationAction::Pause)?;
        assert_eq!(snap.state, TaskState::Pause);
        assert!(!snap.auto_pause);

        // A user pause can be handed back to the scheduler once.
        assert!(snap.can_schedule());
        let snap = ops.control(op.id(), OperationAction::Schedule)?;
        assert!(snap.auto_pause);
        assert!(!snap.can_schedule());
        Ok(())
    }

    #[test]
    fn cancel_is_terminal() -> Result<(), ControlError> {
        let ops = registry();
        let op = ops.add(Operation::new("copy", OperationKind::Copy, SupportedStates::ALL));
        ops.control(op.id(), OperationAction::Cancel)?;

        assert!(ops.control(op.id(), OperationAction::Cancel).is_err());
        assert!(ops.set_state(op.id(), TaskState::Queued).is_err());
        assert_eq!(op.state(), TaskState::Cancel);
        Ok(())
    }

    #[test]
    fn disk_ops_excludes_other_kinds() {
        let ops = registry();
        ops.add(Operation::new("move", OperationKind::Move, SupportedStates::ALL));
        ops.add(Operation::new("misc", OperationKind::Other, SupportedStates::ALL));
        assert_eq!(ops.list().len(), 2);
        assert_eq!(ops.disk_ops().len(), 1);
    }
}
