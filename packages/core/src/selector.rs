//! Resolves the target, profile and processing requirement for a batch.
//!
//! The selector prompts only when it has to. A target set to `Never`, a
//! remembered default profile or a target with a single profile are all
//! resolved without asking. Otherwise the [`Chooser`] is consulted.
//!
//! With no pre-selected target a dismissed prompt is shown once more
//! before the drop is abandoned. With a pre-selected target the first
//! dismissal abandons.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::{AdmissionError, Profile, Target, TargetRegistry, TranscodeRequirement};

/// Future returned by chooser prompts.
pub type ChooserFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Interactive prompts shown to the user.
pub trait Chooser: Send + Sync + 'static {
    /// Pick a target. `None` means the prompt was dismissed.
    fn choose_target<'a>(
        &'a self,
        targets: &'a [Arc<Target>],
    ) -> ChooserFuture<'a, Option<Arc<Target>>>;

    /// Pick a profile, requirement and whether to remember the choice.
    ///
    /// `profiles` is in display order and ends with the blank profile.
    fn choose_profile<'a>(
        &'a self,
        target: &'a Target,
        profiles: &'a [Profile],
    ) -> ChooserFuture<'a, ProfileChoice>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileChoice {
    Selected {
        profile: Profile,
        requirement: TranscodeRequirement,
        remember: bool,
    },
    Dismissed,
}

/// The resolved destination for every job in a batch.
#[derive(Debug, Clone)]
pub struct Selection {
    pub target: Arc<Target>,
    pub profile: Profile,
    pub requirement: TranscodeRequirement,
}

/// Identifies one dropped batch while its selection is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub Ulid);

impl BatchId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    AwaitingSelection,
    Retrying,
    Abandoned,
    Resolved,
}

/// Retry bookkeeping for one selection attempt.
#[derive(Debug, Clone)]
pub struct SelectionFlow {
    state: FlowState,
    retries: u8,
    max_retries: u8,
}

impl SelectionFlow {
    pub fn new(preselected: bool) -> Self {
        Self {
            state: FlowState::AwaitingSelection,
            retries: 0,
            max_retries: if preselected { 0 } else { 1 },
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Record a dismissal and return the next state.
    pub fn dismissed(&mut self) -> FlowState {
        self.state = if self.retries < self.max_retries {
            self.retries += 1;
            FlowState::Retrying
        } else {
            FlowState::Abandoned
        };
        self.state
    }

    pub fn resolved(&mut self) {
        self.state = FlowState::Resolved;
    }
}

/// Releases a batch id when its selection ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<BatchId>>,
    batch: BatchId,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<BatchId>>, batch: BatchId) -> Result<Self, AdmissionError> {
        if !set.lock().insert(batch) {
            return Err(AdmissionError::SelectionInFlight);
        }
        Ok(Self { set, batch })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.batch);
    }
}

pub struct TargetProfileSelector {
    targets: Arc<TargetRegistry>,
    chooser: Arc<dyn Chooser>,
    in_flight: Mutex<HashSet<BatchId>>,
}

impl TargetProfileSelector {
    pub fn new(targets: Arc<TargetRegistry>, chooser: Arc<dyn Chooser>) -> Self {
        Self {
            targets,
            chooser,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn targets(&self) -> &Arc<TargetRegistry> {
        &self.targets
    }

    /// Resolve the selection for a batch, prompting if needed.
    pub async fn resolve(
        &self,
        batch: BatchId,
        preselected: Option<Arc<Target>>,
    ) -> Result<Selection, AdmissionError> {
        let _guard = InFlight::acquire(&self.in_flight, batch)?;
        let mut flow = SelectionFlow::new(preselected.is_some());

        loop {
            let target = match &preselected {
                Some(target) => Some(target.clone()),
                None => {
                    let targets = self.targets.selectable();
                    if targets.is_empty() {
                        return Err(AdmissionError::NoTargets);
                    }
                    self.chooser.choose_target(&targets).await
                }
            };

            let selection = match target {
                Some(target) => self.resolve_profile(target).await?,
                None => None,
            };

            match selection {
                Some(selection) => {
                    flow.resolved();
                    tracing::debug!(
                        %batch,
                        target = %selection.target.id(),
                        profile = %selection.profile.id,
                        requirement = %selection.requirement,
                        "Selection resolved"
                    );
                    return Ok(selection);
                }
                None => {
                    if flow.dismissed() == FlowState::Abandoned {
                        tracing::info!(%batch, "Selection dismissed, drop abandoned");
                        return Err(AdmissionError::SelectionAbandoned);
                    }
                    tracing::debug!(%batch, "Selection dismissed, asking again");
                }
            }
        }
    }

    /// `Ok(None)` when the profile prompt was dismissed.
    async fn resolve_profile(
        &self,
        target: Arc<Target>,
    ) -> Result<Option<Selection>, AdmissionError> {
        let requirement = target.requirement();
        if requirement == TranscodeRequirement::Never {
            return Ok(Some(Selection {
                profile: target.blank_profile(),
                target,
                requirement,
            }));
        }

        if let Some(profile) = target.default_profile() {
            let requirement = if profile.is_blank() {
                TranscodeRequirement::Never
            } else {
                requirement
            };
            return Ok(Some(Selection {
                target,
                profile,
                requirement,
            }));
        }

        let profiles = target.profiles();
        if profiles.is_empty() {
            return Err(AdmissionError::NoProfiles(target.name().to_string()));
        }
        if profiles.len() == 1 {
            let profile = profiles[0].clone();
            return Ok(Some(Selection {
                target,
                profile,
                requirement,
            }));
        }

        let mut offered = target.sorted_profiles();
        offered.push(target.blank_profile());

        match self.chooser.choose_profile(&target, &offered).await {
            ProfileChoice::Dismissed => Ok(None),
            ProfileChoice::Selected {
                profile,
                requirement,
                remember,
            } => {
                let requirement = if profile.is_blank() {
                    TranscodeRequirement::Never
                } else {
                    requirement
                };
                if remember {
                    target.remember(&profile, requirement);
                }
                Ok(Some(Selection {
                    target,
                    profile,
                    requirement,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_retries_once_without_preselection() {
        let mut flow = SelectionFlow::new(false);
        assert_eq!(flow.state(), FlowState::AwaitingSelection);
        assert_eq!(flow.dismissed(), FlowState::Retrying);
        assert_eq!(flow.dismissed(), FlowState::Abandoned);
    }

    #[test]
    fn flow_abandons_immediately_with_preselection() {
        let mut flow = SelectionFlow::new(true);
        assert_eq!(flow.dismissed(), FlowState::Abandoned);
    }
}
