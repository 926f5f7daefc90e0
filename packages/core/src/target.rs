//! Targets, their processing profiles and the per-target choice memo.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier of the sentinel "do not transcode" profile.
pub const BLANK_PROFILE_ID: &str = "blank";

/// Unique identifier for a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a profile within a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(pub String);

impl ProfileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ProfileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether jobs against a target get processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeRequirement {
    Always,
    Never,
    #[default]
    WhenRequired,
}

impl std::fmt::Display for TranscodeRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscodeRequirement::Always => write!(f, "always"),
            TranscodeRequirement::Never => write!(f, "never"),
            TranscodeRequirement::WhenRequired => write!(f, "when_required"),
        }
    }
}

/// A named processing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub name: String,
    /// Position in chooser listings, lower first.
    #[serde(default)]
    pub icon_order: i32,
}

impl Profile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ProfileId::new(id),
            name: name.into(),
            icon_order: 0,
        }
    }

    pub fn with_icon_order(mut self, icon_order: i32) -> Self {
        self.icon_order = icon_order;
        self
    }

    /// The sentinel profile that suppresses processing.
    pub fn blank() -> Self {
        Self {
            id: ProfileId::new(BLANK_PROFILE_ID),
            name: "Do not transcode".to_string(),
            icon_order: i32::MAX,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.id.0 == BLANK_PROFILE_ID
    }
}

#[derive(Debug, Clone)]
struct TargetPrefs {
    requirement: TranscodeRequirement,
    default_profile: Option<ProfileId>,
}

/// A destination that jobs are queued against.
///
/// Identity and profiles are fixed; the requirement and the remembered
/// default profile are written back by the chooser.
#[derive(Debug)]
pub struct Target {
    id: TargetId,
    name: String,
    profiles: Vec<Profile>,
    prefs: RwLock<TargetPrefs>,
}

impl Target {
    pub fn new(id: impl Into<String>, name: impl Into<String>, profiles: Vec<Profile>) -> Self {
        Self {
            id: TargetId::new(id),
            name: name.into(),
            profiles,
            prefs: RwLock::new(TargetPrefs {
                requirement: TranscodeRequirement::default(),
                default_profile: None,
            }),
        }
    }

    pub fn with_requirement(self, requirement: TranscodeRequirement) -> Self {
        self.prefs.write().requirement = requirement;
        self
    }

    pub fn with_default_profile(self, profile: ProfileId) -> Self {
        self.prefs.write().default_profile = Some(profile);
        self
    }

    pub fn id(&self) -> &TargetId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.profiles
    }

    /// Profiles in chooser order: icon order, then name.
    pub fn sorted_profiles(&self) -> Vec<Profile> {
        let mut profiles = self.profiles.clone();
        profiles.sort_by(|a, b| {
            a.icon_order
                .cmp(&b.icon_order)
                .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        profiles
    }

    pub fn blank_profile(&self) -> Profile {
        Profile::blank()
    }

    pub fn requirement(&self) -> TranscodeRequirement {
        self.prefs.read().requirement
    }

    pub fn set_requirement(&self, requirement: TranscodeRequirement) {
        self.prefs.write().requirement = requirement;
    }

    /// The remembered default profile, if it still exists on this target.
    pub fn default_profile(&self) -> Option<Profile> {
        let id = self.prefs.read().default_profile.clone()?;
        if id.0 == BLANK_PROFILE_ID {
            return Some(Profile::blank());
        }
        self.profiles.iter().find(|p| p.id == id).cloned()
    }

    pub fn set_default_profile(&self, profile: Option<&Profile>) {
        self.prefs.write().default_profile = profile.map(|p| p.id.clone());
    }

    /// Persist a "remember this choice" decision.
    ///
    /// A `Never` choice only records the requirement.
    pub fn remember(&self, profile: &Profile, requirement: TranscodeRequirement) {
        let mut prefs = self.prefs.write();
        if requirement != TranscodeRequirement::Never {
            prefs.default_profile = Some(profile.id.clone());
        }
        prefs.requirement = requirement;
    }

    /// Whether the target can be offered in a target chooser.
    pub fn is_selectable(&self) -> bool {
        !self.profiles.is_empty() || self.requirement() == TranscodeRequirement::Never
    }

    pub fn spec(&self) -> TargetSpec {
        let prefs = self.prefs.read();
        TargetSpec {
            id: self.id.clone(),
            name: self.name.clone(),
            profiles: self.profiles.clone(),
            requirement: prefs.requirement,
            default_profile: prefs.default_profile.clone(),
        }
    }
}

/// Serializable description of a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub id: TargetId,
    pub name: String,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub requirement: TranscodeRequirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<ProfileId>,
}

impl From<TargetSpec> for Target {
    fn from(spec: TargetSpec) -> Self {
        Target {
            id: spec.id,
            name: spec.name,
            profiles: spec.profiles,
            prefs: RwLock::new(TargetPrefs {
                requirement: spec.requirement,
                default_profile: spec.default_profile,
            }),
        }
    }
}

/// The set of known targets, injected wherever targets are looked up.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: RwLock<Vec<Arc<Target>>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target, replacing any existing target with the same id.
    pub fn register(&self, target: Target) -> Arc<Target> {
        let target = Arc::new(target);
        let mut targets = self.targets.write();
        targets.retain(|t| t.id != target.id);
        targets.push(target.clone());
        target
    }

    pub fn unregister(&self, id: &TargetId) -> Option<Arc<Target>> {
        let mut targets = self.targets.write();
        let pos = targets.iter().position(|t| &t.id == id)?;
        Some(targets.remove(pos))
    }

    pub fn get(&self, id: &TargetId) -> Option<Arc<Target>> {
        self.targets.read().iter().find(|t| &t.id == id).cloned()
    }

    pub fn list(&self) -> Vec<Arc<Target>> {
        self.targets.read().clone()
    }

    /// Targets that may be offered for selection, sorted by name.
    pub fn selectable(&self) -> Vec<Arc<Target>> {
        let mut targets: Vec<_> = self
            .targets
            .read()
            .iter()
            .filter(|t| t.is_selectable())
            .cloned()
            .collect();
        targets.sort_by_key(|t| t.name.to_lowercase());
        targets
    }
}
