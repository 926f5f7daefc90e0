//! Host-side collaborators for running the queue from a terminal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dropq_api::Services;
use dropq_core::{
    Artifact, Chooser, ChooserFuture, ContentFile, ContentHash, ContentLookup, ContentRef,
    EngineFailure, ExecutionEngine, Job, JobId, JobOutcome, Profile, ProfileChoice, ProfileId,
    Target, TargetId, TargetRegistry, TargetSpec, TranscodeRequirement,
};
use tokio::sync::mpsc;

/// Answers every prompt from command line flags instead of asking.
pub struct PresetChooser {
    pub target: Option<TargetId>,
    pub profile: Option<ProfileId>,
    pub requirement: TranscodeRequirement,
}

impl Chooser for PresetChooser {
    fn choose_target<'a>(
        &'a self,
        targets: &'a [Arc<Target>],
    ) -> ChooserFuture<'a, Option<Arc<Target>>> {
        Box::pin(async move {
            match &self.target {
                Some(wanted) => targets.iter().find(|t| t.id() == wanted).cloned(),
                None => targets.first().cloned(),
            }
        })
    }

    fn choose_profile<'a>(
        &'a self,
        _target: &'a Target,
        profiles: &'a [Profile],
    ) -> ChooserFuture<'a, ProfileChoice> {
        Box::pin(async move {
            let chosen = match &self.profile {
                Some(wanted) => profiles.iter().find(|p| &p.id == wanted),
                None => profiles.iter().find(|p| !p.is_blank()),
            };
            match chosen {
                Some(profile) => ProfileChoice::Selected {
                    profile: profile.clone(),
                    requirement: self.requirement,
                    remember: false,
                },
                None => ProfileChoice::Dismissed,
            }
        })
    }
}

/// No content layer: hash references are dropped.
pub struct EmptyLookup;

impl ContentLookup for EmptyLookup {
    fn resolve_content_by_hash(&self, _hash: &ContentHash) -> Option<Vec<ContentFile>> {
        None
    }

    fn lookup_file_by_index(&self, _hash: &ContentHash, _index: u32) -> Option<ContentFile> {
        None
    }
}

/// Pretends to process jobs by writing a marker file per job.
pub struct SimulatedEngine {
    started: mpsc::UnboundedSender<JobId>,
    output_dir: PathBuf,
}

impl SimulatedEngine {
    pub fn new(output_dir: PathBuf) -> (Self, mpsc::UnboundedReceiver<JobId>) {
        let (started, rx) = mpsc::unbounded_channel();
        (
            Self {
                started,
                output_dir,
            },
            rx,
        )
    }
}

impl ExecutionEngine for SimulatedEngine {
    fn start_job(&self, job: &Job) -> Result<(), EngineFailure> {
        self.started
            .send(job.id)
            .map_err(|_| EngineFailure::new("simulated engine stopped"))
    }

    fn is_pausable(&self, _job: &Job) -> bool {
        false
    }

    fn produce_artifact(&self, job: &Job) -> Artifact {
        let stem = job.source.display_name().replace(['/', ':'], "_");
        Artifact::new(self.output_dir.join(format!("{}-{}.out", stem, job.id)))
    }
}

/// Complete started jobs, drawing their size from the throughput limiter.
pub async fn run_simulation(
    services: Arc<Services>,
    mut started: mpsc::UnboundedReceiver<JobId>,
    work: Duration,
) {
    let limiter = services.limiter();
    while let Some(id) = started.recv().await {
        let Some(job) = services.queue().lookup(id) else {
            continue;
        };

        let bytes = match &job.source {
            ContentRef::LocalFile { path } | ContentRef::Artifact { path } => {
                tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
            }
            _ => 0,
        };
        // Pass-through jobs only get their marker written.
        if job.needs_processing() {
            limiter.acquire(bytes).await;
            tokio::time::sleep(work).await;
        }

        let result = match &job.artifact {
            Some(artifact) => tokio::fs::write(artifact.path(), job.source.to_string()).await,
            None => Ok(()),
        };
        let settled = match result {
            Ok(()) => services
                .complete_job(id, JobOutcome::new(format!("{} bytes processed", bytes)))
                .map(|_| ()),
            Err(e) => services.fail_job(id, EngineFailure::new(e.to_string())),
        };
        if let Err(e) = settled {
            tracing::warn!(%id, "Simulated job could not be settled: {}", e);
        }
    }
}

/// Load target definitions from a JSON file holding an array of targets.
pub fn load_targets(path: Option<&Path>) -> anyhow::Result<Arc<TargetRegistry>> {
    let registry = TargetRegistry::new();
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading targets from {}", path.display()))?;
            let specs: Vec<TargetSpec> = serde_json::from_str(&raw)
                .with_context(|| format!("parsing targets in {}", path.display()))?;
            for spec in specs {
                registry.register(Target::from(spec));
            }
        }
        None => {
            registry.register(
                Target::new("local", "Local folder", vec![])
                    .with_requirement(TranscodeRequirement::Never),
            );
        }
    }
    Ok(Arc::new(registry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_file_is_loaded() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("targets.json");
        std::fs::write(
            &path,
            r#"[{"id":"tv","name":"TV","profiles":[{"id":"hd","name":"HD"}]}]"#,
        )?;

        let registry = load_targets(Some(&path))?;
        let tv = registry.get(&TargetId::new("tv")).expect("tv registered");
        assert_eq!(tv.profiles().len(), 1);
        assert!(load_targets(Some(&dir.path().join("missing.json"))).is_err());
        Ok(())
    }

    #[test]
    fn default_target_never_transcodes() -> anyhow::Result<()> {
        let registry = load_targets(None)?;
        let targets = registry.selectable();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].requirement(), TranscodeRequirement::Never);
        Ok(())
    }

    #[tokio::test]
    async fn preset_profile_is_chosen_when_offered() {
        let chooser = PresetChooser {
            target: None,
            profile: Some(ProfileId::new("sd")),
            requirement: TranscodeRequirement::Always,
        };
        let target = Target::new("tv", "TV", vec![]);
        let offered = vec![Profile::new("hd", "HD"), Profile::new("sd", "SD")];

        match chooser.choose_profile(&target, &offered).await {
            ProfileChoice::Selected { profile, requirement, .. } => {
                assert_eq!(profile.id, ProfileId::new("sd"));
                assert_eq!(requirement, TranscodeRequirement::Always);
            }
            ProfileChoice::Dismissed => panic!("preset profile was offered"),
        }
    }
}
