#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use dropq_api::{ApiError, AdmissionConfig, Collaborators, Services};
use dropq_core::{
    Artifact, Chooser, ChooserFuture, ContentFile, ContentHash, ContentLookup, EngineFailure,
    ExecutionEngine, Job, Profile, ProfileChoice, Target, TargetRegistry, TranscodeRequirement,
};

/// Engine that accepts every job and can veto removals.
#[derive(Default)]
pub struct HostEngine {
    pub veto: Mutex<Option<String>>,
    pub artifact_dir: PathBuf,
}

impl HostEngine {
    pub fn writing_to(dir: &Path) -> Self {
        Self {
            veto: Mutex::new(None),
            artifact_dir: dir.to_path_buf(),
        }
    }
}

impl ExecutionEngine for HostEngine {
    fn start_job(&self, _job: &Job) -> Result<(), EngineFailure> {
        Ok(())
    }

    fn is_pausable(&self, _job: &Job) -> bool {
        true
    }

    fn check_remove(&self, _job: &Job) -> Result<(), String> {
        match self.veto.lock().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    fn produce_artifact(&self, job: &Job) -> Artifact {
        Artifact::new(self.artifact_dir.join(format!("{}.out", job.id)))
    }
}

/// The content layer knows nothing.
pub struct NoContent;

impl ContentLookup for NoContent {
    fn resolve_content_by_hash(&self, _hash: &ContentHash) -> Option<Vec<ContentFile>> {
        None
    }

    fn lookup_file_by_index(&self, _hash: &ContentHash, _index: u32) -> Option<ContentFile> {
        None
    }
}

/// Picks the first target and the first offered profile, counting prompts.
#[derive(Default)]
pub struct FirstChoice {
    pub prompts: AtomicUsize,
}

impl FirstChoice {
    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Chooser for FirstChoice {
    fn choose_target<'a>(
        &'a self,
        targets: &'a [Arc<Target>],
    ) -> ChooserFuture<'a, Option<Arc<Target>>> {
        Box::pin(async move {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            targets.first().cloned()
        })
    }

    fn choose_profile<'a>(
        &'a self,
        _target: &'a Target,
        profiles: &'a [Profile],
    ) -> ChooserFuture<'a, ProfileChoice> {
        Box::pin(async move {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            match profiles.first() {
                Some(profile) => ProfileChoice::Selected {
                    profile: profile.clone(),
                    requirement: TranscodeRequirement::WhenRequired,
                    remember: false,
                },
                None => ProfileChoice::Dismissed,
            }
        })
    }
}

pub struct Harness {
    pub services: Services,
    pub engine: Arc<HostEngine>,
    pub chooser: Arc<FirstChoice>,
    pub dir: tempfile::TempDir,
}

/// Services with a single-profile "tv" target and a two-profile "box" target.
pub async fn harness() -> Result<Harness, Box<dyn std::error::Error>> {
    let config = AdmissionConfig::default().with_coalesce_window(Duration::from_millis(20));
    harness_with(config).await
}

pub async fn harness_with(config: AdmissionConfig) -> Result<Harness, Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let engine = Arc::new(HostEngine::writing_to(dir.path()));
    let chooser = Arc::new(FirstChoice::default());

    let targets = Arc::new(TargetRegistry::new());
    targets.register(Target::new("tv", "TV", vec![Profile::new("hd", "HD")]));
    targets.register(Target::new(
        "box",
        "Set-top Box",
        vec![Profile::new("a", "A"), Profile::new("b", "B")],
    ));

    let services = Services::init(
        config,
        Collaborators {
            engine: engine.clone(),
            lookup: Arc::new(NoContent),
            chooser: chooser.clone(),
            targets,
        },
    )
    .await?;

    Ok(Harness {
        services,
        engine,
        chooser,
        dir,
    })
}

pub fn sized_file(dir: &Path, name: &str, size: u64) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    let file = std::fs::File::create(&path)?;
    file.set_len(size)?;
    Ok(path)
}

pub fn is_admission(err: &ApiError, expected: dropq_core::AdmissionError) -> bool {
    matches!(err, ApiError::Admission(e) if *e == expected)
}

pub const MB: u64 = 1024 * 1024;
