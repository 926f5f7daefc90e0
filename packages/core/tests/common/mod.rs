#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use dropq_core::{
    Artifact, Chooser, ChooserFuture, ContentFile, ContentHash, ContentLookup, ContentRef,
    EngineFailure, ExecutionEngine, Job, JobId, JobQueue, Profile, ProfileChoice, ProfileId,
    Target, TargetId, TranscodeRequirement, event_channel,
};

/// Engine double with switchable behaviour.
#[derive(Default)]
pub struct FakeEngine {
    pub pausable: AtomicBool,
    pub fail_start: AtomicBool,
    pub veto: Mutex<Option<String>>,
    pub started: Mutex<Vec<JobId>>,
    pub artifact_dir: Option<PathBuf>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            pausable: AtomicBool::new(true),
            ..Default::default()
        }
    }

    pub fn writing_to(dir: &Path) -> Self {
        Self {
            artifact_dir: Some(dir.to_path_buf()),
            ..Self::new()
        }
    }

    pub fn set_veto(&self, reason: Option<&str>) {
        *self.veto.lock() = reason.map(str::to_string);
    }
}

impl ExecutionEngine for FakeEngine {
    fn start_job(&self, job: &Job) -> Result<(), EngineFailure> {
        self.started.lock().push(job.id);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(EngineFailure::new("device unavailable"));
        }
        Ok(())
    }

    fn is_pausable(&self, _job: &Job) -> bool {
        self.pausable.load(Ordering::SeqCst)
    }

    fn check_remove(&self, _job: &Job) -> Result<(), String> {
        match self.veto.lock().clone() {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    fn produce_artifact(&self, job: &Job) -> Artifact {
        let dir = self
            .artifact_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("/artifacts"));
        Artifact::new(dir.join(format!("{}.out", job.id)))
    }
}

pub fn queue_with(engine: Arc<FakeEngine>) -> JobQueue {
    let (tx, _rx) = event_channel();
    JobQueue::new(engine, tx)
}

pub fn local_job(name: &str) -> Job {
    Job::new(
        TargetId::new("tv"),
        Profile::new("hd", "HD"),
        TranscodeRequirement::WhenRequired,
        ContentRef::LocalFile {
            path: PathBuf::from("/media").join(name),
        },
    )
}

/// Content layer double keyed by hash.
#[derive(Default)]
pub struct FakeLookup {
    content: HashMap<ContentHash, Vec<ContentFile>>,
}

impl FakeLookup {
    pub fn with(mut self, hash: ContentHash, files: &[(&str, u64)]) -> Self {
        let files = files
            .iter()
            .enumerate()
            .map(|(i, (name, size))| ContentFile {
                index: i as u32,
                path: PathBuf::from("/downloads").join(name),
                size: *size,
            })
            .collect();
        self.content.insert(hash, files);
        self
    }
}

impl ContentLookup for FakeLookup {
    fn resolve_content_by_hash(&self, hash: &ContentHash) -> Option<Vec<ContentFile>> {
        self.content.get(hash).cloned()
    }

    fn lookup_file_by_index(&self, hash: &ContentHash, index: u32) -> Option<ContentFile> {
        self.content
            .get(hash)?
            .iter()
            .find(|f| f.index == index)
            .cloned()
    }
}

pub fn hash(seed: u8) -> ContentHash {
    ContentHash([seed; 20])
}

/// Chooser that replays scripted answers. An exhausted script dismisses.
#[derive(Default)]
pub struct ScriptedChooser {
    targets: Mutex<VecDeque<Option<TargetId>>>,
    profiles: Mutex<VecDeque<ProfileChoice>>,
    pub target_prompts: AtomicUsize,
    pub profile_prompts: AtomicUsize,
    pub last_offered: Mutex<Vec<ProfileId>>,
}

impl ScriptedChooser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_target(self, target: Option<&str>) -> Self {
        self.targets.lock().push_back(target.map(TargetId::new));
        self
    }

    pub fn then_profile(self, choice: ProfileChoice) -> Self {
        self.profiles.lock().push_back(choice);
        self
    }

    pub fn prompts(&self) -> usize {
        self.target_prompts.load(Ordering::SeqCst) + self.profile_prompts.load(Ordering::SeqCst)
    }
}

impl Chooser for ScriptedChooser {
    fn choose_target<'a>(
        &'a self,
        targets: &'a [Arc<Target>],
    ) -> ChooserFuture<'a, Option<Arc<Target>>> {
        Box::pin(async move {
            self.target_prompts.fetch_add(1, Ordering::SeqCst);
            let wanted = self.targets.lock().pop_front().flatten()?;
            targets.iter().find(|t| t.id() == &wanted).cloned()
        })
    }

    fn choose_profile<'a>(
        &'a self,
        _target: &'a Target,
        profiles: &'a [Profile],
    ) -> ChooserFuture<'a, ProfileChoice> {
        Box::pin(async move {
            self.profile_prompts.fetch_add(1, Ordering::SeqCst);
            *self.last_offered.lock() = profiles.iter().map(|p| p.id.clone()).collect();
            self.profiles
                .lock()
                .pop_front()
                .unwrap_or(ProfileChoice::Dismissed)
        })
    }
}

pub fn pick(id: &str, requirement: TranscodeRequirement, remember: bool) -> ProfileChoice {
    ProfileChoice::Selected {
        profile: Profile::new(id, id.to_uppercase()),
        requirement,
        remember,
    }
}

/// Create a sparse file of the given size.
pub fn sized_file(dir: &Path, name: &str, size: u64) -> std::io::Result<PathBuf> {
    let path = dir.join(name);
    let file = std::fs::File::create(&path)?;
    file.set_len(size)?;
    Ok(path)
}

pub const MB: u64 = 1024 * 1024;
