//! Artifacts produced by jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ControlError;

/// Output of a job. Written by the execution engine, read by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: PathBuf,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub copy_failure_count: u32,
    #[serde(default)]
    pub copied_to_destination: bool,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            complete: false,
            copy_failure_count: 0,
            copied_to_destination: false,
        }
    }

    /// A copy to the destination can be retried after a failure or to
    /// refresh an earlier copy.
    pub fn retry_copy_eligible(&self) -> bool {
        self.copy_failure_count > 0 || self.copied_to_destination
    }

    pub fn record_copy_failure(&mut self) {
        self.copy_failure_count = self.copy_failure_count.saturating_add(1);
    }

    pub fn mark_copied(&mut self) {
        self.copied_to_destination = true;
        self.copy_failure_count = 0;
    }
}

/// Shared handle to an artifact. The engine and the queue see the same value.
#[derive(Debug, Clone)]
pub struct ArtifactHandle(Arc<Mutex<Artifact>>);

impl ArtifactHandle {
    pub fn new(artifact: Artifact) -> Self {
        Self(Arc::new(Mutex::new(artifact)))
    }

    pub fn snapshot(&self) -> Artifact {
        self.0.lock().clone()
    }

    pub fn path(&self) -> PathBuf {
        self.0.lock().path.clone()
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Artifact) -> R) -> R {
        f(&mut self.0.lock())
    }

    /// Reset copy bookkeeping so the engine picks the artifact up again.
    ///
    /// Returns `false` when the artifact is not eligible.
    pub fn retry_copy(&self) -> bool {
        let mut artifact = self.0.lock();
        if !artifact.retry_copy_eligible() {
            return false;
        }
        artifact.copy_failure_count = 0;
        artifact.copied_to_destination = false;
        true
    }

    /// A complete artifact whose file still exists must be confirmed before
    /// deleting.
    pub async fn needs_delete_confirmation(&self) -> bool {
        let (complete, path) = {
            let artifact = self.0.lock();
            (artifact.complete, artifact.path.clone())
        };
        complete && tokio::fs::try_exists(&path).await.unwrap_or(false)
    }

    /// Delete the artifact file. A file that is already gone is not an error.
    pub async fn delete_file(&self) -> Result<(), ControlError> {
        let path = self.path();
        delete_path(&path).await
    }
}

async fn delete_path(path: &Path) -> Result<(), ControlError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ControlError::Artifact {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl From<Artifact> for ArtifactHandle {
    fn from(artifact: Artifact) -> Self {
        Self::new(artifact)
    }
}

impl Serialize for ArtifactHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.snapshot().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ArtifactHandle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Artifact::deserialize(deserializer).map(ArtifactHandle::new)
    }
}
