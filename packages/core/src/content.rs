//! Content references and admission candidates.

use std::path::PathBuf;
use std::str::FromStr;

use data_encoding::BASE32;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::ResolutionError;

/// 20-byte content hash, written as 32 base32 characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(pub [u8; 20]);

impl ContentHash {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for ContentHash {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let bytes = BASE32
            .decode(normalized.as_bytes())
            .map_err(|_| ResolutionError::MalformedHash(s.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| ResolutionError::MalformedHash(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = ResolutionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_string()
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", BASE32.encode(&self.0))
    }
}

/// One file inside a piece of downloaded content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFile {
    pub index: u32,
    pub path: PathBuf,
    pub size: u64,
}

/// What a job processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentRef {
    /// A file on the local filesystem.
    LocalFile { path: PathBuf },
    /// A file inside downloaded content.
    ContentFile {
        hash: ContentHash,
        index: u32,
        path: PathBuf,
    },
    /// A remote resource.
    Remote { url: Url },
    /// An artifact produced by an earlier job.
    Artifact { path: PathBuf },
}

impl ContentRef {
    /// Short human-readable name for logs and listings.
    pub fn display_name(&self) -> String {
        match self {
            ContentRef::LocalFile { path }
            | ContentRef::ContentFile { path, .. }
            | ContentRef::Artifact { path } => path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string()),
            ContentRef::Remote { url } => url.to_string(),
        }
    }
}

impl std::fmt::Display for ContentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentRef::LocalFile { path } => write!(f, "file:{}", path.display()),
            ContentRef::ContentFile { hash, index, .. } => write!(f, "{}#{}", hash, index),
            ContentRef::Remote { url } => write!(f, "{}", url),
            ContentRef::Artifact { path } => write!(f, "artifact:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    File,
    /// Expanded one level by the admission gate.
    Directory,
}

/// A resolved reference that has not been admitted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub reference: ContentRef,
    /// Size in bytes when known; remote candidates have none.
    pub size: Option<u64>,
    pub kind: CandidateKind,
    /// Set when the candidate stands alone in its batch or was picked out
    /// explicitly; such candidates skip the minimum-size filter.
    pub single: bool,
}

impl Candidate {
    pub fn file(reference: ContentRef, size: Option<u64>) -> Self {
        Self {
            reference,
            size,
            kind: CandidateKind::File,
            single: false,
        }
    }

    pub fn directory(path: PathBuf) -> Self {
        Self {
            reference: ContentRef::LocalFile { path },
            size: None,
            kind: CandidateKind::Directory,
            single: false,
        }
    }

    pub fn singled(mut self) -> Self {
        self.single = true;
        self
    }
}
