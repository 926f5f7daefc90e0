//! Turns dropped payloads into admission candidates.
//!
//! A payload is decoded by exactly one decoder, chosen by its shape:
//!
//! 1. a list of paths,
//! 2. a tagged block of references (`DownloadManager`, `DiskManagerFileInfo`,
//!    `TranscodeFile`) with one reference per line,
//! 3. a bare `http:` / `https://` URL.
//!
//! Anything else is [`Resolution::NotHandled`]. A reference that cannot be
//! resolved is logged and dropped; its siblings still resolve.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

use crate::{
    Candidate, CandidateKind, ContentFile, ContentHash, ContentRef, ResolutionError,
};

/// First line of a block of content references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadTag {
    DownloadManager,
    DiskManagerFileInfo,
    TranscodeFile,
}

impl PayloadTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadTag::DownloadManager => "DownloadManager",
            PayloadTag::DiskManagerFileInfo => "DiskManagerFileInfo",
            PayloadTag::TranscodeFile => "TranscodeFile",
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "DownloadManager" => Some(PayloadTag::DownloadManager),
            "DiskManagerFileInfo" => Some(PayloadTag::DiskManagerFileInfo),
            "TranscodeFile" => Some(PayloadTag::TranscodeFile),
            _ => None,
        }
    }
}

/// A raw drop, classified by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Paths(Vec<PathBuf>),
    Text(String),
    Url(String),
}

impl Payload {
    /// Classify free text: URLs, tagged blocks, then absolute path lists.
    pub fn infer(text: &str) -> Self {
        let trimmed = text.trim();
        if is_url(trimmed) {
            return Payload::Url(trimmed.to_string());
        }
        let first = trimmed.lines().next().unwrap_or_default();
        if PayloadTag::parse(first).is_some() {
            return Payload::Text(text.to_string());
        }

        let paths: Vec<PathBuf> = trimmed
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect();
        if !paths.is_empty() && paths.iter().all(|p| p.is_absolute()) {
            Payload::Paths(paths)
        } else {
            Payload::Text(text.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Handled(Vec<Candidate>),
    /// No decoder recognised the payload.
    NotHandled,
}

/// Severity a dropped reference is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTone {
    Info,
    Warning,
    Error,
}

/// Log a reference that was dropped during resolution.
pub fn log_dropped(tone: LogTone, reference: &str, error: &ResolutionError) {
    match tone {
        LogTone::Info => tracing::info!(%reference, %error, "Reference dropped"),
        LogTone::Warning => tracing::warn!(%reference, %error, "Reference dropped"),
        LogTone::Error => tracing::error!(%reference, %error, "Reference dropped"),
    }
}

/// Metadata for content the download layer knows about.
pub trait ContentLookup: Send + Sync + 'static {
    /// Every file under the content, or `None` when the hash is unknown.
    fn resolve_content_by_hash(&self, hash: &ContentHash) -> Option<Vec<ContentFile>>;

    fn lookup_file_by_index(&self, hash: &ContentHash, index: u32) -> Option<ContentFile>;
}

pub struct ContentResolver {
    lookup: Arc<dyn ContentLookup>,
}

impl ContentResolver {
    pub fn new(lookup: Arc<dyn ContentLookup>) -> Self {
        Self { lookup }
    }

    pub async fn resolve(&self, payload: &Payload) -> Resolution {
        let mut candidates = match payload {
            Payload::Paths(paths) => resolve_paths(paths).await,
            Payload::Text(text) => {
                let mut lines = text.lines().skip_while(|l| l.trim().is_empty());
                let tag = lines.next().and_then(PayloadTag::parse);
                match tag {
                    Some(PayloadTag::TranscodeFile) => resolve_artifacts(lines).await,
                    Some(tag) => self.resolve_content(tag, lines),
                    None if is_url(text.trim()) => resolve_url(text.trim()),
                    None => return Resolution::NotHandled,
                }
            }
            Payload::Url(url) if is_url(url.trim()) => resolve_url(url.trim()),
            Payload::Url(_) => return Resolution::NotHandled,
        };

        if let [only] = candidates.as_mut_slice() {
            if only.kind == CandidateKind::File {
                only.single = true;
            }
        }
        tracing::debug!(count = candidates.len(), "Payload resolved");
        Resolution::Handled(candidates)
    }

    fn resolve_content<'a>(
        &self,
        tag: PayloadTag,
        lines: impl Iterator<Item = &'a str>,
    ) -> Vec<Candidate> {
        let mut out = Vec::new();
        for line in lines.map(str::trim).filter(|l| !l.is_empty()) {
            if let Err(e) = self.resolve_content_line(line, &mut out) {
                log_dropped(LogTone::Warning, line, &e);
            }
        }
        tracing::debug!(tag = tag.as_str(), count = out.len(), "Content references resolved");
        out
    }

    /// `hash` selects every file, `hash;idx;idx` exactly the listed ones.
    fn resolve_content_line(
        &self,
        line: &str,
        out: &mut Vec<Candidate>,
    ) -> Result<(), ResolutionError> {
        let mut parts = line.split(';').map(str::trim);
        let hash: ContentHash = parts.next().unwrap_or_default().parse()?;

        let indices = parts
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<u32>().map_err(|_| ResolutionError::MalformedIndex {
                    line: line.to_string(),
                    index: p.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if indices.is_empty() {
            let files = self
                .lookup
                .resolve_content_by_hash(&hash)
                .ok_or(ResolutionError::UnknownContent(hash))?;
            let only_one = files.len() == 1;
            out.extend(files.into_iter().map(|file| {
                let candidate = content_candidate(hash, file);
                if only_one { candidate.singled() } else { candidate }
            }));
            return Ok(());
        }

        for index in indices {
            match self.lookup.lookup_file_by_index(&hash, index) {
                Some(file) => out.push(content_candidate(hash, file).singled()),
                None => log_dropped(
                    LogTone::Warning,
                    line,
                    &ResolutionError::UnknownFile { hash, index },
                ),
            }
        }
        Ok(())
    }
}

fn content_candidate(hash: ContentHash, file: ContentFile) -> Candidate {
    Candidate::file(
        ContentRef::ContentFile {
            hash,
            index: file.index,
            path: file.path,
        },
        Some(file.size),
    )
}

async fn resolve_paths(paths: &[PathBuf]) -> Vec<Candidate> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => out.push(Candidate::file(
                ContentRef::LocalFile { path: path.clone() },
                Some(meta.len()),
            )),
            Ok(meta) if meta.is_dir() => out.push(Candidate::directory(path.clone())),
            Ok(_) => log_dropped(
                LogTone::Warning,
                &path.display().to_string(),
                &ResolutionError::MissingPath(path.clone()),
            ),
            Err(source) => log_dropped(
                LogTone::Warning,
                &path.display().to_string(),
                &ResolutionError::Io {
                    path: path.clone(),
                    source,
                },
            ),
        }
    }
    out
}

async fn resolve_artifacts<'a>(lines: impl Iterator<Item = &'a str>) -> Vec<Candidate> {
    let mut out = Vec::new();
    for line in lines.map(str::trim).filter(|l| !l.is_empty()) {
        let path = PathBuf::from(line);
        let size = match tokio::fs::metadata(&path).await {
            Ok(meta) if path.is_absolute() && meta.is_file() => meta.len(),
            _ => {
                log_dropped(LogTone::Warning, line, &ResolutionError::MissingPath(path));
                continue;
            }
        };
        out.push(Candidate::file(ContentRef::Artifact { path }, Some(size)));
    }
    out
}

fn resolve_url(text: &str) -> Vec<Candidate> {
    match Url::parse(text) {
        Ok(url) => vec![Candidate::file(ContentRef::Remote { url }, None).singled()],
        Err(source) => {
            log_dropped(
                LogTone::Warning,
                text,
                &ResolutionError::InvalidUrl {
                    url: text.to_string(),
                    source,
                },
            );
            Vec::new()
        }
    }
}

fn is_url(text: &str) -> bool {
    !text.contains('\n') && (text.starts_with("http:") || text.starts_with("https://"))
}

/// Encode artifact paths as a `TranscodeFile` block for dragging out.
pub fn encode_transcode_block<'a>(paths: impl IntoIterator<Item = &'a Path>) -> String {
    let mut block = format!("{}\n", PayloadTag::TranscodeFile.as_str());
    for path in paths {
        block.push_str(&path.display().to_string());
        block.push('\n');
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_classifies_by_shape() {
        assert_eq!(
            Payload::infer("https://example.com/a.mp4"),
            Payload::Url("https://example.com/a.mp4".into())
        );
        assert!(matches!(
            Payload::infer("DownloadManager\nABC"),
            Payload::Text(_)
        ));
        assert_eq!(
            Payload::infer("/tmp/a\n/tmp/b\n"),
            Payload::Paths(vec!["/tmp/a".into(), "/tmp/b".into()])
        );
        assert!(matches!(Payload::infer("hello world"), Payload::Text(_)));
    }

    #[test]
    fn transcode_block_round_trips_through_tag() {
        let block = encode_transcode_block([Path::new("/out/a.mp4"), Path::new("/out/b.mp4")]);
        assert_eq!(block, "TranscodeFile\n/out/a.mp4\n/out/b.mp4\n");
        assert_eq!(
            block.lines().next().and_then(PayloadTag::parse),
            Some(PayloadTag::TranscodeFile)
        );
    }
}
