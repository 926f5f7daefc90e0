//! Size and count policy applied to a batch of candidates.

use std::path::Path;

use crate::{
    AdmissionConfig, AdmissionError, Candidate, CandidateKind, ContentRef, Job, JobId, JobQueue,
    ResolutionError, Selection,
    resolver::{LogTone, log_dropped},
};

/// What survived admission and why the rest did not.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionReport {
    pub admitted: Vec<Candidate>,
    /// Below the minimum size.
    pub filtered: usize,
    /// Over the batch cap.
    pub capped: usize,
}

impl AdmissionReport {
    pub fn is_empty(&self) -> bool {
        self.admitted.is_empty()
    }

    fn offer(&mut self, candidate: Candidate, config: &AdmissionConfig) {
        let big_enough = candidate.single
            || candidate
                .size
                .is_none_or(|size| size >= config.min_candidate_size);
        if !big_enough {
            self.filtered += 1;
        } else if self.admitted.len() >= config.max_batch_size {
            self.capped += 1;
        } else {
            self.admitted.push(candidate);
        }
    }
}

pub struct AdmissionGate {
    config: AdmissionConfig,
}

impl AdmissionGate {
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Filter and cap a batch, expanding directories one level.
    ///
    /// Files found in a directory count against the same cap as the rest
    /// of the batch.
    pub async fn admit(&self, candidates: Vec<Candidate>) -> AdmissionReport {
        let mut report = AdmissionReport::default();
        for candidate in candidates {
            if candidate.kind == CandidateKind::Directory {
                if let ContentRef::LocalFile { path } = &candidate.reference {
                    self.expand(path, &mut report).await;
                    continue;
                }
            }
            report.offer(candidate, &self.config);
        }

        if report.filtered > 0 || report.capped > 0 {
            tracing::info!(
                admitted = report.admitted.len(),
                filtered = report.filtered,
                capped = report.capped,
                "Batch trimmed by admission policy"
            );
        }
        report
    }

    async fn expand(&self, dir: &Path, report: &mut AdmissionReport) {
        let entries = match read_dir_sorted(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                log_dropped(LogTone::Warning, &dir.display().to_string(), &e);
                return;
            }
        };

        for path in entries {
            match tokio::fs::metadata(&path).await {
                Ok(meta) if meta.is_file() => report.offer(
                    Candidate::file(ContentRef::LocalFile { path }, Some(meta.len())),
                    &self.config,
                ),
                Ok(_) => tracing::debug!(path = %path.display(), "Skipping non-file entry"),
                Err(source) => log_dropped(
                    LogTone::Warning,
                    &path.display().to_string(),
                    &ResolutionError::Io { path: path.clone(), source },
                ),
            }
        }
    }

    /// Queue every admitted candidate against one selection.
    pub fn submit(
        &self,
        queue: &JobQueue,
        selection: &Selection,
        report: AdmissionReport,
    ) -> Result<Vec<JobId>, AdmissionError> {
        if report.is_empty() {
            return Err(AdmissionError::NothingAdmitted);
        }

        let ids = report
            .admitted
            .into_iter()
            .map(|candidate| {
                let job = Job::new(
                    selection.target.id().clone(),
                    selection.profile.clone(),
                    selection.requirement,
                    candidate.reference,
                );
                queue.enqueue(job).id
            })
            .collect::<Vec<_>>();

        tracing::info!(
            count = ids.len(),
            target = %selection.target.id(),
            profile = %selection.profile.id,
            "Batch submitted"
        );
        Ok(ids)
    }
}

async fn read_dir_sorted(dir: &Path) -> Result<Vec<std::path::PathBuf>, ResolutionError> {
    let io_err = |source| ResolutionError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut reader = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(io_err)? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}
