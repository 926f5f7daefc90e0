//! The drop pipeline: resolve, admit, select, submit.

use dropq_core::{
    AdmissionError, BatchId, JobId, Payload, ProfileId, Resolution, TargetId,
    TranscodeRequirement,
};
use serde::{Deserialize, Serialize};

use crate::{ApiError, Services};

/// Result of a drop that queued at least one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropOutcome {
    pub batch: BatchId,
    pub jobs: Vec<JobId>,
    pub target: TargetId,
    pub profile: ProfileId,
    pub requirement: TranscodeRequirement,
    /// Candidates refused for being too small.
    pub filtered: usize,
    /// Candidates refused for exceeding the batch cap.
    pub capped: usize,
}

impl Services {
    /// Handle one dropped payload, optionally aimed at a known target.
    ///
    /// Size and count policy runs before any prompt, so a drop that admits
    /// nothing never asks the user to pick a profile.
    pub async fn handle_drop(
        &self,
        target: Option<&str>,
        payload: Payload,
    ) -> Result<DropOutcome, ApiError> {
        let preselected = match target {
            Some(id) => Some(
                self.targets
                    .get(&TargetId::new(id))
                    .ok_or_else(|| AdmissionError::UnknownTarget(id.to_string()))?,
            ),
            None => None,
        };

        let candidates = match self.resolver.resolve(&payload).await {
            Resolution::Handled(candidates) => candidates,
            Resolution::NotHandled => return Err(AdmissionError::NotHandled.into()),
        };

        let report = self.gate.admit(candidates).await;
        if report.is_empty() {
            tracing::info!(
                filtered = report.filtered,
                capped = report.capped,
                "Drop admitted nothing"
            );
            return Err(AdmissionError::NothingAdmitted.into());
        }
        let (filtered, capped) = (report.filtered, report.capped);

        let batch = BatchId::new();
        let selection = self.selector.resolve(batch, preselected).await?;
        let jobs = self.gate.submit(&self.queue, &selection, report)?;
        self.wake_scheduler();

        tracing::info!(%batch, jobs = jobs.len(), filtered, capped, "Drop handled");
        Ok(DropOutcome {
            batch,
            jobs,
            target: selection.target.id().clone(),
            profile: selection.profile.id,
            requirement: selection.requirement,
            filtered,
            capped,
        })
    }

    /// Classify free text and handle it as a drop.
    pub async fn handle_text_drop(
        &self,
        target: Option<&str>,
        text: &str,
    ) -> Result<DropOutcome, ApiError> {
        self.handle_drop(target, Payload::infer(text)).await
    }
}
