use common::{EntityCollection, EntityKey};
use hashbrown::HashMap;
use tracing::debug;

use crate::data_files::HduId;
use crate::jobs::{CorrelationId, Job, JobId};
use crate::sources::SourceId;

/// What the workbench does with a job once it resolves.
#[derive(Debug, Clone, PartialEq)]
pub enum JobPurpose {
    PixelOps,
    Alignment { inplace: bool },
    Stacking,
    SourceExtraction { hdu_id: HduId },
    Photometry {
        source_ids: Vec<SourceId>,
        file_ids: Vec<HduId>,
        batch: bool,
    },
    CatalogQuery,
}

#[derive(Debug, Clone)]
pub struct PendingJob {
    pub correlation_id: CorrelationId,
    pub job: Job,
    pub purpose: JobPurpose,
    pub poll_interval_ms: u64,
}

impl EntityKey<CorrelationId> for PendingJob {
    fn key(&self) -> &CorrelationId {
        &self.correlation_id
    }
}

impl PendingJob {
    pub fn job_id(&self) -> Option<JobId> {
        self.job.id
    }
}

/// Terminal outcome of one correlation id.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    Failed(String),
    Canceled,
}

/// Correlation table for in-flight jobs. An entry leaves the table on its
/// first terminal outcome; every later event for that id is ignored.
#[derive(Debug, Clone, Default)]
pub struct JobsState {
    pending: EntityCollection<CorrelationId, PendingJob>,
    resolved: HashMap<CorrelationId, JobOutcome>,
}

impl JobsState {
    pub fn create(
        &mut self,
        correlation_id: CorrelationId,
        job: Job,
        purpose: JobPurpose,
        poll_interval_ms: u64,
    ) -> bool {
        if self.pending.contains(&correlation_id) || self.resolved.contains_key(&correlation_id) {
            debug!(%correlation_id, "Correlation id reused, job not created");
            return false;
        }
        self.pending.add_many([PendingJob {
            correlation_id,
            job,
            purpose,
            poll_interval_ms,
        }]);
        true
    }

    /// Records the backend-assigned id. `None` when the correlation id is no
    /// longer pending.
    pub fn accept(&mut self, correlation_id: &CorrelationId, job: Job) -> Option<&PendingJob> {
        let pending = self.pending.get_by_id_mut(correlation_id)?;
        pending.job = job;
        Some(&*pending)
    }

    /// Applies a polled job state to a pending entry.
    pub fn update(&mut self, correlation_id: &CorrelationId, job: Job) -> Option<&PendingJob> {
        let pending = self.pending.get_by_id_mut(correlation_id)?;
        if pending.job.id.is_some() && pending.job.id != job.id {
            debug!(%correlation_id, "Ignoring update for a different job id");
            return None;
        }
        pending.job = job;
        Some(&*pending)
    }

    /// Moves the entry out of the table. Returns `None` if it was already
    /// resolved or never existed.
    pub fn resolve(&mut self, correlation_id: &CorrelationId, outcome: JobOutcome) -> Option<PendingJob> {
        let pending = self.pending.remove_one(correlation_id)?;
        self.resolved.insert(*correlation_id, outcome);
        Some(pending)
    }

    pub fn pending(&self, correlation_id: &CorrelationId) -> Option<&PendingJob> {
        self.pending.get_by_id(correlation_id)
    }

    pub fn pending_jobs(&self) -> impl Iterator<Item = &PendingJob> {
        self.pending.iter()
    }

    pub fn outcome(&self, correlation_id: &CorrelationId) -> Option<&JobOutcome> {
        self.resolved.get(correlation_id)
    }

    pub fn is_pending(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains(correlation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{AlignmentJob, JobPayload, JobStatus};

    fn job() -> Job {
        Job::new(JobPayload::Alignment(AlignmentJob {
            file_ids: vec![HduId::unique()],
            inplace: false,
        }))
    }

    #[test]
    fn first_terminal_outcome_wins() {
        let mut jobs = JobsState::default();
        let correlation_id = CorrelationId::unique();
        assert!(jobs.create(correlation_id, job(), JobPurpose::Stacking, 1000));

        assert!(jobs.resolve(&correlation_id, JobOutcome::Canceled).is_some());
        assert!(jobs.resolve(&correlation_id, JobOutcome::Completed).is_none());
        assert_eq!(jobs.outcome(&correlation_id), Some(&JobOutcome::Canceled));
    }

    #[test]
    fn updates_after_resolution_are_ignored() {
        let mut jobs = JobsState::default();
        let correlation_id = CorrelationId::unique();
        jobs.create(correlation_id, job(), JobPurpose::PixelOps, 1000);

        let mut accepted = job();
        accepted.id = Some(JobId::unique());
        assert!(jobs.accept(&correlation_id, accepted.clone()).is_some());

        let mut progressed = accepted.clone();
        progressed.state.status = JobStatus::InProgress;
        progressed.state.progress = 40.0;
        assert_eq!(
            jobs.update(&correlation_id, progressed).unwrap().job.state.progress,
            40.0
        );

        jobs.resolve(&correlation_id, JobOutcome::Failed("boom".into()));
        assert!(jobs.update(&correlation_id, accepted).is_none());
        assert!(!jobs.is_pending(&correlation_id));
    }

    #[test]
    fn reused_correlation_id_is_rejected() {
        let mut jobs = JobsState::default();
        let correlation_id = CorrelationId::unique();
        assert!(jobs.create(correlation_id, job(), JobPurpose::PixelOps, 1000));
        assert!(!jobs.create(correlation_id, job(), JobPurpose::PixelOps, 1000));
    }
}
