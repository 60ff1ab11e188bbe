use std::future::Future;
use std::pin::Pin;

use crate::jobs::{Job, JobId};

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = anyhow::Result<T>> + Send + 'a>>;

/// Remote job service.
pub trait JobBackend: Send + Sync {
    /// Submits a job and returns it with its assigned id.
    fn create(&self, job: Job) -> BackendFuture<'_, Job>;
    /// Current state, and the result once completed.
    fn poll(&self, job_id: JobId) -> BackendFuture<'_, Job>;
    fn cancel(&self, job_id: JobId) -> BackendFuture<'_, ()>;
}
