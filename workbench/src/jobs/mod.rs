//! Long-running backend jobs and the correlation protocol that tracks them.

mod backend;
mod protocol;
mod types;

use common::id_type;

pub use backend::{BackendFuture, JobBackend};
pub use protocol::{JobOutcome, JobPurpose, JobsState, PendingJob};
pub use types::*;

id_type!(JobId);
id_type!(CorrelationId);

/// Poll interval used by every workbench job.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
