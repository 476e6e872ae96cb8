//! The verdict a task returns for one attempt.

use std::time::Duration;

use ferry_workos::DirectoryError;

use crate::PipelineError;

/// Outcome of one attempt at processing a record.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    /// The record was migrated.
    Success(T),
    /// A business precondition was not met; counted and logged, never an error.
    SkippedExpected(String),
    /// The destination asked us to slow down; the attempt must be repeated.
    RateLimited { retry_after: Option<Duration> },
    /// Anything else. Aborts the job.
    Fatal(PipelineError),
}

impl<T> TaskOutcome<T> {
    /// Skip with a reason.
    pub fn skipped(reason: impl Into<String>) -> Self {
        TaskOutcome::SkippedExpected(reason.into())
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TaskOutcome::RateLimited { .. })
    }
}

/// Rate limiting stays recoverable; every other destination error is fatal.
impl<T> From<DirectoryError> for TaskOutcome<T> {
    fn from(err: DirectoryError) -> Self {
        if err.is_rate_limited() {
            return TaskOutcome::RateLimited {
                retry_after: err.retry_after(),
            };
        }
        TaskOutcome::Fatal(PipelineError::Directory(err))
    }
}
