//! Job system: a shared worker pool driven by context counters.
//!
//! Work is enqueued under a [`Context`]; [`JobSystem::wait`] blocks until
//! every job enqueued under that context has finished. Jobs return
//! [`JobResult`]; failures and panics are collected and handed back by
//! `wait` instead of being swallowed.
//!
//! # Invariants
//! - After `wait(ctx)` returns, `is_busy(ctx)` is false and all side effects
//!   of the context's jobs are visible to the caller.
//! - `wait` called from inside a job executes queued work while it waits,
//!   so nested waits cannot starve the pool.
//! - No ordering is guaranteed between jobs of the same context.
//! - Cancellation is cooperative: jobs that have not started are skipped and
//!   dispatch groups stop between items.

mod scope;
mod system;

pub use scope::Scope;
pub use system::{Context, JobArgs, JobSystem, JobSystemConfig};

/// Failure reported by a single job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

pub type JobResult = Result<(), JobError>;

/// Aggregated job failures surfaced by [`JobSystem::wait`].
#[derive(Debug, Clone, thiserror::Error)]
#[error("{} job(s) failed, first: {}", .errors.len(), first_error(.errors))]
pub struct WaitError {
    pub errors: Vec<JobError>,
}

fn first_error(errors: &[JobError]) -> String {
    errors.first().map(ToString::to_string).unwrap_or_default()
}

#[derive(Debug, thiserror::Error)]
pub enum JobSystemError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub fn crate_info() -> &'static str {
    "lumen-jobs v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("jobs"));
    }

    #[test]
    fn wait_error_reports_count_and_first() {
        let err = WaitError {
            errors: vec![JobError::msg("boom"), JobError::msg("bang")],
        };
        assert_eq!(err.to_string(), "2 job(s) failed, first: boom");
    }
}
