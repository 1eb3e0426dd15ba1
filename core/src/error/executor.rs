use std::sync::Arc;

use thiserror::Error;

use super::code::ErrorCode;
use super::error::RunnerError;

/// Why a job ended up in the failed set. Stored as the job's exception.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Process(#[from] RunnerError),

    #[error("Job '{job}' was not run because dependent job '{dependency}' failed")]
    DependencyFailed { job: String, dependency: String },
}

impl JobError {
    /// True when the job never spawned a process.
    pub fn is_inherited(&self) -> bool {
        matches!(self, Self::DependencyFailed { .. })
    }
}

/// Errors raised by dependency graph construction and pool execution
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("A job cannot depend on itself")]
    SelfDependency,

    #[error("Mutual dependency: '{a}' and '{b}' depend on each other")]
    MutualDependency { a: String, b: String },

    #[error("Dependencies of '{0}' cannot change after it was submitted to a pool")]
    DependenciesFrozen(String),

    #[error("Job group '{0}' has no members")]
    EmptyGroup(String),

    #[error("Unit '{0}' was submitted more than once")]
    DuplicateUnit(String),

    #[error("Unit '{0}' already belongs to a previous batch")]
    AlreadySubmitted(String),

    #[error("Dependency not found: '{unit}' depends on {}", .missing.join(", "))]
    DependencyNotFound { unit: String, missing: Vec<String> },

    #[error("Circular dependency detected: {}", .path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("No job is ready and none is in flight; pending: {}", .pending.join(", "))]
    NoReadyJob { pending: Vec<String> },

    #[error("Pool is already running a batch")]
    PoolBusy,

    #[error("Pool bookkeeping is inconsistent: {0}")]
    Inconsistent(String),

    #[error("Job '{job}' failed: {source}")]
    JobFailed {
        job: String,
        #[source]
        source: Arc<JobError>,
    },
}

impl ExecutorError {
    /// Map executor error to error category
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::SelfDependency
            | Self::MutualDependency { .. }
            | Self::DependenciesFrozen(_)
            | Self::EmptyGroup(_)
            | Self::DuplicateUnit(_)
            | Self::AlreadySubmitted(_) => ErrorCode::ValidationError,
            Self::DependencyNotFound { .. } | Self::NoReadyJob { .. } => {
                ErrorCode::DependencyError
            }
            Self::CircularDependency { .. } => ErrorCode::CircularDependency,
            Self::PoolBusy | Self::Inconsistent(_) => ErrorCode::InternalError,
            Self::JobFailed { source, .. } => match source.as_ref() {
                JobError::Process(RunnerError::Spawn { .. }) => ErrorCode::SpawnError,
                JobError::Process(RunnerError::StreamIo { .. }) => ErrorCode::SpawnError,
                _ => ErrorCode::JobFailed,
            },
        }
    }

    /// Structural defects of the submitted graph. Never tolerated by `fail_ok`.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.error_code(),
            ErrorCode::ValidationError | ErrorCode::DependencyError | ErrorCode::CircularDependency
        )
    }
}
