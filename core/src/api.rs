//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `procpool_core::api` instead of reaching into internal modules.

pub use crate::config::{load_default, AppConfig, LoggingConfig, PoolConfig};
pub use crate::error::{CliError, ErrorCode, ExecutorError, JobError, RunnerError};
pub use crate::executor::{
    Job, JobBuilder, JobGroup, JobOutcome, JobStream, ProgressReporter, ProgressSnapshot, Unit,
    UnitId, WorkerPool, WorkerPoolBuilder,
};
pub use crate::runner::{
    run_command, run_process, InputStream, ProcessManager, ProcessResult, ProcessSession,
    ProcessSpec, RunOptions,
};
