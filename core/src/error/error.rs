use thiserror::Error;

use super::executor::ExecutorError;
use crate::runner::ProcessResult;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Executor(#[from] ExecutorError),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failures of a single process execution.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(String),
    #[error("could not start '{command}': {message}")]
    Spawn { command: String, message: String },
    #[error("Command '{command}' in '{cwd}' failed with exit code {exit_code}")]
    NonZeroExit {
        command: String,
        cwd: String,
        exit_code: i32,
        result: Box<ProcessResult>,
    },
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
}

impl RunnerError {
    /// Captured output of the failed process, when it got far enough to produce one.
    pub fn result(&self) -> Option<&ProcessResult> {
        match self {
            Self::NonZeroExit { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
