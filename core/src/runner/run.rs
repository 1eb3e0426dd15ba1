use tokio::sync::mpsc;

use crate::error::RunnerError;

use super::io_pump::{self, ChunkTap, InputStream};
use super::result::ProcessResult;
use super::traits::ProcessManager;
use super::types::{ProcessSpec, RunOptions};

/// Run one process to completion.
///
/// Returns once the process has exited, both output streams reached EOF and,
/// when `input` is given, the input was fully written and stdin closed.
/// stdout and stderr are drained concurrently with each other and with the
/// process, so a child blocked on a full pipe never deadlocks us.
pub async fn run_process(
    manager: &dyn ProcessManager,
    mut spec: ProcessSpec,
    input: Option<InputStream>,
    opts: RunOptions,
) -> Result<ProcessResult, RunnerError> {
    let command = spec.command_line();
    spec.pipe_stdin = input.is_some();

    let mut session = manager
        .start(&spec)
        .await
        .map_err(|e| RunnerError::Spawn {
            command: command.clone(),
            message: format!("{e:#}"),
        })?;
    let pid = session.pid();
    tracing::debug!(manager = manager.name(), command = %command, pid = ?pid, "process started");

    let stdout = session.stdout().ok_or_else(|| RunnerError::Spawn {
        command: command.clone(),
        message: "no stdout".into(),
    })?;
    let stderr = session.stderr().ok_or_else(|| RunnerError::Spawn {
        command: command.clone(),
        message: "no stderr".into(),
    })?;

    let feeder = match input {
        Some(input) => {
            let stdin = session.stdin().ok_or_else(|| RunnerError::Spawn {
                command: command.clone(),
                message: "no stdin".into(),
            })?;
            Some(io_pump::feed_stdin(stdin, input))
        }
        None => {
            drop(session.stdin());
            None
        }
    };

    let (tap_tx, tap_rx) = mpsc::channel::<ChunkTap>(opts.tap_capacity.max(1));
    let out_task = io_pump::pump_stdout(stdout, tap_tx.clone());
    let err_task = io_pump::pump_stderr(stderr, tap_tx);

    let (captured, status) = tokio::join!(io_pump::collect_taps(tap_rx), session.wait());

    join_pump(out_task, "stdout").await?;
    join_pump(err_task, "stderr").await?;
    if let Some(feeder) = feeder {
        join_pump(feeder, "stdin").await?;
    }

    let exit_code = status.map_err(|e| RunnerError::StreamIo {
        stream: "wait",
        source: std::io::Error::other(format!("{e:#}")),
    })?;
    tracing::debug!(command = %command, pid = ?pid, exit_code, "process exited");

    let result = ProcessResult::new(
        exit_code,
        captured.stdout,
        captured.stderr,
        captured.output,
        pid,
        opts.encoding,
    );

    if exit_code != 0 && !opts.fail_ok {
        return Err(RunnerError::NonZeroExit {
            command,
            cwd: spec.cwd_display(),
            exit_code,
            result: Box::new(result),
        });
    }

    Ok(result)
}

/// Single-shot convenience: run `argv` without a pool.
pub async fn run_command(
    manager: &dyn ProcessManager,
    argv: &[String],
    opts: RunOptions,
) -> Result<ProcessResult, RunnerError> {
    if argv.is_empty() {
        return Err(RunnerError::Config("empty command line".into()));
    }
    run_process(manager, ProcessSpec::from_argv(argv), None, opts).await
}

async fn join_pump(
    task: tokio::task::JoinHandle<Result<u64, RunnerError>>,
    label: &'static str,
) -> Result<u64, RunnerError> {
    task.await.map_err(|e| RunnerError::StreamIo {
        stream: label,
        source: std::io::Error::other(e),
    })?
}
