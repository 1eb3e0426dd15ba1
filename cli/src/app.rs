use std::io::Write;
use std::path::PathBuf;

use procpool_core::api::{
    AppConfig, CliError, ErrorCode, ExecutorError, Job, JobGroup, Unit, WorkerPool,
};
use procpool_plugins::factory;

use crate::commands::cli::{ProgressKind, RunArgs};
use crate::commands::joblist::{parse_job_list, read_job_list};

/// How the lines of a job list become units.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub shell: bool,
    pub chain: bool,
    pub fail_fast: bool,
    pub cwd: Option<PathBuf>,
}

impl From<&RunArgs> for BatchOptions {
    fn from(args: &RunArgs) -> Self {
        Self {
            shell: args.shell,
            chain: args.chain,
            fail_fast: args.fail_fast,
            cwd: args.cwd.clone(),
        }
    }
}

pub fn build_units(commands: Vec<Vec<String>>, opts: &BatchOptions) -> Result<Vec<Unit>, ExecutorError> {
    let jobs: Vec<Job> = commands
        .into_iter()
        .map(|argv| {
            let mut builder = Job::builder(argv)
                .shell(opts.shell)
                .fail_ok(!opts.fail_fast);
            if let Some(dir) = &opts.cwd {
                builder = builder.cwd(dir.clone());
            }
            builder.build()
        })
        .collect();

    if opts.chain {
        Ok(vec![JobGroup::new("chain", jobs)?.into()])
    } else {
        Ok(jobs.into_iter().map(Unit::from).collect())
    }
}

/// Run `units` on `pool`, writing one summary line per finished job.
///
/// Returns 0 when every job succeeded and 1 when some failed but were
/// tolerated. A batch abort comes back as the error.
pub async fn run_batch(
    pool: &WorkerPool,
    units: Vec<Unit>,
    summary: &mut dyn Write,
) -> Result<i32, CliError> {
    let mut stream = pool.start_workers(units)?;
    tracing::debug!(batch = %stream.batch_id(), "waiting for jobs");

    let mut failed = 0usize;
    while let Some(item) = stream.next_job().await {
        let job = item?;
        if !job.succeeded() {
            failed += 1;
        }
        writeln!(summary, "{}", summary_line(&job))?;
    }
    summary.flush()?;

    let code = if failed > 0 {
        ErrorCode::GeneralError
    } else {
        ErrorCode::Success
    };
    Ok(code.exit_code())
}

pub fn exit_code_for_error(e: &CliError) -> i32 {
    // 11: config error
    // 20: spawn / IO error
    // 30: batch aborted by a failing job
    // 50: internal/uncategorized
    match e {
        CliError::Executor(ee) => ee.error_code().exit_code(),
        CliError::Config(_) => ErrorCode::ValidationError.exit_code(),
        CliError::Io(_) => ErrorCode::SpawnError.exit_code(),
        CliError::Anyhow(_) => ErrorCode::InternalError.exit_code(),
    }
}

pub fn summary_line(job: &Job) -> String {
    match job.exception() {
        None => format!("ok    {}", job.name()),
        Some(e) if e.is_inherited() => format!("skip  {}: {e}", job.name()),
        Some(e) => format!("FAIL  {}: {e}", job.name()),
    }
}

pub async fn run_app(args: RunArgs, cfg: AppConfig) -> Result<i32, CliError> {
    let text = read_job_list(&args.file).await?;
    let commands = parse_job_list(&text, args.shell);
    if commands.is_empty() {
        tracing::info!(file = %args.file, "job list is empty");
        return Ok(0);
    }

    let mut pool_cfg = cfg.pool;
    if let Some(workers) = args.workers {
        pool_cfg.workers = Some(workers);
    }

    let reporter =
        factory::build_reporter(args.progress.as_str(), atty::is(atty::Stream::Stderr))?;
    let mut builder = WorkerPool::from_config(factory::build_manager(), &pool_cfg)
        .map_err(|e| CliError::Config(e.to_string()))?;
    if let Some(reporter) = reporter {
        builder = builder.reporter(reporter);
    }
    let pool = builder.build();

    let units = build_units(commands, &BatchOptions::from(&args))?;

    // JSONL mode owns stdout.
    if args.progress == ProgressKind::Jsonl {
        run_batch(&pool, units, &mut std::io::sink()).await
    } else {
        run_batch(&pool, units, &mut std::io::stdout()).await
    }
}
