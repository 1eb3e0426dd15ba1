use procpool_core::api::{Job, ProgressReporter, ProgressSnapshot};

/// Emits progress as `tracing` events.
#[derive(Debug, Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn report(&self, s: &ProgressSnapshot) {
        tracing::info!(
            total = s.total,
            completed = s.completed,
            failed = s.failed,
            in_flight = s.in_flight,
            pending = s.pending,
            "progress"
        );
    }

    fn job_finished(&self, job: &Job) {
        match job.exception() {
            None => tracing::info!(job = %job.name(), exit_code = job.result().exit_code, "job finished"),
            Some(e) if e.is_inherited() => tracing::warn!(job = %job.name(), "job skipped: {e}"),
            Some(e) => tracing::warn!(job = %job.name(), exit_code = job.result().exit_code, "job failed: {e}"),
        }
    }
}
