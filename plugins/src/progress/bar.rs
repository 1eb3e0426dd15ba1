use indicatif::{ProgressBar, ProgressStyle};

use procpool_core::api::{Job, ProgressReporter, ProgressSnapshot};

/// Terminal progress bar over the jobs of one batch.
pub struct BarReporter {
    bar: ProgressBar,
    enabled: bool,
}

impl BarReporter {
    /// `enabled = false` gives a hidden bar, used when stderr is not a terminal.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
                enabled: false,
            };
        }

        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} jobs ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("█▓▒░  "));
        }
        bar.set_message("Starting...");

        Self { bar, enabled: true }
    }

    pub fn finish(&self) {
        if self.enabled {
            self.bar.finish_and_clear();
        }
    }
}

impl ProgressReporter for BarReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        if !self.enabled {
            return;
        }
        self.bar.set_length(snapshot.total as u64);
        self.bar.set_position(snapshot.finished() as u64);
        self.bar.set_message(format!(
            "{} running, {} failed",
            snapshot.in_flight, snapshot.failed
        ));
        if snapshot.is_drained() {
            let msg = if snapshot.failed == 0 {
                "✅ All jobs completed"
            } else {
                "❌ Some jobs failed"
            };
            self.bar.finish_with_message(msg);
        }
    }

    fn job_finished(&self, job: &Job) {
        if !self.enabled {
            return;
        }
        let icon = if job.succeeded() { "✅" } else { "❌" };
        self.bar.println(format!(
            "  {icon} {} (exit {})",
            job.name(),
            job.result().exit_code
        ));
    }
}

impl Drop for BarReporter {
    fn drop(&mut self) {
        if self.enabled && !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}
