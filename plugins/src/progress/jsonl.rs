use std::io::Write;
use std::sync::Mutex;

use serde::Serialize;

use procpool_core::api::{Job, ProgressReporter, ProgressSnapshot};

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub v: i32,
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub ts: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotFields>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SnapshotFields {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub pending: usize,
}

impl From<&ProgressSnapshot> for SnapshotFields {
    fn from(s: &ProgressSnapshot) -> Self {
        Self {
            total: s.total,
            completed: s.completed,
            failed: s.failed,
            in_flight: s.in_flight,
            pending: s.pending,
        }
    }
}

/// One JSON object per line: `progress` after each state change, `job` per finished job.
pub struct JsonlReporter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonlReporter {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn emit(&self, ev: &ProgressEvent) {
        let Ok(line) = serde_json::to_string(ev) else {
            return;
        };
        let mut out = match self.out.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            tracing::debug!(error = %e, "jsonl progress write failed");
        }
    }
}

fn now() -> String {
    chrono::Local::now().to_rfc3339()
}

impl ProgressReporter for JsonlReporter {
    fn report(&self, snapshot: &ProgressSnapshot) {
        self.emit(&ProgressEvent {
            v: 1,
            event_type: "progress",
            ts: now(),
            snapshot: Some(snapshot.into()),
            job: None,
            code: None,
            error: None,
        });
    }

    fn job_finished(&self, job: &Job) {
        let error = job.exception().map(|e| e.to_string());
        self.emit(&ProgressEvent {
            v: 1,
            event_type: "job",
            ts: now(),
            snapshot: None,
            job: Some(job.name().to_string()),
            code: Some(job.result().exit_code),
            error,
        });
    }
}
