use super::job::Job;

/// Aggregate job counts of a running batch. Group markers are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub in_flight: usize,
    pub pending: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    pub fn finished(&self) -> usize {
        self.completed + self.failed
    }

    pub fn is_drained(&self) -> bool {
        self.pending == 0 && self.in_flight == 0
    }
}

/// Observer of scheduler state changes.
///
/// Called synchronously on the scheduler task after every bookkeeping
/// change, so implementations must return quickly.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, snapshot: &ProgressSnapshot);

    /// Called once per job after its outcome is recorded.
    fn job_finished(&self, _job: &Job) {}
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn report(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}
