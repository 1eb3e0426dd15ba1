//! Per-batch bookkeeping: pending → in-flight → completed | failed.

use std::collections::HashSet;

use crate::error::ExecutorError;

use super::graph::DependencyGraph;
use super::job::{Job, JobGroup, Unit, UnitId};
use super::progress::ProgressSnapshot;

/// What a worker should do next.
#[derive(Debug)]
pub(crate) enum Pick {
    /// Spawn this job; it is now in flight.
    Run(Job),
    /// The job's dependency failed; it was moved to failed without running.
    Inherit { job: Job, dependency: String },
    /// A group's members all finished; the marker was moved to a final state.
    Marker { group: JobGroup, failed: bool },
    /// Nothing is ready yet but other work is in flight.
    Wait,
    /// Nothing is ready and nothing is in flight.
    Stuck(Vec<String>),
    /// No pending work left, or the batch was aborted.
    Done,
}

#[derive(Debug, Default)]
pub(crate) struct BatchState {
    active: bool,
    total_jobs: usize,
    pending: Vec<UnitId>,
    in_flight: HashSet<UnitId>,
    completed: HashSet<UnitId>,
    failed: HashSet<UnitId>,
    fatal: Option<ExecutorError>,
}

impl BatchState {
    pub fn is_idle(&self) -> bool {
        !self.active
            && self.pending.is_empty()
            && self.in_flight.is_empty()
            && self.completed.is_empty()
            && self.failed.is_empty()
            && self.fatal.is_none()
    }

    pub fn begin(&mut self, graph: &DependencyGraph) {
        self.active = true;
        self.total_jobs = graph.job_count();
        self.pending = graph.ids_in_order().to_vec();
    }

    pub fn is_aborted(&self) -> bool {
        self.fatal.is_some()
    }

    /// Record a fatal error. The first one wins; later ones are only logged.
    pub fn abort(&mut self, err: ExecutorError) {
        match &self.fatal {
            Some(first) => {
                tracing::warn!(error = %err, first = %first, "batch already aborted");
            }
            None => self.fatal = Some(err),
        }
    }

    fn is_finished(&self, id: UnitId) -> bool {
        self.completed.contains(&id) || self.failed.contains(&id)
    }

    pub fn next_ready(&mut self, graph: &DependencyGraph) -> Pick {
        if self.fatal.is_some() || self.pending.is_empty() {
            return Pick::Done;
        }

        let ready = self.pending.iter().position(|id| {
            graph.node(*id).is_some_and(|node| {
                node.dependencies
                    .iter()
                    .all(|dep| self.is_finished(dep.id()))
            })
        });

        let Some(pos) = ready else {
            if self.in_flight.is_empty() {
                let pending = self
                    .pending
                    .iter()
                    .filter_map(|id| graph.node(*id))
                    .map(|n| n.unit.name().to_string())
                    .collect();
                return Pick::Stuck(pending);
            }
            return Pick::Wait;
        };

        let id = self.pending.remove(pos);
        let Some(node) = graph.node(id) else {
            return Pick::Stuck(vec![id.to_string()]);
        };

        let failed_dep = node
            .dependencies
            .iter()
            .find(|dep| self.failed.contains(&dep.id()));

        match &node.unit {
            Unit::Group(group) => {
                let failed = failed_dep.is_some();
                if failed {
                    self.failed.insert(id);
                } else {
                    self.completed.insert(id);
                }
                Pick::Marker {
                    group: group.clone(),
                    failed,
                }
            }
            Unit::Job(job) => match failed_dep {
                Some(dep) => {
                    self.failed.insert(id);
                    Pick::Inherit {
                        job: job.clone(),
                        dependency: dep.name().to_string(),
                    }
                }
                None => {
                    self.in_flight.insert(id);
                    Pick::Run(job.clone())
                }
            },
        }
    }

    pub fn finish(&mut self, id: UnitId, failed: bool) {
        self.in_flight.remove(&id);
        if failed {
            self.failed.insert(id);
        } else {
            self.completed.insert(id);
        }
    }

    pub fn snapshot(&self, graph: &DependencyGraph) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total_jobs,
            completed: count_jobs(graph, self.completed.iter()),
            in_flight: self.in_flight.len(),
            pending: count_jobs(graph, self.pending.iter()),
            failed: count_jobs(graph, self.failed.iter()),
        }
    }

    /// Close the batch and reset to the idle state.
    ///
    /// Returns the fatal error if the batch was aborted, or an
    /// inconsistency if work was left behind in a batch that was not.
    pub fn end(&mut self) -> Result<(), ExecutorError> {
        let fatal = self.fatal.take();
        let leftover = if !self.in_flight.is_empty() {
            Some(format!("{} unit(s) still in flight", self.in_flight.len()))
        } else if fatal.is_none() && !self.pending.is_empty() {
            Some(format!("{} unit(s) still pending", self.pending.len()))
        } else {
            None
        };
        *self = Self::default();

        match (fatal, leftover) {
            (Some(err), _) => Err(err),
            (None, Some(msg)) => Err(ExecutorError::Inconsistent(msg)),
            (None, None) => Ok(()),
        }
    }
}

fn count_jobs<'a>(graph: &DependencyGraph, ids: impl Iterator<Item = &'a UnitId>) -> usize {
    ids.filter(|id| graph.node(**id).is_some_and(|n| n.is_job()))
        .count()
}
