//! Dependency-aware worker pool for external processes.
//!
//! It supports:
//! - Jobs, ordered job groups and dependency edges between them
//! - Validation of the submitted batch (dangling references, cycles)
//! - Bounded concurrency with first-available-worker scheduling
//! - Failure propagation to dependents without spawning them
//!
//! # Architecture
//!
//! ```text
//! Vec<Unit>
//!   ↓
//! DependencyGraph::from_units()      (groups flattened: members, then marker)
//!   ↓
//! DependencyGraph::validate()        → missing deps, detect_cycle()
//!   ↓
//! WorkerPool::start_workers()        → N workers polling BatchState
//!   ↓
//! run_process() per ready job        → JobStream of finished jobs
//! ```

mod graph;
mod job;
mod pool;
mod progress;
mod state;

pub use graph::{DependencyGraph, Node};
pub use job::{Job, JobBuilder, JobGroup, JobOutcome, Unit, UnitId};
pub use pool::{JobStream, WorkerPool, WorkerPoolBuilder};
pub use progress::{ProgressReporter, ProgressSnapshot};
