use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::error::{ExecutorError, JobError};
use crate::runner::{InputStream, ProcessResult, ProcessSpec};

static NEXT_UNIT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a job or group, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(u64);

impl UnitId {
    fn next() -> Self {
        Self(NEXT_UNIT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What the scheduler recorded for a finished job.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub result: Arc<ProcessResult>,
    pub exception: Option<Arc<JobError>>,
}

struct JobInner {
    id: UnitId,
    name: String,
    command: Vec<String>,
    cwd: Option<PathBuf>,
    envs: HashMap<String, String>,
    include_parent_env: bool,
    shell: bool,
    fail_ok: bool,
    input: Mutex<Option<InputStream>>,
    dependencies: Mutex<Vec<Unit>>,
    frozen: AtomicBool,
    outcome: OnceLock<JobOutcome>,
}

/// A single external command. Cloning yields another handle to the same job.
#[derive(Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

pub struct JobBuilder {
    command: Vec<String>,
    name: Option<String>,
    cwd: Option<PathBuf>,
    envs: HashMap<String, String>,
    include_parent_env: bool,
    shell: bool,
    fail_ok: bool,
    input: Option<InputStream>,
}

impl JobBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.insert(key.into(), value.into());
        self
    }

    pub fn include_parent_env(mut self, yes: bool) -> Self {
        self.include_parent_env = yes;
        self
    }

    pub fn shell(mut self, yes: bool) -> Self {
        self.shell = yes;
        self
    }

    /// When false, a failure of this job aborts the whole batch.
    pub fn fail_ok(mut self, yes: bool) -> Self {
        self.fail_ok = yes;
        self
    }

    pub fn input_chunks<I, B>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Bytes> = chunks.into_iter().map(Into::into).collect();
        self.input = Some(futures::stream::iter(chunks).boxed());
        self
    }

    /// Feed stdin from a stream; each item is written as soon as it is produced.
    pub fn input_stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Bytes> + Send + 'static,
    {
        self.input = Some(stream.boxed());
        self
    }

    pub fn build(self) -> Job {
        let name = self.name.unwrap_or_else(|| self.command.join(" "));
        Job {
            inner: Arc::new(JobInner {
                id: UnitId::next(),
                name,
                command: self.command,
                cwd: self.cwd,
                envs: self.envs,
                include_parent_env: self.include_parent_env,
                shell: self.shell,
                fail_ok: self.fail_ok,
                input: Mutex::new(self.input),
                dependencies: Mutex::new(Vec::new()),
                frozen: AtomicBool::new(false),
                outcome: OnceLock::new(),
            }),
        }
    }
}

impl Job {
    pub fn builder<I, S>(command: I) -> JobBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        JobBuilder {
            command: command.into_iter().map(Into::into).collect(),
            name: None,
            cwd: None,
            envs: HashMap::new(),
            include_parent_env: true,
            shell: false,
            fail_ok: true,
            input: None,
        }
    }

    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::builder(command).build()
    }

    pub fn id(&self) -> UnitId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn command(&self) -> &[String] {
        &self.inner.command
    }

    pub fn cwd(&self) -> Option<&PathBuf> {
        self.inner.cwd.as_ref()
    }

    pub fn fail_ok(&self) -> bool {
        self.inner.fail_ok
    }

    pub fn shell(&self) -> bool {
        self.inner.shell
    }

    pub fn dependencies(&self) -> Vec<Unit> {
        lock(&self.inner.dependencies).clone()
    }

    /// Make this job wait for `dep`.
    ///
    /// Self dependencies and direct mutual dependencies are rejected here;
    /// longer cycles are found when the batch is submitted.
    pub fn add_dependency(&self, dep: impl Into<Unit>) -> Result<(), ExecutorError> {
        let dep = dep.into();
        if self.is_frozen() {
            return Err(ExecutorError::DependenciesFrozen(self.name().to_string()));
        }
        if dep.id() == self.id() {
            return Err(ExecutorError::SelfDependency);
        }
        if dep.depends_directly_on(self.id()) {
            return Err(ExecutorError::MutualDependency {
                a: self.name().to_string(),
                b: dep.name().to_string(),
            });
        }

        let mut deps = lock(&self.inner.dependencies);
        if !deps.iter().any(|d| d.id() == dep.id()) {
            deps.push(dep);
        }
        Ok(())
    }

    /// Returns whether `dep` was a dependency.
    pub fn remove_dependency(&self, dep: &Unit) -> Result<bool, ExecutorError> {
        if self.is_frozen() {
            return Err(ExecutorError::DependenciesFrozen(self.name().to_string()));
        }
        let mut deps = lock(&self.inner.dependencies);
        let before = deps.len();
        deps.retain(|d| d.id() != dep.id());
        Ok(deps.len() != before)
    }

    /// Result of the run; the empty-success sentinel until the job finishes.
    pub fn result(&self) -> Arc<ProcessResult> {
        match self.inner.outcome.get() {
            Some(outcome) => outcome.result.clone(),
            None => Arc::new(ProcessResult::empty_success()),
        }
    }

    pub fn exception(&self) -> Option<Arc<JobError>> {
        self.inner
            .outcome
            .get()
            .and_then(|outcome| outcome.exception.clone())
    }

    pub fn outcome(&self) -> Option<&JobOutcome> {
        self.inner.outcome.get()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.outcome.get().is_some()
    }

    pub fn succeeded(&self) -> bool {
        self.inner
            .outcome
            .get()
            .is_some_and(|outcome| outcome.exception.is_none())
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);
    }

    pub(crate) fn depends_on(&self, id: UnitId) -> bool {
        lock(&self.inner.dependencies).iter().any(|d| d.id() == id)
    }

    pub(crate) fn take_input(&self) -> Option<InputStream> {
        lock(&self.inner.input).take()
    }

    pub(crate) fn process_spec(&self) -> ProcessSpec {
        let mut spec = ProcessSpec::from_argv(&self.inner.command);
        spec.cwd = self.inner.cwd.clone();
        spec.envs = self.inner.envs.clone();
        spec.include_parent_env = self.inner.include_parent_env;
        spec.shell = self.inner.shell;
        spec
    }

    /// Record the outcome. Only the first call has an effect.
    pub(crate) fn finish(&self, outcome: JobOutcome) -> bool {
        self.inner.outcome.set(outcome).is_ok()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Job {}

impl Hash for Job {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("fail_ok", &self.fail_ok())
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct GroupInner {
    id: UnitId,
    name: String,
    members: Vec<Job>,
    dependencies: Mutex<Vec<Unit>>,
    /// Edges this group put on its first member.
    placed: Mutex<Vec<UnitId>>,
    frozen: AtomicBool,
}

/// Jobs that run one after another, in declaration order.
///
/// Each member depends on its predecessor; dependencies of the group are
/// attached to the first member. The group itself never runs a process.
#[derive(Clone)]
pub struct JobGroup {
    inner: Arc<GroupInner>,
}

impl JobGroup {
    pub fn new(name: impl Into<String>, members: Vec<Job>) -> Result<Self, ExecutorError> {
        let name = name.into();
        if members.is_empty() {
            return Err(ExecutorError::EmptyGroup(name));
        }

        // A rejected group leaves its members as it found them.
        let mut added: Vec<(&Job, &Job)> = Vec::new();
        for pair in members.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let existed = next.depends_on(prev.id());
            if let Err(err) = next.add_dependency(prev) {
                for (next, prev) in added {
                    let _ = next.remove_dependency(&Unit::from(prev));
                }
                return Err(err);
            }
            if !existed {
                added.push((next, prev));
            }
        }

        Ok(Self {
            inner: Arc::new(GroupInner {
                id: UnitId::next(),
                name,
                members,
                dependencies: Mutex::new(Vec::new()),
                placed: Mutex::new(Vec::new()),
                frozen: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> UnitId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn members(&self) -> &[Job] {
        &self.inner.members
    }

    pub fn dependencies(&self) -> Vec<Unit> {
        lock(&self.inner.dependencies).clone()
    }

    pub fn add_dependency(&self, dep: impl Into<Unit>) -> Result<(), ExecutorError> {
        let dep = dep.into();
        if self.is_frozen() {
            return Err(ExecutorError::DependenciesFrozen(self.name().to_string()));
        }
        if dep.id() == self.id() {
            return Err(ExecutorError::SelfDependency);
        }
        if dep.depends_directly_on(self.id()) || self.contains(dep.id()) {
            return Err(ExecutorError::MutualDependency {
                a: self.name().to_string(),
                b: dep.name().to_string(),
            });
        }

        let first = &self.inner.members[0];
        let existed = first.depends_on(dep.id());
        first.add_dependency(dep.clone())?;
        if !existed {
            lock(&self.inner.placed).push(dep.id());
        }
        let mut deps = lock(&self.inner.dependencies);
        if !deps.iter().any(|d| d.id() == dep.id()) {
            deps.push(dep);
        }
        Ok(())
    }

    pub fn remove_dependency(&self, dep: &Unit) -> Result<bool, ExecutorError> {
        if self.is_frozen() {
            return Err(ExecutorError::DependenciesFrozen(self.name().to_string()));
        }
        let mut deps = lock(&self.inner.dependencies);
        let before = deps.len();
        deps.retain(|d| d.id() != dep.id());
        if deps.len() == before {
            return Ok(false);
        }
        drop(deps);

        // Edges the caller put on the first member directly stay.
        let mut placed = lock(&self.inner.placed);
        if let Some(pos) = placed.iter().position(|id| *id == dep.id()) {
            placed.remove(pos);
            self.inner.members[0].remove_dependency(dep)?;
        }
        Ok(true)
    }

    /// True once every member has finished, successfully or not.
    pub fn is_complete(&self) -> bool {
        self.inner.members.iter().all(Job::is_finished)
    }

    pub(crate) fn contains(&self, id: UnitId) -> bool {
        self.inner.members.iter().any(|m| m.id() == id)
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    pub(crate) fn freeze(&self) {
        self.inner.frozen.store(true, Ordering::Release);
    }
}

impl PartialEq for JobGroup {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for JobGroup {}

impl Hash for JobGroup {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for JobGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobGroup")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("members", &self.inner.members.len())
            .finish()
    }
}

/// Anything that can be submitted to a pool or depended upon.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Unit {
    Job(Job),
    Group(JobGroup),
}

impl Unit {
    pub fn id(&self) -> UnitId {
        match self {
            Self::Job(job) => job.id(),
            Self::Group(group) => group.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Job(job) => job.name(),
            Self::Group(group) => group.name(),
        }
    }

    /// Flat list of schedulable units: a job yields itself, a group yields
    /// its members followed by itself as the completion marker.
    pub fn expand(&self) -> Vec<Unit> {
        match self {
            Self::Job(job) => vec![Self::Job(job.clone())],
            Self::Group(group) => group
                .members()
                .iter()
                .cloned()
                .map(Self::Job)
                .chain(std::iter::once(Self::Group(group.clone())))
                .collect(),
        }
    }

    pub(crate) fn depends_directly_on(&self, id: UnitId) -> bool {
        match self {
            Self::Job(job) => job.depends_on(id),
            Self::Group(group) => {
                group.contains(id) || lock(&group.inner.dependencies).iter().any(|d| d.id() == id)
            }
        }
    }

    pub(crate) fn is_frozen(&self) -> bool {
        match self {
            Self::Job(job) => job.is_frozen(),
            Self::Group(group) => group.is_frozen(),
        }
    }

    pub(crate) fn freeze(&self) {
        match self {
            Self::Job(job) => job.freeze(),
            Self::Group(group) => group.freeze(),
        }
    }
}

impl From<Job> for Unit {
    fn from(job: Job) -> Self {
        Self::Job(job)
    }
}

impl From<&Job> for Unit {
    fn from(job: &Job) -> Self {
        Self::Job(job.clone())
    }
}

impl From<JobGroup> for Unit {
    fn from(group: JobGroup) -> Self {
        Self::Group(group)
    }
}

impl From<&JobGroup> for Unit {
    fn from(group: &JobGroup) -> Self {
        Self::Group(group.clone())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
