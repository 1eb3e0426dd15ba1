mod common;

use std::collections::HashSet;
use std::sync::Arc;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use procpool_core::api::{ExecutorError, Job, JobError, JobGroup, RunnerError, Unit, WorkerPool};

use common::{FakeProcessManager, Script, SnapshotLog};

fn job(cmd: &str) -> Job {
    Job::builder(cmd.split_whitespace()).build()
}

fn strict(cmd: &str) -> Job {
    Job::builder(cmd.split_whitespace()).fail_ok(false).build()
}

fn pool(manager: &Arc<FakeProcessManager>, workers: usize) -> WorkerPool {
    WorkerPool::builder(manager.clone()).workers(workers).build()
}

#[tokio::test]
async fn two_independent_jobs_complete() {
    let fake = FakeProcessManager::new();
    fake.script("cmd1", Script::ok("one").delay_ms(20));
    fake.script("cmd2", Script::ok("two").delay_ms(20));
    let log = SnapshotLog::default();
    let pool = WorkerPool::builder(fake.clone())
        .workers(2)
        .reporter(log.reporter())
        .build();

    let finished = pool
        .run_to_completion([job("cmd1"), job("cmd2")])
        .await
        .unwrap();

    let names: HashSet<_> = finished.iter().map(|j| j.name().to_string()).collect();
    assert_eq!(names, HashSet::from(["cmd1".to_string(), "cmd2".to_string()]));
    assert!(finished.iter().all(Job::succeeded));
    assert_eq!(fake.peak(), 2);

    let last = log.last().unwrap();
    assert_eq!(
        (last.total, last.completed, last.failed, last.pending, last.in_flight),
        (2, 2, 0, 0, 0)
    );
    assert_eq!(log.all().first().unwrap().pending, 2);
}

#[tokio::test]
async fn concurrency_never_exceeds_worker_count() {
    let fake = FakeProcessManager::new();
    let jobs: Vec<Job> = (0..8)
        .map(|i| {
            let cmd = format!("sleep{i}");
            fake.script(&cmd, Script::ok("").delay_ms(15));
            job(&cmd)
        })
        .collect();

    let finished = pool(&fake, 3).run_to_completion(jobs).await.unwrap();

    assert_eq!(finished.len(), 8);
    assert!(fake.peak() <= 3, "peak was {}", fake.peak());
    assert!(fake.peak() >= 2, "peak was {}", fake.peak());
}

#[tokio::test]
async fn group_members_finish_in_declaration_order() {
    let fake = FakeProcessManager::new();
    let mut groups = Vec::new();
    for g in ["x", "y"] {
        let members: Vec<Job> = (0..4)
            .map(|i| {
                let cmd = format!("{g}{i}");
                // later members are faster, so only the chain keeps them ordered
                fake.script(&cmd, Script::ok("").delay_ms(20 - i * 5));
                job(&cmd)
            })
            .collect();
        groups.push(JobGroup::new(g, members).unwrap());
    }
    let other = job("other");

    let units: Vec<Unit> = vec![
        Unit::from(&groups[0]),
        Unit::from(&other),
        Unit::from(&groups[1]),
    ];
    let finished = pool(&fake, 4).run_to_completion(units).await.unwrap();

    // one entry per job, none for the groups themselves
    assert_eq!(finished.len(), 9);
    for g in ["x", "y"] {
        let order: Vec<_> = finished
            .iter()
            .map(|j| j.name())
            .filter(|n| n.starts_with(g))
            .collect();
        assert_eq!(order, vec![format!("{g}0"), format!("{g}1"), format!("{g}2"), format!("{g}3")]);
    }
    assert!(groups.iter().all(JobGroup::is_complete));
}

#[tokio::test]
async fn dependent_of_failed_job_is_never_spawned() {
    let fake = FakeProcessManager::new();
    fake.script("a", Script::exit(1));
    let a = job("a");
    let b = job("b");
    b.add_dependency(&a).unwrap();

    let finished = pool(&fake, 2).run_to_completion([&a, &b].map(Unit::from)).await.unwrap();

    assert_eq!(finished.len(), 2);
    assert_eq!(fake.calls(), vec!["a"]);
    assert!(!fake.was_called("b"));

    let a_err = a.exception().unwrap();
    assert!(matches!(
        a_err.as_ref(),
        JobError::Process(RunnerError::NonZeroExit { exit_code: 1, .. })
    ));
    assert_eq!(a.result().exit_code, 1);

    let b_err = b.exception().unwrap();
    assert!(b_err.is_inherited());
    assert!(b_err.to_string().contains("'a'"));
    assert_eq!(b.result().exit_code, -1);
}

#[tokio::test]
async fn failure_cascades_down_a_chain() {
    let fake = FakeProcessManager::new();
    fake.script("root", Script::exit(2));
    let chain: Vec<Job> = ["root", "l1", "l2", "l3"].into_iter().map(job).collect();
    for pair in chain.windows(2) {
        pair[1].add_dependency(&pair[0]).unwrap();
    }

    let finished = pool(&fake, 4).run_to_completion(chain.clone()).await.unwrap();

    assert_eq!(finished.len(), 4);
    assert_eq!(fake.calls(), vec!["root"]);
    assert!(chain[1..]
        .iter()
        .all(|j| j.exception().is_some_and(|e| e.is_inherited())));
}

#[tokio::test]
async fn dependents_of_a_group_wait_for_every_member() {
    let fake = FakeProcessManager::new();
    fake.script("m0", Script::ok("").delay_ms(10));
    fake.script("m1", Script::ok("").delay_ms(10));
    let group = JobGroup::new("g", vec![job("m0"), job("m1")]).unwrap();
    let after = job("after");
    after.add_dependency(&group).unwrap();

    let finished = pool(&fake, 3)
        .run_to_completion([Unit::from(&after), Unit::from(&group)])
        .await
        .unwrap();

    let names: Vec<_> = finished.iter().map(|j| j.name()).collect();
    assert_eq!(names, vec!["m0", "m1", "after"]);
}

#[tokio::test]
async fn failed_group_member_fails_group_dependents() {
    let fake = FakeProcessManager::new();
    fake.script("m0", Script::exit(1));
    let group = JobGroup::new("g", vec![job("m0"), job("m1")]).unwrap();
    let after = job("after");
    after.add_dependency(&group).unwrap();

    pool(&fake, 2)
        .run_to_completion([Unit::from(&group), Unit::from(&after)])
        .await
        .unwrap();

    assert_eq!(fake.calls(), vec!["m0"]);
    assert!(after.exception().unwrap().is_inherited());
}

#[tokio::test]
async fn indirect_cycle_is_rejected_before_anything_runs() {
    let fake = FakeProcessManager::new();
    let (a, b, c) = (job("a"), job("b"), job("c"));
    a.add_dependency(&b).unwrap();
    b.add_dependency(&c).unwrap();
    c.add_dependency(&a).unwrap();
    let free = job("free");

    let err = pool(&fake, 2)
        .run_to_completion([&a, &b, &c, &free].map(Unit::from))
        .await
        .unwrap_err();

    match err {
        ExecutorError::CircularDependency { path } => {
            assert_eq!(path, vec!["a", "b", "c", "a"]);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(fake.calls().is_empty());
    // nothing was frozen, the graph can still be fixed
    assert!(c.remove_dependency(&Unit::from(&a)).unwrap());
}

#[tokio::test]
async fn dangling_dependency_is_a_configuration_error() {
    let fake = FakeProcessManager::new();
    let a = job("a");
    a.add_dependency(&job("elsewhere")).unwrap();

    let err = pool(&fake, 1).run_to_completion([a]).await.unwrap_err();

    assert!(err.is_configuration());
    assert!(err.to_string().contains("elsewhere"));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn input_chunks_are_forwarded_to_stdin() {
    let fake = FakeProcessManager::new();
    fake.script("cat", Script::ok("input"));
    let cat = Job::builder(["cat"]).input_chunks(["input"]).build();

    pool(&fake, 1).run_to_completion([&cat]).await.unwrap();

    assert_eq!(fake.stdin_received("cat"), vec!["input".to_string()]);
    assert_eq!(cat.result().stdout_text(), "input");
}

#[tokio::test]
async fn intolerable_failure_aborts_with_captured_output() {
    let fake = FakeProcessManager::new();
    fake.script(
        "broken",
        Script {
            stdout: "partial".into(),
            stderr: "oops".into(),
            exit_code: -1,
            ..Script::default()
        },
    );
    let broken = strict("broken");

    let err = pool(&fake, 2)
        .run_to_completion([&broken])
        .await
        .unwrap_err();

    assert!(matches!(err, ExecutorError::JobFailed { ref job, .. } if job == "broken"));
    let result = broken.result();
    assert_eq!(result.exit_code, -1);
    assert_eq!(result.stdout_text(), "partial");
    assert_eq!(result.stderr_text(), "oops");
    assert_eq!(result.output_text().len(), "partialoops".len());
    assert!(result.output_text().contains("partial"));
    assert!(result.output_text().contains("oops"));
}

#[tokio::test]
async fn abort_stops_dispatch_but_lets_in_flight_jobs_finish() {
    let fake = FakeProcessManager::new();
    fake.script("fatal", Script::exit(1));
    fake.script("slow", Script::ok("done").delay_ms(50));
    let fatal = strict("fatal");
    let slow = job("slow");
    let later = job("later");
    later.add_dependency(&fatal).unwrap();
    let queued = job("queued");
    queued.add_dependency(&slow).unwrap();

    let mut stream = pool(&fake, 2)
        .start_workers([&fatal, &slow, &later, &queued].map(Unit::from))
        .unwrap();

    let mut finished = Vec::new();
    let mut error = None;
    while let Some(item) = stream.next().await {
        match item {
            Ok(job) => finished.push(job.name().to_string()),
            Err(e) => error = Some(e),
        }
    }

    assert!(matches!(error, Some(ExecutorError::JobFailed { .. })));
    assert!(slow.succeeded(), "in-flight sibling should finish");
    assert_eq!(slow.result().stdout_text(), "done");
    assert!(!fake.was_called("queued"));
    assert!(!fake.was_called("later"));
    assert!(!queued.is_finished());
    assert_eq!(finished, vec!["fatal", "slow"]);
}

#[tokio::test]
async fn spawn_failure_is_tolerated_when_fail_ok() {
    let fake = FakeProcessManager::new();
    fake.script(
        "missing",
        Script {
            spawn_error: Some("No such file or directory".into()),
            ..Script::default()
        },
    );
    let missing = job("missing");
    let fine = job("fine");

    let finished = pool(&fake, 2)
        .run_to_completion([&missing, &fine])
        .await
        .unwrap();

    assert_eq!(finished.len(), 2);
    assert!(fine.succeeded());
    let err = missing.exception().unwrap();
    assert!(matches!(
        err.as_ref(),
        JobError::Process(RunnerError::Spawn { .. })
    ));
    assert_eq!(missing.result().exit_code, -1);
}

#[tokio::test]
async fn pool_runs_one_batch_at_a_time_and_is_reusable() {
    let fake = FakeProcessManager::new();
    fake.script("first", Script::ok("").delay_ms(30));
    let pool = pool(&fake, 2);

    let stream = pool.start_workers([job("first")]).unwrap();
    assert!(matches!(
        pool.start_workers([job("second")]),
        Err(ExecutorError::PoolBusy)
    ));
    assert_eq!(stream.collect_all().await.unwrap().len(), 1);

    let again = pool.run_to_completion([job("third")]).await.unwrap();
    assert_eq!(again.len(), 1);
    assert_eq!(fake.calls(), vec!["first", "third"]);
}

#[tokio::test]
async fn jobs_cannot_be_submitted_twice() {
    let fake = FakeProcessManager::new();
    let a = job("a");
    let pool = pool(&fake, 1);

    pool.run_to_completion([&a]).await.unwrap();
    assert!(matches!(
        pool.run_to_completion([&a]).await,
        Err(ExecutorError::AlreadySubmitted(_))
    ));
    assert!(matches!(
        a.add_dependency(&job("b")),
        Err(ExecutorError::DependenciesFrozen(_))
    ));
}

#[tokio::test]
async fn empty_batch_drains_immediately() {
    let fake = FakeProcessManager::new();
    let finished = pool(&fake, 4)
        .run_to_completion(Vec::<Unit>::new())
        .await
        .unwrap();
    assert!(finished.is_empty());
}
