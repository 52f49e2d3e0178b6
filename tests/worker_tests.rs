mod common;

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use common::{DOUBLER, Fixture, problem, seed_submission, test_registry};
use judged::config::ShutdownPolicy;
use judged::database as db;
use judged::judge::Judge;
use judged::models::SubmissionState;
use judged::workdir::Workdir;
use judged::worker::Worker;

async fn wait_for_states(pool: &SqlitePool, ids: &[i64], expected: &[SubmissionState]) {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let mut states = Vec::new();
        for &id in ids {
            states.push(db::fetch_record(pool, id).await.unwrap().state);
        }
        if states == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "submissions not judged in time: {states:?}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn test_worker_processes_queue_and_survives_failures() {
    let (pool, _guard) = common::create_test_db("worker").await;
    let fixture = Fixture::new();
    fixture.write_problem("a", &[1, 2, 3], &[]);
    let config = fixture.config("worker-1");

    let good = problem("a", "/bin/sh check.sh");
    let accepted = seed_submission(&pool, &good, false, "shell", DOUBLER).await;
    // Abandoned without a state change, the loop moves on
    let abandoned = seed_submission(&pool, &problem("a", "missing-checker"), false, "shell", DOUBLER).await;
    // The interpreter cannot be spawned, so the submission is a system error
    let crashed = seed_submission(&pool, &good, false, "broken", DOUBLER).await;
    let tested = seed_submission(&pool, &good, true, "shell", DOUBLER).await;

    let scratch = tempfile::tempdir().unwrap();
    let workdir = Workdir::prepare_with(scratch.path(), true, || Ok(true)).unwrap();
    let judge = Judge::new(pool.clone(), &config, test_registry());
    let worker = Worker::new(pool.clone(), judge, workdir, &config);

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));

    wait_for_states(
        &pool,
        &[accepted, abandoned, crashed, tested],
        &[
            SubmissionState::Accepted,
            SubmissionState::Claimed,
            SubmissionState::SystemError,
            SubmissionState::Tested { score: 100.0 },
        ],
    )
    .await;

    let crash = db::fetch_record(&pool, crashed).await.unwrap();
    assert!(crash.diagnostics.unwrap().contains("Failed to spawn"));
    assert!(
        db::fetch_tester_status(&pool, "worker-1")
            .await
            .unwrap()
            .is_some()
    );

    token.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(db::fetch_tester_status(&pool, "worker-1").await.unwrap(), None);
}

#[tokio::test]
async fn test_idle_worker_stops_on_cancel() {
    let (pool, _guard) = common::create_test_db("worker").await;
    let fixture = Fixture::new();
    let config = fixture.config("worker-idle");

    let scratch = tempfile::tempdir().unwrap();
    let workdir = Workdir::prepare_with(scratch.path(), true, || Ok(true)).unwrap();
    let judge = Judge::new(pool.clone(), &config, test_registry());
    let worker = Worker::new(pool.clone(), judge, workdir, &config);

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));
    tokio::time::sleep(Duration::from_millis(200)).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(db::fetch_tester_status(&pool, "worker-idle").await.unwrap(), None);
}

/// Starts a worker on a slow solution and cancels it while test 1 runs
async fn interrupt_mid_run(on_shutdown: ShutdownPolicy) -> (SqlitePool, common::TestDbGuard, i64) {
    let (pool, guard) = common::create_test_db("shutdown").await;
    let fixture = Fixture::new();
    fixture.write_problem("a", &[1, 2, 3], &[]);
    let mut config = fixture.config("worker-shutdown");
    config.on_shutdown = on_shutdown;

    let slow = "sleep 1\nread x\necho $((x * 2))\n";
    let id = seed_submission(&pool, &problem("a", "/bin/sh check.sh"), false, "shell", slow).await;

    let scratch = tempfile::tempdir().unwrap();
    let workdir = Workdir::prepare_with(scratch.path(), true, || Ok(true)).unwrap();
    let judge = Judge::new(pool.clone(), &config, test_registry());
    let worker = Worker::new(pool.clone(), judge, workdir, &config);

    let token = CancellationToken::new();
    let handle = tokio::spawn(worker.run(token.clone()));
    wait_for_states(&pool, &[id], &[SubmissionState::Testing(1)]).await;

    token.cancel();
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("worker did not stop")
        .unwrap()
        .unwrap();
    (pool, guard, id)
}

#[tokio::test]
async fn test_shutdown_reclaims_running_submission() {
    let (pool, _guard, id) = interrupt_mid_run(ShutdownPolicy::Reclaim).await;

    let record = db::fetch_record(&pool, id).await.unwrap();
    assert_eq!(record.state, SubmissionState::Unjudged);
    assert_eq!(record.tester_name, None);
    assert!(db::fetch_test_results(&pool, id).await.unwrap().is_empty());
    assert_eq!(
        db::claim_next(&pool, "worker-2", &["sh"], &["shell"]).await.unwrap(),
        Some(id)
    );
}

#[tokio::test]
async fn test_shutdown_fails_running_submission() {
    let (pool, _guard, id) = interrupt_mid_run(ShutdownPolicy::Fail).await;

    let record = db::fetch_record(&pool, id).await.unwrap();
    assert_eq!(record.state, SubmissionState::SystemError);
    assert_eq!(
        record.diagnostics.as_deref(),
        Some("Interrupted by tester shutdown")
    );
    assert!(db::fetch_test_results(&pool, id).await.unwrap().is_empty());
}
