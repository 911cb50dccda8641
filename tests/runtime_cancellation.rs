// tests/runtime_cancellation.rs

use taskdag_test_utils::builders::{GraphBuilder, TaskSpec};
use taskdag_test_utils::fake_executor::ControllableExecutor;
use taskdag_test_utils::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use taskdag::sched::{SchedCore, SchedRuntime, TaskBatch};

type TestResult = Result<(), Box<dyn Error>>;

/// A run invalidated mid-flight is cancelled, and its replacement may not
/// act before the old run has settled.
#[tokio::test]
async fn relaunch_waits_for_prior_settlement() -> TestResult {
    init_tracing();

    let (graph, ids) = GraphBuilder::new()
        .task("build", TaskSpec::new("npm run build"))
        .build();

    // The action ignores cancellation until released, holding the first
    // run in the "cancelled but not settled" state.
    let executor = ControllableExecutor::new(false);
    let (batch_tx, batch_rx) = mpsc::channel::<TaskBatch>(16);
    let runtime = SchedRuntime::new(
        SchedCore::new(graph),
        batch_rx,
        CancellationToken::new(),
        Arc::new(executor.clone()),
    );
    let scheduler = tokio::spawn(runtime.run());

    batch_tx.send([ids["build"]].into_iter().collect()).await?;
    executor.wait_for_start("build", 1).await;

    // Invalidate while running: the replacement must block on settlement.
    batch_tx.send([ids["build"]].into_iter().collect()).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        executor.start_count("build"),
        1,
        "replacement started before the cancelled run settled"
    );

    // Settle the old run; only now may the replacement act.
    executor.release("build");
    executor.wait_for_start("build", 2).await;

    executor.release("build");
    drop(batch_tx);
    with_timeout(scheduler).await??;
    Ok(())
}

/// A persistent, interruptible task is cancelled and relaunched when a
/// change invalidates its dependency chain.
#[tokio::test]
async fn interruptible_persistent_task_restarts_on_invalidation() -> TestResult {
    init_tracing();

    let (graph, ids) = GraphBuilder::new()
        .task("build", TaskSpec::new("npm run build"))
        .task(
            "server",
            TaskSpec::new("npm run dev")
                .depends_on("build")
                .persistent(true)
                .interruptible(true),
        )
        .build();

    let executor = ControllableExecutor::new(true);
    let shutdown = CancellationToken::new();
    let (batch_tx, batch_rx) = mpsc::channel::<TaskBatch>(16);
    let runtime = SchedRuntime::new(
        SchedCore::new(graph),
        batch_rx,
        shutdown.clone(),
        Arc::new(executor.clone()),
    );
    let scheduler = tokio::spawn(runtime.run());

    batch_tx.send([ids["server"]].into_iter().collect()).await?;
    executor.wait_for_start("build", 1).await;
    executor.release("build");
    executor.wait_for_start("server", 1).await;

    // A change in build's inputs: the propagator would emit {build, server}.
    batch_tx
        .send([ids["build"], ids["server"]].into_iter().collect())
        .await?;
    executor.wait_for_start("build", 2).await;
    executor.release("build");
    executor.wait_for_start("server", 2).await;

    assert_eq!(executor.started(), vec!["build", "server", "build", "server"]);

    // Ctrl-C: the live server run is cancelled and the scheduler exits
    // cleanly.
    shutdown.cancel();
    drop(batch_tx);
    with_timeout(scheduler).await??;
    Ok(())
}

/// Shutdown does not return until every run, however unwilling, has
/// actually finished.
#[tokio::test]
async fn shutdown_waits_for_running_actions_to_settle() -> TestResult {
    init_tracing();

    let (graph, ids) = GraphBuilder::new()
        .task("slow", TaskSpec::new("sleep 999"))
        .build();

    let executor = ControllableExecutor::new(false);
    let shutdown = CancellationToken::new();
    let (batch_tx, batch_rx) = mpsc::channel::<TaskBatch>(16);
    let runtime = SchedRuntime::new(
        SchedCore::new(graph),
        batch_rx,
        shutdown.clone(),
        Arc::new(executor.clone()),
    );
    let scheduler = tokio::spawn(runtime.run());

    batch_tx.send([ids["slow"]].into_iter().collect()).await?;
    executor.wait_for_start("slow", 1).await;

    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(
        !scheduler.is_finished(),
        "scheduler returned while a run was still settling"
    );

    executor.release("slow");
    with_timeout(scheduler).await??;
    Ok(())
}
