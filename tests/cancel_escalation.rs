mod common;
use crate::common::{RecordingEncoder, fast_timings, init_tracing, with_timeout_secs};

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use execd::errors::ExecError;
use execd::exec::{
    CmdExecutor, CommandSpec, ExitOutcome, ExecutorRegistry, output_channels, spawn_scanners,
};

type TestResult = Result<(), Box<dyn Error>>;

/// Start `spec` and drive it the way the HTTP handler does: run loop, then
/// wait. Returns the final outcome.
fn start(exec: &Arc<CmdExecutor>, spec: &CommandSpec) -> JoinHandle<ExitOutcome> {
    let pipes = exec.execute(spec).unwrap();
    drive(Arc::clone(exec), pipes)
}

fn drive(exec: Arc<CmdExecutor>, pipes: execd::exec::ProcessPipes) -> JoinHandle<ExitOutcome> {
    tokio::spawn(async move {
        let (senders, mut channels) = output_channels();
        spawn_scanners(pipes.stdout, pipes.stderr, exec.exec_id(), &senders);
        drop(senders);
        let _ = exec.run(&mut channels, &mut RecordingEncoder::new()).await;
        ExitOutcome::from_wait(exec.wait().await)
    })
}

#[tokio::test]
async fn sigterm_cancels_a_cooperative_process() -> TestResult {
    init_tracing();
    let exec = Arc::new(CmdExecutor::new("cancel-term", fast_timings()));
    let handle = start(&exec, &CommandSpec::new("sleep").with_args(["100"]));

    with_timeout_secs(5, exec.cancel()).await?;

    let outcome = with_timeout_secs(5, handle).await?;
    assert_eq!(outcome, ExitOutcome::Cancelled);
    assert!(!exec.has_active_process());
    Ok(())
}

#[tokio::test]
async fn process_ignoring_sigterm_is_killed() -> TestResult {
    init_tracing();
    let exec = Arc::new(CmdExecutor::new("cancel-kill", fast_timings()));
    let spec = CommandSpec::new("sh").with_args(["-c", "trap '' TERM; sleep 100"]);
    let handle = start(&exec, &spec);

    // Let the shell install its trap before signalling.
    tokio::time::sleep(Duration::from_millis(100)).await;
    with_timeout_secs(5, exec.cancel()).await?;

    let outcome = with_timeout_secs(5, handle).await?;
    assert_eq!(outcome, ExitOutcome::Killed);
    Ok(())
}

#[tokio::test]
async fn cancel_with_no_process_returns_immediately() -> TestResult {
    let exec = CmdExecutor::new("idle", fast_timings());
    with_timeout_secs(1, exec.cancel()).await?;
    Ok(())
}

#[tokio::test]
async fn cancel_times_out_without_a_run_loop() -> TestResult {
    init_tracing();
    let exec = Arc::new(CmdExecutor::new("no-loop", fast_timings()));
    let pipes = exec.execute(&CommandSpec::new("sleep").with_args(["100"]))?;

    // Nobody delivers queued signals, so the process never dies.
    let err = with_timeout_secs(5, exec.cancel()).await.unwrap_err();
    assert!(matches!(err, ExecError::CancelTimeout(ref id) if id == "no-loop"));
    assert!(exec.has_active_process());

    // The pending SIGTERM is delivered as soon as a run loop starts.
    let outcome = with_timeout_secs(5, drive(Arc::clone(&exec), pipes)).await?;
    assert_eq!(outcome, ExitOutcome::Cancelled);
    Ok(())
}

#[tokio::test]
async fn cancel_reaches_grandchildren_in_the_process_group() -> TestResult {
    init_tracing();
    let exec = Arc::new(CmdExecutor::new("group", fast_timings()));
    // The inner sleep holds stdout open; the stream only ends if it dies too.
    let spec = CommandSpec::new("sh").with_args(["-c", "sleep 100; echo never"]);
    let handle = start(&exec, &spec);

    with_timeout_secs(5, exec.cancel()).await?;
    let outcome = with_timeout_secs(5, handle).await?;
    assert_eq!(outcome, ExitOutcome::Cancelled);
    Ok(())
}

#[tokio::test]
async fn registry_handles_many_concurrent_executors() -> TestResult {
    let registry = Arc::new(ExecutorRegistry::new(fast_timings()));

    let mut creates = Vec::new();
    for _ in 0..100 {
        let registry = Arc::clone(&registry);
        creates.push(tokio::spawn(async move {
            registry.create_executor().exec_id().to_string()
        }));
    }
    let mut ids = Vec::new();
    for c in creates {
        ids.push(c.await?);
    }
    assert_eq!(registry.len(), 100);

    let mut deletes = Vec::new();
    for id in ids {
        let registry = Arc::clone(&registry);
        deletes.push(tokio::spawn(async move {
            registry.delete_executor(Some(&id)).await
        }));
    }
    for d in deletes {
        d.await??;
    }
    assert!(registry.is_empty());
    Ok(())
}
