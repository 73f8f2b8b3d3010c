mod common;
use crate::common::{
    NdjsonStream, TestServer, assert_terminal, fast_timings, init_tracing, messages_of,
    with_timeout, with_timeout_secs,
};

use std::error::Error;
use std::time::Duration;

use serde_json::json;

use execd::exec::CommandSpec;
use execd::httpd::ErrorResponse;
use execd::types::{OutputStatus, OutputType};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn echo_streams_started_line_and_exit() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("echo", &[]).await;

    let resp = server.execute(json!({"args": ["hello"]})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str()?,
        "application/x-ndjson"
    );
    let events = common::parse_outputs(&resp.text().await?);

    assert_eq!(events.len(), 3, "{events:?}");
    assert_eq!(events[0].output_type, OutputType::System);
    assert_eq!(events[0].status, None);
    assert_eq!(events[0].msg, "");
    assert_eq!(events[1].output_type, OutputType::Stdout);
    assert_eq!(events[1].msg, "hello");
    assert_terminal(&events, OutputType::Exit, OutputStatus::Success);

    let id = &events[0].exec_id;
    assert!(!id.is_empty());
    assert!(events.iter().all(|e| &e.exec_id == id));

    server.wait_idle().await;
    assert_eq!(server.state().free_slots(), 1);
    Ok(())
}

#[tokio::test]
async fn root_path_also_executes() -> TestResult {
    let server = TestServer::spawn_cmd("echo", &["base"]).await;

    let resp = server.post_raw("/", r#"{"args":["extra"]}"#).await;
    assert_eq!(resp.status(), 200);
    let events = common::parse_outputs(&resp.text().await?);
    assert_eq!(messages_of(&events, OutputType::Stdout), ["base extra"]);
    Ok(())
}

#[tokio::test]
async fn long_output_keeps_line_order() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("sh", &["-c"]).await;

    let events = with_timeout(server.execute_all(json!({
        "args": ["i=1; while [ $i -le 2000 ]; do echo line$i; i=$((i+1)); done"]
    })))
    .await;

    let expected: Vec<String> = (1..=2000).map(|i| format!("line{i}")).collect();
    assert_eq!(messages_of(&events, OutputType::Stdout), expected);
    assert_terminal(&events, OutputType::Exit, OutputStatus::Success);
    Ok(())
}

#[tokio::test]
async fn failing_command_ends_with_exit_error() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("grep", &[]).await;

    let events = with_timeout(server.execute_all(json!({"args": ["--non-existing-flag"]}))).await;

    assert!(!messages_of(&events, OutputType::Stderr).is_empty());
    assert_terminal(&events, OutputType::Exit, OutputStatus::Error);
    assert_eq!(events.last().map(|e| e.msg.as_str()), Some("exit status 2"));
    Ok(())
}

#[tokio::test]
async fn missing_binary_is_a_json_500() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("/definitely/not/a/binary", &[]).await;

    let resp = server.execute(json!({})).await;
    assert_eq!(resp.status(), 500);
    let body: ErrorResponse = resp.json().await?;
    assert_eq!(body.code, 500);
    assert!(body.error.contains("/definitely/not/a/binary"), "{}", body.error);

    assert!(server.state().registry.is_empty());
    assert_eq!(server.state().free_slots(), 1);
    Ok(())
}

#[tokio::test]
async fn env_values_are_passed_to_the_process() -> TestResult {
    let server = TestServer::spawn_cmd("sh", &["-c", "echo \"$GREETING $COUNT $FLAG\""]).await;

    let events = with_timeout(server.execute_all(json!({
        "env": {"GREETING": "hi", "COUNT": 3, "FLAG": true}
    })))
    .await;
    assert_eq!(messages_of(&events, OutputType::Stdout), ["hi 3 true"]);
    Ok(())
}

#[tokio::test]
async fn malformed_json_is_a_400() -> TestResult {
    let server = TestServer::spawn_cmd("echo", &[]).await;

    for path in ["/execute", "/cancel"] {
        let resp = server.post_raw(path, "{not json").await;
        assert_eq!(resp.status(), 400);
        let body: ErrorResponse = resp.json().await?;
        assert_eq!(body.code, 400);
        assert!(body.error.starts_with("invalid body"), "{}", body.error);
    }
    assert!(server.state().registry.is_empty());
    Ok(())
}

#[tokio::test]
async fn cancel_ends_stream_with_cancelled_event() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("sleep", &[]).await;

    let mut stream = NdjsonStream::new(server.execute(json!({"args": ["100"]})).await);
    let started = with_timeout(stream.next_event()).await.expect("started event");
    assert_eq!(started.output_type, OutputType::System);

    let resp = server.cancel(json!({"execID": started.exec_id})).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await?, "{}");

    let rest = with_timeout(stream.collect_rest()).await;
    assert_terminal(&rest, OutputType::System, OutputStatus::Cancelled);
    assert_eq!(rest.last().map(|e| e.exec_id.as_str()), Some(started.exec_id.as_str()));

    server.wait_idle().await;
    Ok(())
}

#[tokio::test]
async fn cancel_without_id_targets_the_only_execution() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("sleep", &["100"]).await;

    let mut stream = NdjsonStream::new(server.execute(json!({})).await);
    with_timeout(stream.next_event()).await.expect("started event");

    let resp = server.cancel(json!({})).await;
    assert_eq!(resp.status(), 200);

    let rest = with_timeout(stream.collect_rest()).await;
    assert_terminal(&rest, OutputType::System, OutputStatus::Cancelled);
    Ok(())
}

#[tokio::test]
async fn cancel_errors_are_400s() -> TestResult {
    init_tracing();
    let server = TestServer::spawn(
        CommandSpec::new("sleep").with_args(["100"]),
        2,
        fast_timings(),
    )
    .await;

    // Nothing tracked.
    let resp = server.cancel(json!({})).await;
    assert_eq!(resp.status(), 400);
    let resp = server.cancel(json!({"execID": "no-such-id"})).await;
    assert_eq!(resp.status(), 400);
    let body: ErrorResponse = resp.json().await?;
    assert_eq!(body.error, "invalid execID: no-such-id");

    // Two tracked: an id is required.
    let mut a = NdjsonStream::new(server.execute(json!({})).await);
    let mut b = NdjsonStream::new(server.execute(json!({})).await);
    let a_id = with_timeout(a.next_event()).await.expect("started").exec_id;
    let b_id = with_timeout(b.next_event()).await.expect("started").exec_id;

    let resp = server.cancel(json!({})).await;
    assert_eq!(resp.status(), 400);

    for id in [&a_id, &b_id] {
        let resp = server.cancel(json!({"execID": id})).await;
        assert_eq!(resp.status(), 200);
    }
    assert_terminal(
        &with_timeout(a.collect_rest()).await,
        OutputType::System,
        OutputStatus::Cancelled,
    );
    assert_terminal(
        &with_timeout(b.collect_rest()).await,
        OutputType::System,
        OutputStatus::Cancelled,
    );
    Ok(())
}

#[tokio::test]
async fn process_stays_cancellable_after_client_disconnects() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("sleep", &["100"]).await;

    let mut stream = NdjsonStream::new(server.execute(json!({})).await);
    with_timeout(stream.next_event()).await.expect("started event");
    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(server.state().registry.len(), 1);
    let resp = with_timeout(server.cancel(json!({}))).await;
    assert_eq!(resp.status(), 200);

    with_timeout(server.wait_idle()).await;
    assert_eq!(server.state().free_slots(), 1);
    Ok(())
}

#[tokio::test]
async fn chatty_process_is_reaped_after_client_stops_reading() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("sh", &["-c"]).await;

    let mut stream = NdjsonStream::new(server.execute(json!({"args": ["seq 1 300000"]})).await);
    with_timeout(stream.next_event()).await.expect("started event");

    // Let every buffer between the process and the client fill up.
    tokio::time::sleep(Duration::from_millis(500)).await;
    drop(stream);

    with_timeout_secs(20, server.wait_idle()).await;
    assert!(server.state().registry.is_empty());
    assert_eq!(server.state().free_slots(), 1);

    // The slot is usable again.
    let events = with_timeout(server.execute_all(json!({"args": ["echo again"]}))).await;
    assert_eq!(messages_of(&events, OutputType::Stdout), ["again"]);
    Ok(())
}

#[tokio::test]
async fn endless_output_stays_cancellable_after_disconnect() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("yes", &[]).await;

    let mut stream = NdjsonStream::new(server.execute(json!({})).await);
    with_timeout(stream.next_event()).await.expect("started event");
    tokio::time::sleep(Duration::from_millis(300)).await;
    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let resp = with_timeout(server.cancel(json!({}))).await;
    assert_eq!(resp.status(), 200);

    with_timeout(server.wait_idle()).await;
    assert_eq!(server.state().free_slots(), 1);
    Ok(())
}

#[tokio::test]
async fn parallelism_one_serializes_executions() -> TestResult {
    init_tracing();
    let server = std::sync::Arc::new(TestServer::spawn_cmd("sleep", &[]).await);

    let mut first = NdjsonStream::new(server.execute(json!({"args": ["100"]})).await);
    with_timeout(first.next_event()).await.expect("started event");
    assert_eq!(server.state().free_slots(), 0);

    let second = {
        let server = std::sync::Arc::clone(&server);
        tokio::spawn(async move { server.execute_all(json!({"args": ["0"]})).await })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!second.is_finished());
    assert_eq!(server.state().registry.len(), 1);

    let resp = server.cancel(json!({})).await;
    assert_eq!(resp.status(), 200);
    with_timeout(first.collect_rest()).await;

    let events = with_timeout_secs(5, second).await?;
    assert_terminal(&events, OutputType::Exit, OutputStatus::Success);
    Ok(())
}

#[tokio::test]
async fn graceful_shutdown_when_idle() -> TestResult {
    let server = TestServer::spawn_cmd("echo", &[]).await;
    with_timeout(server.execute_all(json!({"args": ["x"]}))).await;
    with_timeout(server.shutdown()).await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_lets_a_short_execution_finish() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("sh", &["-c", "sleep 0.3; echo done"]).await;

    let mut stream = NdjsonStream::new(server.execute(json!({})).await);
    with_timeout(stream.next_event()).await.expect("started event");

    let shutdown = tokio::spawn(server.shutdown());
    let rest = with_timeout(stream.collect_rest()).await;
    assert_eq!(messages_of(&rest, OutputType::Stdout), ["done"]);
    assert_terminal(&rest, OutputType::Exit, OutputStatus::Success);

    with_timeout(shutdown).await??;
    Ok(())
}

#[tokio::test]
async fn shutdown_gives_up_on_a_long_execution_after_the_timeout() -> TestResult {
    init_tracing();
    let server = TestServer::spawn_cmd("sleep", &["100"]).await;
    let state = server.state().clone();

    let mut stream = NdjsonStream::new(server.execute(json!({})).await);
    with_timeout(stream.next_event()).await.expect("started event");

    let started = std::time::Instant::now();
    with_timeout(server.shutdown()).await?;
    assert!(started.elapsed() >= TestServer::SHUTDOWN_TIMEOUT - Duration::from_millis(100));

    // Shutdown does not touch the subprocess; it is still tracked and
    // cancellable.
    assert_eq!(state.registry.len(), 1);
    with_timeout(state.registry.delete_executor(None)).await?;
    drop(stream);
    Ok(())
}
