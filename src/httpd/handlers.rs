// src/httpd/handlers.rs

//! `execute` and `cancel` endpoints.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::process::ExitStatus;
use std::sync::Arc;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, mpsc};
use tracing::{debug, error, info, warn};

use crate::errors::{EncodeError, ExecError, RunError};
use crate::exec::{
    ChunkedEncoder, CmdExecutor, DiscardEncoder, ExecutorRegistry, ExitOutcome, OutputChannels,
    OutputEncoder, OutputSenders, ProcessPipes, output_channels, spawn_scanners,
};
use crate::types::Output;

use super::error::ApiError;
use super::state::AppState;

/// Chunks buffered between the run loop and the HTTP body.
const BODY_BUFFER: usize = 64;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteCmdRequest {
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelCmdRequest {
    #[serde(rename = "execID", default)]
    pub exec_id: Option<String>,
}

fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(ApiError::invalid_body)
}

/// Run the base command plus the request's args and env, streaming its
/// output back as newline-delimited JSON.
///
/// Failures before the process starts are returned as JSON error bodies.
/// Once the 200 is sent, failures become events in the stream, which
/// always ends with the exit status.
pub async fn execute(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let req: ExecuteCmdRequest = decode_body(&body)?;

    // Blocks while every slot is taken.
    let permit = Arc::clone(&state.slots)
        .acquire_owned()
        .await
        .map_err(|_| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down"))?;

    let executor = state.registry.create_executor();
    let spec = state
        .base
        .as_ref()
        .clone()
        .with_args(req.args)
        .with_env_values(&req.env);

    let pipes = match executor.execute(&spec) {
        Ok(pipes) => pipes,
        Err(err) => {
            error!(exec_id = %executor.exec_id(), error = %err, "unable to start process");
            release_executor(&state.registry, executor.exec_id()).await;
            return Err(err.into());
        }
    };

    let (body_tx, body_rx) = mpsc::channel::<Bytes>(BODY_BUFFER);
    let encoder = ChunkedEncoder::new(body_tx);

    tokio::spawn(stream_execution(
        Arc::clone(&state.registry),
        executor,
        pipes,
        encoder,
        permit,
    ));

    let stream = futures::stream::unfold(body_rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|chunk| (Ok::<_, Infallible>(chunk), rx))
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Drive one execution from first to last event, then release its registry
/// entry and concurrency slot.
async fn stream_execution(
    registry: Arc<ExecutorRegistry>,
    executor: Arc<CmdExecutor>,
    pipes: ProcessPipes,
    mut encoder: ChunkedEncoder,
    permit: OwnedSemaphorePermit,
) {
    let exec_id = executor.exec_id().to_string();
    let (senders, mut channels) = output_channels();

    // The execution id always goes out first.
    senders.send_output(Output::started(&exec_id)).await;
    spawn_scanners(pipes.stdout, pipes.stderr, &exec_id, &senders);
    spawn_disconnect_watcher(encoder.clone(), senders);

    let (status, detached) = match executor.run(&mut channels, &mut encoder).await {
        Ok(()) => (executor.wait().await, false),
        Err(RunError::Disconnected) | Err(RunError::Encode(EncodeError::Closed)) => {
            // Nothing more can be written. The process keeps running and
            // stays cancellable until it exits on its own.
            info!(exec_id = %exec_id, "client disconnected; detaching from process output");
            (drain_until_exit(&executor, &mut channels).await, true)
        }
        Err(err) => {
            warn!(exec_id = %exec_id, error = %err, "run loop failed");
            write_best_effort(&mut encoder, &Output::system_error(err.to_string(), &exec_id)).await;
            (drain_until_exit(&executor, &mut channels).await, false)
        }
    };

    let outcome = ExitOutcome::from_wait(status);
    if detached {
        info!(exec_id = %exec_id, ?outcome, "detached process exited");
    } else {
        info!(exec_id = %exec_id, ?outcome, "execution finished");
        write_best_effort(&mut encoder, &outcome.into_output(&exec_id)).await;
    }

    // Closing the channels stops the watcher, which ends the response body.
    drop(channels);
    drop(encoder);
    finish(&registry, &exec_id, permit).await;
}

/// Wait for the process while discarding its output.
///
/// The scanners must keep moving or a chatty process blocks on its pipes and
/// never exits; queued signals from `/cancel` are only delivered while a run
/// loop is active.
async fn drain_until_exit(
    executor: &CmdExecutor,
    channels: &mut OutputChannels,
) -> Result<ExitStatus, ExecError> {
    let wait = executor.wait();
    tokio::pin!(wait);
    let mut discard = DiscardEncoder;
    let mut draining = true;

    loop {
        tokio::select! {
            status = &mut wait => return status,
            res = executor.run(channels, &mut discard), if draining => match res {
                Ok(()) | Err(RunError::StreamsClosed) | Err(RunError::Inactive) => draining = false,
                // The disconnect watcher may fire after a failed write already
                // detached the stream.
                Err(RunError::Disconnected) | Err(RunError::Encode(_)) => {}
                Err(err) => {
                    warn!(exec_id = %executor.exec_id(), error = %err, "error draining process output");
                }
            },
        }
    }
}

/// Turn a dropped response body into a [`RunError::Disconnected`].
fn spawn_disconnect_watcher(encoder: ChunkedEncoder, senders: OutputSenders) {
    tokio::spawn(async move {
        tokio::select! {
            _ = encoder.closed() => {
                debug!("response body dropped");
                senders.send_error(RunError::Disconnected).await;
            }
            _ = senders.closed() => {}
        }
    });
}

async fn write_best_effort(encoder: &mut ChunkedEncoder, output: &Output) {
    if let Err(err) = encoder.encode(output).await {
        warn!(exec_id = %output.exec_id, error = %err, "unable to write event");
    }
}

async fn finish(registry: &ExecutorRegistry, exec_id: &str, permit: OwnedSemaphorePermit) {
    release_executor(registry, exec_id).await;
    drop(permit);
    debug!(exec_id = %exec_id, "slot released");
}

/// Remove an execution that ended. A concurrent `/cancel` may already have
/// removed it, which is fine.
async fn release_executor(registry: &ExecutorRegistry, exec_id: &str) {
    match registry.delete_executor(Some(exec_id)).await {
        Ok(()) | Err(ExecError::InvalidExecId(_)) => {}
        Err(err) => error!(exec_id = %exec_id, error = %err, "unable to delete executor"),
    }
}

/// Cancel an execution by id, or the only running one when no id is given.
pub async fn cancel(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let req: CancelCmdRequest = decode_body(&body)?;
    state.registry.delete_executor(req.exec_id.as_deref()).await?;
    Ok(Json(serde_json::json!({})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_request_fields_are_optional() {
        let req: ExecuteCmdRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req, ExecuteCmdRequest::default());

        let req: ExecuteCmdRequest =
            serde_json::from_str(r#"{"args":["100"],"env":{"A":"b","N":1}}"#).unwrap();
        assert_eq!(req.args, ["100"]);
        assert_eq!(req.env.len(), 2);
    }

    #[test]
    fn cancel_request_accepts_null_and_missing_id() {
        let req: CancelCmdRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(req.exec_id, None);
        let req: CancelCmdRequest = serde_json::from_str(r#"{"execID":null}"#).unwrap();
        assert_eq!(req.exec_id, None);
        let req: CancelCmdRequest = serde_json::from_str(r#"{"execID":"abc"}"#).unwrap();
        assert_eq!(req.exec_id.as_deref(), Some("abc"));
    }

    #[test]
    fn malformed_bodies_are_bad_requests() {
        let err = decode_body::<CancelCmdRequest>(&Bytes::from_static(b"not json")).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.message().starts_with("invalid body"));
    }
}
