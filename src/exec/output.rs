// src/exec/output.rs

//! Output pipeline: turns a subprocess's stdout/stderr into [`Output`] events.
//!
//! Three channels connect the scanners to the run loop:
//! - `output`: one event per line, bounded but large so bursty output does
//!   not stall the process on back-pressure.
//! - `done`: one token per stream that reached EOF cleanly.
//! - `err`: read failures, plus errors injected from outside the pipeline
//!   (client disconnect).

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::errors::RunError;
use crate::types::{Output, OutputType};

/// Capacity of the shared output channel.
pub const OUTPUT_BUFFER: usize = 4096;

/// Number of scanned streams (stdout + stderr). The run loop finishes once
/// it has seen this many completion tokens.
pub const STREAM_COUNT: usize = 2;

/// Producer side of the pipeline. Cheap to clone; one clone per scanner.
#[derive(Debug, Clone)]
pub struct OutputSenders {
    output_tx: mpsc::Sender<Output>,
    done_tx: mpsc::Sender<()>,
    err_tx: mpsc::Sender<RunError>,
}

/// Consumer side of the pipeline, owned by the handler and lent to
/// [`CmdExecutor::run`](crate::exec::CmdExecutor::run).
#[derive(Debug)]
pub struct OutputChannels {
    pub(crate) output_rx: mpsc::Receiver<Output>,
    pub(crate) done_rx: mpsc::Receiver<()>,
    pub(crate) err_rx: mpsc::Receiver<RunError>,
    pub(crate) done_count: usize,
}

impl OutputChannels {
    /// Completion tokens received so far. Persists across `run` calls.
    pub fn done_count(&self) -> usize {
        self.done_count
    }
}

/// Create a connected sender/receiver pair.
pub fn output_channels() -> (OutputSenders, OutputChannels) {
    let (output_tx, output_rx) = mpsc::channel(OUTPUT_BUFFER);
    let (done_tx, done_rx) = mpsc::channel(STREAM_COUNT);
    // Room for both scanners plus one injected error, so nobody ever blocks
    // reporting a failure after the run loop has returned.
    let (err_tx, err_rx) = mpsc::channel(STREAM_COUNT + 1);

    (
        OutputSenders {
            output_tx,
            done_tx,
            err_tx,
        },
        OutputChannels {
            output_rx,
            done_rx,
            err_rx,
            done_count: 0,
        },
    )
}

impl OutputSenders {
    /// Queue an event. Returns `false` once the run loop side is gone.
    pub async fn send_output(&self, output: Output) -> bool {
        self.output_tx.send(output).await.is_ok()
    }

    /// Signal that one stream reached EOF.
    pub async fn send_done(&self) -> bool {
        self.done_tx.send(()).await.is_ok()
    }

    /// Abort the run loop with `err`.
    pub async fn send_error(&self, err: RunError) -> bool {
        self.err_tx.send(err).await.is_ok()
    }

    /// Resolves once the consumer side has been dropped.
    pub async fn closed(&self) {
        self.err_tx.closed().await
    }
}

/// Scan `reader` line by line into `senders`.
///
/// Lines are split on `\n` with a trailing `\r` removed; invalid UTF-8 is
/// replaced rather than treated as an error.
/// - clean EOF: one completion token
/// - read error: the error goes to the error channel and no token is sent
pub async fn write_output<R>(
    reader: R,
    output_type: OutputType,
    exec_id: String,
    senders: OutputSenders,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = trim_line_ending(&buf);
                let msg = String::from_utf8_lossy(line).into_owned();
                trace!(exec_id = %exec_id, stream = %output_type, "{}", msg);
                if !senders
                    .send_output(Output::line(output_type, msg, &exec_id))
                    .await
                {
                    debug!(exec_id = %exec_id, stream = %output_type, "output receiver gone; stopping scanner");
                    return;
                }
            }
            Err(err) => {
                debug!(exec_id = %exec_id, stream = %output_type, error = %err, "error reading process output");
                senders.send_error(RunError::Output(err)).await;
                return;
            }
        }
    }

    senders.send_done().await;
}

fn trim_line_ending(buf: &[u8]) -> &[u8] {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Spawn one scanner per pipe.
pub fn spawn_scanners(
    stdout: ChildStdout,
    stderr: ChildStderr,
    exec_id: &str,
    senders: &OutputSenders,
) -> [JoinHandle<()>; STREAM_COUNT] {
    [
        tokio::spawn(write_output(
            stdout,
            OutputType::Stdout,
            exec_id.to_string(),
            senders.clone(),
        )),
        tokio::spawn(write_output(
            stderr,
            OutputType::Stderr,
            exec_id.to_string(),
            senders.clone(),
        )),
    ]
}
