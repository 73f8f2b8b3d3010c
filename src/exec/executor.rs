// src/exec/executor.rs

//! Lifecycle of a single subprocess: execute, run, wait, cancel.

use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::errors::{ExecError, RunError};
use crate::exec::command::CommandSpec;
use crate::exec::encoder::OutputEncoder;
use crate::exec::escalation::{CancelPhase, CancelStep, CancelTimings, Escalation};
use crate::exec::output::{OutputChannels, STREAM_COUNT};
use crate::exec::signal::{self, Signal};

/// Pipes of a freshly started process, handed to the output scanners.
#[derive(Debug)]
pub struct ProcessPipes {
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// The process currently owned by an executor.
///
/// `child` sits behind its own async mutex so `wait` can block on it without
/// holding the executor's slot lock.
#[derive(Debug)]
struct ActiveCmd {
    pid: u32,
    cmd: String,
    child: Arc<tokio::sync::Mutex<Child>>,
}

/// Owns at most one running subprocess and the signal queue used to stop it.
#[derive(Debug)]
pub struct CmdExecutor {
    exec_id: String,
    active: Mutex<Option<ActiveCmd>>,
    signal_tx: mpsc::Sender<Signal>,
    signal_rx: tokio::sync::Mutex<mpsc::Receiver<Signal>>,
    timings: CancelTimings,
}

impl CmdExecutor {
    pub fn new(exec_id: impl Into<String>, timings: CancelTimings) -> Self {
        // A single pending signal at most; see `queue_signal`.
        let (signal_tx, signal_rx) = mpsc::channel(1);
        Self {
            exec_id: exec_id.into(),
            active: Mutex::new(None),
            signal_tx,
            signal_rx: tokio::sync::Mutex::new(signal_rx),
            timings,
        }
    }

    pub fn exec_id(&self) -> &str {
        &self.exec_id
    }

    pub fn timings(&self) -> CancelTimings {
        self.timings
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveCmd>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_active_process(&self) -> bool {
        self.lock_active().is_some()
    }

    pub fn active_pid(&self) -> Option<u32> {
        self.lock_active().as_ref().map(|a| a.pid)
    }

    /// Start `spec` as this executor's process and return its output pipes.
    ///
    /// Fails with [`ExecError::AlreadyRunning`] while a previous process has
    /// not been waited on; that process is left untouched.
    pub fn execute(&self, spec: &CommandSpec) -> Result<ProcessPipes, ExecError> {
        let mut active = self.lock_active();
        if let Some(existing) = active.as_ref() {
            return Err(ExecError::AlreadyRunning {
                existing: existing.cmd.clone(),
                requested: spec.to_string(),
            });
        }

        info!(exec_id = %self.exec_id, cmd = %spec, "starting process");

        let mut child = spec
            .to_command()
            .spawn()
            .map_err(|source| ExecError::StartCmd {
                cmd: spec.to_string(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or(ExecError::Pipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ExecError::Pipe("stderr"))?;
        let pid = child.id().ok_or(ExecError::NoActiveProcess)?;

        debug!(exec_id = %self.exec_id, pid, "process started");

        *active = Some(ActiveCmd {
            pid,
            cmd: spec.to_string(),
            child: Arc::new(tokio::sync::Mutex::new(child)),
        });

        Ok(ProcessPipes { stdout, stderr })
    }

    /// Relay output into `encoder` until both streams complete.
    ///
    /// Multiplexes four sources:
    /// - queued signals, delivered to the process group
    /// - output events, encoded and flushed one by one
    /// - completion tokens; once every stream is done, buffered output is
    ///   drained and the loop returns `Ok`
    /// - errors, which end the loop immediately
    ///
    /// `channels` is borrowed so a caller can resume after an error such as
    /// [`RunError::Disconnected`] (with a different encoder).
    pub async fn run<E>(
        &self,
        channels: &mut OutputChannels,
        encoder: &mut E,
    ) -> Result<(), RunError>
    where
        E: OutputEncoder + ?Sized,
    {
        if !self.has_active_process() {
            return Err(RunError::Inactive);
        }

        let mut signal_rx = self.signal_rx.lock().await;

        if channels.done_count >= STREAM_COUNT {
            return drain(channels, encoder).await;
        }

        loop {
            tokio::select! {
                Some(signal) = signal_rx.recv() => {
                    self.deliver(signal)?;
                }
                Some(output) = channels.output_rx.recv() => {
                    encoder.encode(&output).await?;
                }
                Some(()) = channels.done_rx.recv() => {
                    channels.done_count += 1;
                    if channels.done_count >= STREAM_COUNT {
                        return drain(channels, encoder).await;
                    }
                }
                Some(err) = channels.err_rx.recv() => {
                    debug!(exec_id = %self.exec_id, error = %err, "run loop received error");
                    return Err(err);
                }
                else => return Err(RunError::StreamsClosed),
            }
        }
    }

    fn deliver(&self, signal: Signal) -> Result<(), RunError> {
        let pid = self.active_pid().ok_or(RunError::AlreadyExited)?;
        info!(exec_id = %self.exec_id, pid, %signal, "delivering signal to process group");
        signal::deliver(pid, signal).map_err(|source| RunError::Signal {
            exec_id: self.exec_id.clone(),
            source,
        })
    }

    /// Wait for the process to exit and release the slot.
    ///
    /// The slot is cleared even if waiting fails, so the executor can be
    /// reused or deleted afterwards.
    pub async fn wait(&self) -> Result<ExitStatus, ExecError> {
        let child = {
            let active = self.lock_active();
            let active = active.as_ref().ok_or(ExecError::NoActiveProcess)?;
            Arc::clone(&active.child)
        };

        let result = child.lock().await.wait().await;
        self.lock_active().take();

        let status = result?;
        debug!(exec_id = %self.exec_id, %status, "process exited");
        Ok(status)
    }

    /// Stop the process: SIGTERM, then SIGKILL after the grace period.
    ///
    /// Returns `Ok` once the process has been waited on, or immediately if
    /// nothing is running. Returns [`ExecError::CancelTimeout`] if the
    /// process is still active when the kill deadline passes.
    pub async fn cancel(&self) -> Result<(), ExecError> {
        let mut escalation = Escalation::new(self.timings);
        match escalation.start(self.has_active_process()) {
            CancelStep::Finished(_) => return Ok(()),
            CancelStep::Deliver(signal) => self.queue_signal(signal),
            CancelStep::Wait => {}
        }

        info!(exec_id = %self.exec_id, "cancelling process");

        let poll = self.timings.poll_interval;
        let started = Instant::now();
        let first_tick = started.checked_add(poll).unwrap_or(started);
        let mut ticker = tokio::time::interval_at(first_tick, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match escalation.observe(started.elapsed(), self.has_active_process()) {
                CancelStep::Wait => {}
                CancelStep::Deliver(signal) => {
                    warn!(
                        exec_id = %self.exec_id,
                        grace = ?self.timings.sigterm_grace,
                        "process still running after grace period; escalating"
                    );
                    self.queue_signal(signal);
                }
                CancelStep::Finished(CancelPhase::ConfirmedDead) => {
                    info!(exec_id = %self.exec_id, "process cancelled");
                    return Ok(());
                }
                CancelStep::Finished(phase) => {
                    warn!(exec_id = %self.exec_id, ?phase, "unable to confirm cancellation");
                    return Err(ExecError::CancelTimeout(self.exec_id.clone()));
                }
            }
        }
    }

    /// Queue `signal` for the run loop without blocking.
    ///
    /// If a signal is already pending the new one is dropped; the cancel
    /// escalation keeps running on its own deadlines either way.
    fn queue_signal(&self, signal: Signal) {
        match self.signal_tx.try_send(signal) {
            Ok(()) => debug!(exec_id = %self.exec_id, %signal, "signal queued"),
            Err(TrySendError::Full(_)) => {
                warn!(exec_id = %self.exec_id, %signal, "already processing signal, discarding");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(exec_id = %self.exec_id, %signal, "signal queue closed, discarding");
            }
        }
    }
}

async fn drain<E>(channels: &mut OutputChannels, encoder: &mut E) -> Result<(), RunError>
where
    E: OutputEncoder + ?Sized,
{
    while let Ok(output) = channels.output_rx.try_recv() {
        encoder.encode(&output).await?;
    }
    Ok(())
}
