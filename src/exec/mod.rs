// src/exec/mod.rs

//! Process execution layer.
//!
//! This module is responsible for actually running the daemon's command,
//! using `tokio::process::Command`, and relaying its output to a client.
//!
//! - [`command`] builds the command line and environment for an execution.
//! - [`executor`] owns a single subprocess: execute, run loop, wait, cancel.
//! - [`escalation`] is the pure SIGTERM → SIGKILL state machine driving
//!   [`CmdExecutor::cancel`].
//! - [`signal`] delivers signals to process groups.
//! - [`output`] scans stdout/stderr into [`Output`](crate::types::Output)
//!   events.
//! - [`encoder`] provides the [`OutputEncoder`] trait the run loop writes to,
//!   with the chunked HTTP implementation used in production.
//! - [`exit`] turns an exit status into the final stream event.
//! - [`registry`] tracks executions by id for the cancel endpoint.

pub mod command;
pub mod encoder;
pub mod escalation;
pub mod executor;
pub mod exit;
pub mod output;
pub mod registry;
pub mod signal;

pub use command::CommandSpec;
pub use encoder::{ChunkedEncoder, DiscardEncoder, OutputEncoder};
pub use escalation::{CancelPhase, CancelStep, CancelTimings, Escalation};
pub use executor::{CmdExecutor, ProcessPipes};
pub use exit::ExitOutcome;
pub use output::{OutputChannels, OutputSenders, output_channels, spawn_scanners, write_output};
pub use registry::ExecutorRegistry;
pub use signal::Signal;
