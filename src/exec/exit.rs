// src/exec/exit.rs

//! Classification of a finished process into the final stream event.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use crate::errors::ExecError;
use crate::exec::signal::Signal;
use crate::types::{Output, OutputStatus, OutputType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    /// Terminated by SIGTERM, i.e. a cancel request.
    Cancelled,
    /// Terminated by SIGKILL after the grace period.
    Killed,
    /// Non-zero exit, another signal, or a failure to wait.
    Failed(String),
}

impl ExitOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            return ExitOutcome::Success;
        }
        if let Some(code) = status.code() {
            return ExitOutcome::Failed(format!("exit status {code}"));
        }
        match status.signal() {
            Some(raw) => match Signal::from_raw(raw) {
                Some(Signal::Term) => ExitOutcome::Cancelled,
                Some(Signal::Kill) => ExitOutcome::Killed,
                None => ExitOutcome::Failed(format!("signal: {raw}")),
            },
            None => ExitOutcome::Failed(status.to_string()),
        }
    }

    pub fn from_wait(result: Result<ExitStatus, ExecError>) -> Self {
        match result {
            Ok(status) => Self::from_status(status),
            Err(err) => ExitOutcome::Failed(err.to_string()),
        }
    }

    /// The last event written for an execution.
    ///
    /// Natural exits are `exit` events; cancellations are `system` events.
    pub fn into_output(self, exec_id: &str) -> Output {
        let (output_type, status, msg) = match self {
            ExitOutcome::Success => (OutputType::Exit, OutputStatus::Success, String::new()),
            ExitOutcome::Cancelled => (OutputType::System, OutputStatus::Cancelled, String::new()),
            ExitOutcome::Killed => (OutputType::System, OutputStatus::Killed, String::new()),
            ExitOutcome::Failed(msg) => (OutputType::Exit, OutputStatus::Error, msg),
        };
        Output::line(output_type, msg, exec_id).with_status(status)
    }
}
