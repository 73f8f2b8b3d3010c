// src/types.rs

//! Wire types shared by the executor and the HTTP layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Origin of an [`Output`] event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    /// A line from the subprocess stdout.
    Stdout,
    /// A line from the subprocess stderr.
    Stderr,
    /// Exit status of the subprocess.
    Exit,
    /// Messages from the daemon itself: the execution id, run errors,
    /// cancellation.
    System,
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputType::Stdout => "stdout",
            OutputType::Stderr => "stderr",
            OutputType::Exit => "exit",
            OutputType::System => "system",
        };
        f.write_str(s)
    }
}

/// Status carried by terminal events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Success,
    Error,
    Cancelled,
    Killed,
}

/// A single event in the NDJSON response stream.
///
/// ```json
/// {"msg":"hello","type":"stdout","execID":"4f0c..."}
/// {"msg":"","type":"exit","status":"success","execID":"4f0c..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub msg: String,

    #[serde(rename = "type")]
    pub output_type: OutputType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<OutputStatus>,

    #[serde(rename = "execID")]
    pub exec_id: String,
}

impl Output {
    /// A plain stream line (no status).
    pub fn line(output_type: OutputType, msg: impl Into<String>, exec_id: &str) -> Self {
        Self {
            msg: msg.into(),
            output_type,
            status: None,
            exec_id: exec_id.to_string(),
        }
    }

    /// The first event of every execution; tells the client which id to
    /// pass to `/cancel`.
    pub fn started(exec_id: &str) -> Self {
        Self::line(OutputType::System, "", exec_id)
    }

    /// Run-loop failure reported inside an already committed stream.
    pub fn system_error(msg: impl Into<String>, exec_id: &str) -> Self {
        Self {
            msg: msg.into(),
            output_type: OutputType::System,
            status: Some(OutputStatus::Error),
            exec_id: exec_id.to_string(),
        }
    }

    pub fn with_status(mut self, status: OutputStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether this event ends an execution's stream.
    pub fn is_terminal(&self) -> bool {
        match self.output_type {
            OutputType::Exit => true,
            OutputType::System => matches!(
                self.status,
                Some(OutputStatus::Cancelled) | Some(OutputStatus::Killed)
            ),
            OutputType::Stdout | OutputType::Stderr => false,
        }
    }
}
