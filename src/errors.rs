// src/errors.rs

//! Crate-wide error types.
//!
//! - [`ExecdError`] covers startup concerns (config, IO, binding).
//! - [`ExecError`] is returned by executor and registry operations and maps
//!   onto HTTP status codes in [`crate::httpd::ApiError`].
//! - [`RunError`] ends a single execution's run loop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecdError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ExecdError>;

/// Errors raised while starting, waiting on, or cancelling executions.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("unable to run: {requested}, already running: {existing}")]
    AlreadyRunning { existing: String, requested: String },

    #[error("no existing command")]
    NoActiveProcess,

    #[error("cmd {cmd}: err {source}")]
    StartCmd {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to capture {0} of child process")]
    Pipe(&'static str),

    #[error("invalid execID: {0}")]
    InvalidExecId(String),

    #[error("no executions to cancel")]
    NoExecutionToCancel,

    #[error("multiple executions found, must specify execution id to cancel")]
    AmbiguousCancel,

    #[error("unable to determine if process has been cancelled: {0}")]
    CancelTimeout(String),

    #[error("waiting on process: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the encoder writing events into the response body.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("serializing output: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("response stream closed")]
    Closed,
}

/// Reasons the run loop stopped before both output streams completed.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("running inactive command")]
    Inactive,

    #[error("unable to signal, command already exited")]
    AlreadyExited,

    #[error("unable to signal: {exec_id}: {source}")]
    Signal {
        exec_id: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("reading process output: {0}")]
    Output(#[from] std::io::Error),

    #[error("client disconnected")]
    Disconnected,

    #[error("output streams closed before completion")]
    StreamsClosed,
}
