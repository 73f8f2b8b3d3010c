// src/exec/command.rs

//! Building the subprocess command line for an execution.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;

/// Program, arguments and extra environment for one execution.
///
/// The daemon's base command and base args come from the CLI; the request
/// appends its own args and env on top via [`CommandSpec::with_args`] and
/// [`CommandSpec::with_env_values`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Append request environment values as `KEY=VALUE` pairs.
    pub fn with_env_values(mut self, env: &BTreeMap<String, Value>) -> Self {
        for (key, value) in env {
            self.env.push((key.clone(), env_value_to_string(value)));
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// Tokio command with piped stdout/stderr, running in its own process
    /// group so signals reach every descendant.
    ///
    /// The inherited environment is kept; `env` entries are layered on top.
    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Strings go through verbatim; everything else uses its JSON text.
fn env_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
