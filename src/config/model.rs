// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::exec::CancelTimings;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [server]
/// host = "127.0.0.1"
/// port = 6000
/// parallelism = 2
/// shutdown_timeout = "10s"
///
/// [cancel]
/// poll_interval = "250ms"
/// sigterm_grace = "10s"
/// sigkill_wait = "10s"
/// ```
///
/// Every field is optional; CLI flags are layered on top with
/// [`RawConfigFile::with_overrides`] and defaults fill the rest during
/// validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub cancel: CancelSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Interface to bind. Defaults to all interfaces.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Maximum number of executions running at once.
    #[serde(default)]
    pub parallelism: Option<usize>,

    /// Duration string (e.g. `"10s"`) in-flight requests get on shutdown.
    #[serde(default)]
    pub shutdown_timeout: Option<String>,
}

/// `[cancel]` section: durations of the SIGTERM → SIGKILL escalation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CancelSection {
    #[serde(default)]
    pub poll_interval: Option<String>,

    #[serde(default)]
    pub sigterm_grace: Option<String>,

    #[serde(default)]
    pub sigkill_wait: Option<String>,
}

/// CLI values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub parallelism: Option<usize>,
}

impl RawConfigFile {
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if overrides.host.is_some() {
            self.server.host = overrides.host;
        }
        if overrides.port.is_some() {
            self.server.port = overrides.port;
        }
        if overrides.parallelism.is_some() {
            self.server.parallelism = overrides.parallelism;
        }
        self
    }
}

/// Validated configuration used by the server.
///
/// Constructed via `TryFrom<RawConfigFile>`; see `config::validate`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub host: String,
    pub port: u16,
    pub parallelism: usize,
    pub shutdown_timeout: Duration,
    pub cancel: CancelTimings,
}

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 6000;
pub const DEFAULT_PARALLELISM: usize = 1;

impl ConfigFile {
    /// `host:port` as passed to the listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
