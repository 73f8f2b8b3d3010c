// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{
    CancelSection, ConfigFile, DEFAULT_HOST, DEFAULT_PARALLELISM, DEFAULT_PORT, RawConfigFile,
};
use crate::errors::{ExecdError, Result};
use crate::exec::CancelTimings;
use crate::httpd::server::DEFAULT_SHUTDOWN_TIMEOUT;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = ExecdError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let parallelism = raw.server.parallelism.unwrap_or(DEFAULT_PARALLELISM);
        if parallelism == 0 {
            return Err(ExecdError::ConfigError(
                "[server].parallelism must be >= 1 (got 0)".to_string(),
            ));
        }

        let shutdown_timeout = duration_field(
            "server.shutdown_timeout",
            raw.server.shutdown_timeout.as_deref(),
            DEFAULT_SHUTDOWN_TIMEOUT,
        )?;

        let cancel = cancel_timings(&raw.cancel)?;

        let host = raw
            .server
            .host
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        Ok(ConfigFile {
            host,
            port: raw.server.port.unwrap_or(DEFAULT_PORT),
            parallelism,
            shutdown_timeout,
            cancel,
        })
    }
}

fn cancel_timings(section: &CancelSection) -> Result<CancelTimings> {
    let timings = CancelTimings {
        poll_interval: duration_field(
            "cancel.poll_interval",
            section.poll_interval.as_deref(),
            CancelTimings::DEFAULT_POLL_INTERVAL,
        )?,
        sigterm_grace: duration_field(
            "cancel.sigterm_grace",
            section.sigterm_grace.as_deref(),
            CancelTimings::DEFAULT_SIGTERM_GRACE,
        )?,
        sigkill_wait: duration_field(
            "cancel.sigkill_wait",
            section.sigkill_wait.as_deref(),
            CancelTimings::DEFAULT_SIGKILL_WAIT,
        )?,
    };

    if timings.poll_interval > timings.sigterm_grace {
        return Err(ExecdError::ConfigError(format!(
            "[cancel].poll_interval ({:?}) must not exceed [cancel].sigterm_grace ({:?})",
            timings.poll_interval, timings.sigterm_grace
        )));
    }

    Ok(timings)
}

/// Upper bound for every configured duration.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

fn duration_field(name: &str, value: Option<&str>, default: Duration) -> Result<Duration> {
    let Some(value) = value else {
        return Ok(default);
    };
    let parsed = parse_duration(value)
        .map_err(|e| ExecdError::ConfigError(format!("invalid {name} '{value}': {e}")))?;
    if parsed.is_zero() {
        return Err(ExecdError::ConfigError(format!("{name} must be greater than zero")));
    }
    if parsed > MAX_DURATION {
        return Err(ExecdError::ConfigError(format!(
            "{name} must be at most {:?} (got {:?})",
            MAX_DURATION, parsed
        )));
    }
    Ok(parsed)
}
