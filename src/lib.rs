// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod httpd;
pub mod logging;
pub mod types;

use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::cli::{CliArgs, Command, ServeArgs};
use crate::config::{ConfigFile, Overrides, default_config_path, load_and_validate};
use crate::exec::CommandSpec;
use crate::httpd::AppState;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Serve(serve) => run_serve(serve).await,
    }
}

/// This wires together:
/// - config loading (file + CLI overrides)
/// - executor registry and concurrency slots
/// - HTTP router and listener
/// - Ctrl-C / SIGTERM handling
async fn run_serve(args: ServeArgs) -> Result<()> {
    let config_path = resolve_config_path(args.config.clone());
    let cfg = load_and_validate(
        config_path.as_deref(),
        Overrides {
            host: args.host.clone(),
            port: args.port,
            parallelism: args.parallelism,
        },
    )?;

    let base = CommandSpec::new(args.cmd).with_args(args.args);
    let listener = TcpListener::bind(cfg.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", cfg.bind_addr()))?;

    log_startup(&cfg, &base, &listener);

    let state = AppState::new(base, cfg.parallelism, cfg.cancel);
    httpd::serve_with_graceful_shutdown(
        listener,
        httpd::route(state),
        cfg.shutdown_timeout,
        httpd::shutdown_signal(),
    )
    .await
}

/// An explicit `--config` must exist; the default file is optional.
fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = default_config_path();
        default.is_file().then_some(default)
    })
}

fn log_startup(cfg: &ConfigFile, base: &CommandSpec, listener: &TcpListener) {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| cfg.bind_addr());
    info!(
        %addr,
        cmd = %base,
        parallelism = cfg.parallelism,
        sigterm_grace = ?cfg.cancel.sigterm_grace,
        sigkill_wait = ?cfg.cancel.sigkill_wait,
        "execd listening"
    );
}
