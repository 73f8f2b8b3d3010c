// src/httpd/server.rs

//! Serving the router with a bounded graceful shutdown.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Default time in-flight requests get to finish after a shutdown signal.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve `router` on `listener` until `shutdown` resolves.
///
/// After `shutdown` fires no new connections are accepted, and in-flight
/// requests (including streaming executions) get up to `shutdown_timeout`
/// before the server is dropped. Running subprocesses are not cancelled.
pub async fn serve_with_graceful_shutdown<F>(
    listener: TcpListener,
    router: Router,
    shutdown_timeout: Duration,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().context("reading listener address")?;
    info!(%addr, "listening and serving");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        res = &mut server => {
            res.context("server task panicked")?.context("server error")?;
            return Ok(());
        }
        _ = shutdown => {}
    }

    warn!(timeout = ?shutdown_timeout, "server shutting down: waiting for in-flight requests");
    let _ = stop_tx.send(());

    match tokio::time::timeout(shutdown_timeout, &mut server).await {
        Ok(res) => {
            res.context("server task panicked")?.context("server error")?;
            warn!("server shutdown successfully");
        }
        Err(_) => {
            error!(timeout = ?shutdown_timeout, "in-flight requests did not finish; forcing shutdown");
            server.abort();
        }
    }

    Ok(())
}

/// Resolves on Ctrl-C (SIGINT) or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT"),
        _ = terminate => info!("received SIGTERM"),
    }
}
