// src/httpd/mod.rs

//! HTTP surface of the daemon.
//!
//! - `POST /` and `POST /execute` start the base command and stream its
//!   output ([`handlers::execute`]).
//! - `POST /cancel` stops an execution ([`handlers::cancel`]).
//!
//! [`server::serve_with_graceful_shutdown`] runs the router until a
//! shutdown signal arrives.

pub mod error;
pub mod handlers;
pub mod server;
pub mod state;

use axum::Router;
use axum::routing::post;

pub use error::{ApiError, ErrorResponse};
pub use handlers::{CancelCmdRequest, ExecuteCmdRequest};
pub use server::{serve_with_graceful_shutdown, shutdown_signal};
pub use state::AppState;

/// Build the router over `state`.
pub fn route(state: AppState) -> Router {
    Router::new()
        .route("/", post(handlers::execute))
        .route("/execute", post(handlers::execute))
        .route("/cancel", post(handlers::cancel))
        .with_state(state)
}
