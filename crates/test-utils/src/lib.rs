pub mod encoder;
pub mod server;

use std::sync::Once;
use tracing_subscriber::{fmt, EnvFilter};

use execd::types::Output;

pub use encoder::RecordingEncoder;
pub use server::{NdjsonStream, TestServer};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    with_timeout_secs(5, f).await
}

/// Like [`with_timeout`], for tests that wait out cancel grace periods.
pub async fn with_timeout_secs<F, T>(secs: u64, f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(secs), f)
        .await
        .unwrap_or_else(|_| panic!("Test timed out after {secs} seconds"))
}

/// Parse a complete NDJSON body into events, skipping blank lines.
pub fn parse_outputs(body: &str) -> Vec<Output> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap_or_else(|e| panic!("bad event line {l:?}: {e}")))
        .collect()
}
