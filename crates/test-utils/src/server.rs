//! A real `execd` server on an ephemeral port, plus an HTTP client for it.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use execd::exec::{CancelTimings, CommandSpec};
use execd::httpd::{self, AppState};
use execd::types::Output;

/// Running test server. Shut down on drop.
pub struct TestServer {
    addr: SocketAddr,
    client: reqwest::Client,
    state: AppState,
    parallelism: usize,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<()>>>,
}

impl TestServer {
    /// Time in-flight requests get after [`TestServer::shutdown`].
    pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

    /// Serve `base` on `127.0.0.1:0`.
    pub async fn spawn(base: CommandSpec, parallelism: usize, timings: CancelTimings) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = AppState::new(base, parallelism, timings);
        let router = httpd::route(state.clone());
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(httpd::serve_with_graceful_shutdown(
            listener,
            router,
            Self::SHUTDOWN_TIMEOUT,
            async move {
                let _ = shutdown_rx.await;
            },
        ));

        Self {
            addr,
            client: reqwest::Client::new(),
            state,
            parallelism,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Serve `program args...` with one slot and fast cancel timings.
    pub async fn spawn_cmd(program: &str, args: &[&str]) -> Self {
        Self::spawn(
            CommandSpec::new(program).with_args(args.iter().copied()),
            1,
            fast_timings(),
        )
        .await
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn post_raw(&self, path: &str, body: impl Into<reqwest::Body>) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .body(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn execute(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/execute"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Execute and collect the whole stream.
    pub async fn execute_all(&self, body: serde_json::Value) -> Vec<Output> {
        let resp = self.execute(body).await;
        assert_eq!(resp.status(), 200);
        crate::parse_outputs(&resp.text().await.unwrap())
    }

    pub async fn cancel(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(self.url("/cancel"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    /// Wait until no execution is tracked and every slot is free again.
    pub async fn wait_idle(&self) {
        while !self.state.registry.is_empty() || self.state.free_slots() < self.parallelism {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Stop accepting connections and wait for the server task.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Short cancel timings so escalation tests finish quickly.
pub fn fast_timings() -> CancelTimings {
    CancelTimings {
        poll_interval: Duration::from_millis(20),
        sigterm_grace: Duration::from_millis(300),
        sigkill_wait: Duration::from_millis(700),
    }
}

/// Reads events one at a time from a streaming response.
pub struct NdjsonStream {
    resp: reqwest::Response,
    buf: Vec<u8>,
}

impl NdjsonStream {
    pub fn new(resp: reqwest::Response) -> Self {
        Self {
            resp,
            buf: Vec::new(),
        }
    }

    /// Next event, or `None` once the body ends.
    pub async fn next_event(&mut self) -> Option<Output> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Some(serde_json::from_slice(line).unwrap());
            }
            match self.resp.chunk().await.unwrap() {
                Some(chunk) => self.buf.extend_from_slice(&chunk),
                None => return None,
            }
        }
    }

    /// Consume the rest of the stream.
    pub async fn collect_rest(mut self) -> Vec<Output> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }
}
