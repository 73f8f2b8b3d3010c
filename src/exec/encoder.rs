// src/exec/encoder.rs

//! Sinks for [`Output`] events produced by the run loop.
//!
//! The run loop only talks to an [`OutputEncoder`]; the HTTP layer plugs in a
//! [`ChunkedEncoder`] feeding the streaming response body, and tests can plug
//! in an encoder that records events or fails on demand.

use std::future::Future;
use std::pin::Pin;

use axum::body::Bytes;
use tokio::sync::mpsc;

use crate::errors::EncodeError;
use crate::types::Output;

/// Trait abstracting where run-loop events are written.
pub trait OutputEncoder: Send {
    /// Encode one event and push it to the client immediately.
    fn encode<'a>(
        &'a mut self,
        output: &'a Output,
    ) -> Pin<Box<dyn Future<Output = Result<(), EncodeError>> + Send + 'a>>;
}

/// Serialize an event as one NDJSON line.
pub fn encode_line(output: &Output) -> Result<Bytes, EncodeError> {
    let mut buf = serde_json::to_vec(output)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

/// Writes each event as its own chunk of a streaming HTTP body.
///
/// Every `encode` call hands one complete line to the body, so nothing is
/// held back in a buffer between events.
#[derive(Debug, Clone)]
pub struct ChunkedEncoder {
    tx: mpsc::Sender<Bytes>,
}

impl ChunkedEncoder {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Whether the receiving side (the response body) has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the response body is dropped, e.g. the client hung up.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

impl OutputEncoder for ChunkedEncoder {
    fn encode<'a>(
        &'a mut self,
        output: &'a Output,
    ) -> Pin<Box<dyn Future<Output = Result<(), EncodeError>> + Send + 'a>> {
        Box::pin(async move {
            let line = encode_line(output)?;
            self.tx.send(line).await.map_err(|_| EncodeError::Closed)
        })
    }
}

/// Drops every event. Used to keep draining a process whose client left.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardEncoder;

impl OutputEncoder for DiscardEncoder {
    fn encode<'a>(
        &'a mut self,
        _output: &'a Output,
    ) -> Pin<Box<dyn Future<Output = Result<(), EncodeError>> + Send + 'a>> {
        Box::pin(async { Ok(()) })
    }
}
