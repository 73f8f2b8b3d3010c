//! An [`OutputEncoder`] that keeps every event in memory.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use execd::errors::EncodeError;
use execd::exec::OutputEncoder;
use execd::types::Output;

/// Records encoded events; optionally starts failing after `n` of them.
///
/// Clones share the same record, so a test can keep one handle while the
/// run loop owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingEncoder {
    events: Arc<Mutex<Vec<Output>>>,
    fail_after: Option<usize>,
}

impl RecordingEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `n` events, then return [`EncodeError::Closed`] like a client
    /// that went away.
    pub fn failing_after(n: usize) -> Self {
        Self {
            events: Arc::default(),
            fail_after: Some(n),
        }
    }

    pub fn events(&self) -> Vec<Output> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events().into_iter().map(|o| o.msg).collect()
    }
}

impl OutputEncoder for RecordingEncoder {
    fn encode<'a>(
        &'a mut self,
        output: &'a Output,
    ) -> Pin<Box<dyn Future<Output = Result<(), EncodeError>> + Send + 'a>> {
        Box::pin(async move {
            let mut events = self.events.lock().unwrap();
            if self.fail_after.is_some_and(|n| events.len() >= n) {
                return Err(EncodeError::Closed);
            }
            events.push(output.clone());
            Ok(())
        })
    }
}
