// src/httpd/state.rs

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::exec::{CancelTimings, CommandSpec, ExecutorRegistry};

/// Shared state handed to every handler.
///
/// - `base`: the daemon's command and base args; requests only append.
/// - `registry`: executions addressable by `/cancel`.
/// - `slots`: one permit per execution allowed to run at once.
#[derive(Debug, Clone)]
pub struct AppState {
    pub base: Arc<CommandSpec>,
    pub registry: Arc<ExecutorRegistry>,
    pub slots: Arc<Semaphore>,
}

impl AppState {
    pub fn new(base: CommandSpec, parallelism: usize, timings: CancelTimings) -> Self {
        Self {
            base: Arc::new(base),
            registry: Arc::new(ExecutorRegistry::new(timings)),
            slots: Arc::new(Semaphore::new(parallelism)),
        }
    }

    /// Slots not currently held by an execution.
    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }
}
