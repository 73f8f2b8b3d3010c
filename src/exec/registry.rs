// src/exec/registry.rs

//! Tracks every in-flight execution by id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ExecError;
use crate::exec::escalation::CancelTimings;
use crate::exec::executor::CmdExecutor;

/// Map of execution id → executor, shared by the HTTP handlers.
///
/// The map lock is never held while an executor is being cancelled; the
/// entry is removed first and cancelled afterwards.
#[derive(Debug, Default)]
pub struct ExecutorRegistry {
    executors: Mutex<HashMap<String, Arc<CmdExecutor>>>,
    timings: CancelTimings,
}

impl ExecutorRegistry {
    pub fn new(timings: CancelTimings) -> Self {
        Self {
            executors: Mutex::new(HashMap::new()),
            timings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CmdExecutor>>> {
        self.executors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new executor under a fresh UUID.
    pub fn create_executor(&self) -> Arc<CmdExecutor> {
        let exec_id = Uuid::new_v4().to_string();
        let executor = Arc::new(CmdExecutor::new(exec_id.clone(), self.timings));
        self.lock().insert(exec_id.clone(), Arc::clone(&executor));
        debug!(exec_id = %exec_id, "executor created");
        executor
    }

    /// Remove an executor and cancel whatever it is running.
    ///
    /// With `None`, the only tracked executor is targeted; zero or several
    /// tracked executors are errors.
    pub async fn delete_executor(&self, exec_id: Option<&str>) -> Result<(), ExecError> {
        let executor = {
            let mut executors = self.lock();
            let id = match exec_id {
                Some(id) if executors.contains_key(id) => id.to_string(),
                Some(id) => return Err(ExecError::InvalidExecId(id.to_string())),
                None => match executors.len() {
                    0 => return Err(ExecError::NoExecutionToCancel),
                    1 => {
                        let only = executors.keys().next().cloned().ok_or(ExecError::NoExecutionToCancel)?;
                        info!(exec_id = %only, "no execution id provided, cancelling only existing execution");
                        only
                    }
                    _ => return Err(ExecError::AmbiguousCancel),
                },
            };
            executors
                .remove(&id)
                .ok_or(ExecError::InvalidExecId(id))?
        };

        debug!(exec_id = %executor.exec_id(), "executor removed");
        executor.cancel().await
    }

    pub fn get(&self, exec_id: &str) -> Option<Arc<CmdExecutor>> {
        self.lock().get(exec_id).cloned()
    }

    pub fn contains(&self, exec_id: &str) -> bool {
        self.lock().contains_key(exec_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }
}
