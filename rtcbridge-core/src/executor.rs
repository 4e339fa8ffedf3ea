//! Serialized executor
//!
//! A single tokio task drains a FIFO of jobs. Native callbacks arriving on
//! any thread are turned into jobs, so every state mutation and every event
//! emission happens in one total order.

use crate::error::{BridgeError, BridgeResult};
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct ExecutorInner {
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    name: String,
}

/// Ordered, single-consumer job queue
#[derive(Clone)]
pub struct SerialExecutor {
    inner: Arc<ExecutorInner>,
}

impl fmt::Debug for SerialExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialExecutor")
            .field("name", &self.inner.name)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl SerialExecutor {
    /// Spawn the executor on the current tokio runtime
    pub fn spawn(name: impl Into<String>) -> BridgeResult<Self> {
        let handle = Handle::try_current().map_err(|e| BridgeError::Initialization {
            reason: format!("no tokio runtime available: {}", e),
        })?;
        Ok(Self::spawn_on(&handle, name))
    }

    /// Spawn the executor on an explicit runtime handle
    pub fn spawn_on(handle: &Handle, name: impl Into<String>) -> Self {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

        let task_name = name.clone();
        handle.spawn(async move {
            debug!("🧵 Serial executor '{}' started", task_name);
            while let Some(job) = rx.recv().await {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                    error!(
                        "Job on executor '{}' panicked: {}",
                        task_name,
                        panic_message(panic.as_ref())
                    );
                }
            }
            debug!("Serial executor '{}' drained", task_name);
        });

        Self {
            inner: Arc::new(ExecutorInner {
                tx: Mutex::new(Some(tx)),
                name,
            }),
        }
    }

    /// Enqueue a job; returns false once the executor is shut down
    ///
    /// Never blocks, so it is safe to call from native callback threads.
    pub fn execute<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        match self.inner.tx.lock().as_ref() {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => {
                debug!("Executor '{}' is shut down, dropping job", self.inner.name);
                false
            }
        }
    }

    /// Run `f` on the executor and resolve with its result
    pub async fn call<F, T>(&self, f: F) -> BridgeResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let queued = self.execute(move || {
            let _ = tx.send(f());
        });
        if !queued {
            return Err(BridgeError::invalid_state("executor is shut down"));
        }
        rx.await
            .map_err(|_| BridgeError::invalid_state("executor job did not complete"))
    }

    /// Resolve once every job enqueued before this call has run
    pub async fn flush(&self) {
        let _ = self.call(|| ()).await;
    }

    /// Stop accepting jobs; already queued jobs still run
    pub fn shutdown(&self) {
        if self.inner.tx.lock().take().is_some() {
            debug!("Serial executor '{}' shutting down", self.inner.name);
        }
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shutdown(&self) -> bool {
        self.inner.tx.lock().is_none()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
