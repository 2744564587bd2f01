//! Batch scheduling and the blocking-model adapter.
//!
//! Extraction and merge analysis share one scheduling algorithm,
//! parameterized over [`ExecutionMode`] rather than duplicated per mode:
//!
//! - **Sequential**: batch futures are awaited one at a time, in document
//!   order. Suspension happens only at the model-invocation boundary.
//! - **Parallel**: all batch futures are dispatched at once against a
//!   bounded worker pool and gathered before proceeding. Completion order
//!   may differ from dispatch order, but results come back in original
//!   index order, so final output ordering is unaffected.
//!
//! The pool (a semaphore sized at construction) belongs to the pipeline
//! instance and is reused across every parallel-mode call for its lifetime.
//! Nothing here supports cancellation or a per-call timeout; a wait ceiling
//! is the session collaborator's concern, enforced around a single
//! invocation from outside.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::model::{GenerativeModel, ModelError, ModelResponse};

/// Worker pool size used when [`ExecutionMode::parallel`] is not given an
/// explicit bound.
pub const DEFAULT_CONCURRENCY: usize = 3;

// ── ExecutionMode ──────────────────────────────────────────────────────

/// How batches are scheduled against the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One batch in flight at a time, in document order.
    Sequential,
    /// All batches dispatched concurrently, bounded by `concurrency`.
    Parallel {
        /// Maximum batches in flight at once.
        concurrency: usize,
    },
}

impl ExecutionMode {
    /// Parallel mode with the default worker bound.
    #[must_use]
    pub fn parallel() -> Self {
        Self::Parallel {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

// ── ConcurrencyBridge ──────────────────────────────────────────────────

/// Executes a set of batch futures under the configured [`ExecutionMode`].
#[derive(Debug, Clone)]
pub struct ConcurrencyBridge {
    mode: ExecutionMode,
    pool: Arc<Semaphore>,
}

impl ConcurrencyBridge {
    /// Build a bridge, sizing the worker pool from the mode.
    #[must_use]
    pub fn new(mode: ExecutionMode) -> Self {
        let permits = match mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Parallel { concurrency } => concurrency,
        };
        Self {
            mode,
            pool: Arc::new(Semaphore::new(permits)),
        }
    }

    /// The mode this bridge was built with.
    #[must_use]
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Run every task and return their outputs in input order.
    ///
    /// Sequential mode awaits each future before starting the next.
    /// Parallel mode dispatches all of them, bounded by the pool, and
    /// reassembles outputs by original index.
    pub async fn run_all<T, F>(&self, tasks: Vec<F>) -> Vec<T>
    where
        F: Future<Output = T>,
    {
        match self.mode {
            ExecutionMode::Sequential => {
                let mut out = Vec::with_capacity(tasks.len());
                for task in tasks {
                    out.push(task.await);
                }
                out
            }
            ExecutionMode::Parallel { .. } => {
                join_all(tasks.into_iter().map(|task| {
                    let pool = Arc::clone(&self.pool);
                    async move {
                        // The pool is never closed while the bridge lives.
                        let _permit = pool
                            .acquire_owned()
                            .await
                            .expect("worker pool semaphore closed");
                        task.await
                    }
                }))
                .await
            }
        }
    }
}

// ── BlockingModel ──────────────────────────────────────────────────────

/// A generative model whose invocation blocks the calling thread.
pub trait SyncModel: Send + Sync + 'static {
    /// Send one prompt and block until the full response is available.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] when the backend call fails.
    fn invoke_blocking(&self, prompt: &str) -> Result<ModelResponse, ModelError>;
}

/// Adapter that runs a [`SyncModel`] off the cooperative scheduler.
///
/// Each invocation is moved onto the blocking thread pool via
/// `tokio::task::spawn_blocking`, so a slow backend never stalls the
/// async executor the pipeline runs on.
#[derive(Debug)]
pub struct BlockingModel<M: SyncModel> {
    inner: Arc<M>,
}

impl<M: SyncModel> BlockingModel<M> {
    /// Wrap a blocking model.
    #[must_use]
    pub fn new(inner: M) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }
}

#[async_trait]
impl<M: SyncModel> GenerativeModel for BlockingModel<M> {
    async fn invoke(&self, prompt: &str) -> Result<ModelResponse, ModelError> {
        let inner = Arc::clone(&self.inner);
        let prompt = prompt.to_owned();
        tokio::task::spawn_blocking(move || inner.invoke_blocking(&prompt))
            .await
            .map_err(|err| ModelError::Backend {
                reason: format!("blocking model task failed: {err}"),
            })?
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn sequential_preserves_order() {
        let bridge = ConcurrencyBridge::new(ExecutionMode::Sequential);
        let tasks: Vec<_> = (0..5).map(|i| async move { i * 10 }).collect();
        assert_eq!(bridge.run_all(tasks).await, vec![0, 10, 20, 30, 40]);
    }

    #[tokio::test]
    async fn parallel_reassembles_by_index() {
        let bridge = ConcurrencyBridge::new(ExecutionMode::parallel());
        // Later tasks finish first; output order must still match input.
        let tasks: Vec<_> = (0..4u64)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(20 - i * 5)).await;
                i
            })
            .collect();
        assert_eq!(bridge.run_all(tasks).await, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn parallel_respects_the_pool_bound() {
        let bridge = ConcurrencyBridge::new(ExecutionMode::Parallel { concurrency: 2 });
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..6)
            .map(|_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        bridge.run_all(tasks).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    struct EchoBlocking;

    impl SyncModel for EchoBlocking {
        fn invoke_blocking(&self, prompt: &str) -> Result<ModelResponse, ModelError> {
            Ok(ModelResponse::text(format!("echo: {prompt}")))
        }
    }

    #[tokio::test]
    async fn blocking_adapter_round_trips() {
        let model = BlockingModel::new(EchoBlocking);
        let response = model.invoke("hi").await.unwrap();
        assert_eq!(response.into_text(), "echo: hi");
    }
}
