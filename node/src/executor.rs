//! Per-task-kind worker pools.
//!
//! One [`TaskExecutor`] exists per [`TaskType`]. It runs the kind's
//! [`BlockchainTask`] for a blockchain at most once at a time in this
//! process: a key whose previous run has not finished is skipped, and a run
//! whose lease has already expired is never started.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};
use xrelay_types::{ChainKey, DistributedTask, TaskType};
use xrelay_utils::Clock;

use crate::supervisor::{supervise, Supervised};
use crate::tracing_spans::task_span;
use crate::{NodeError, RelayerMetrics};

/// The business operation behind one task kind.
#[async_trait]
pub trait BlockchainTask: Send + Sync {
    async fn process(&self, chain: &ChainKey) -> Result<(), NodeError>;
}

/// What [`TaskExecutor::execute`] did with a lease.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Submitted,
    /// The previous run for this chain is still in flight.
    StillRunning,
    /// The lease ran out before the run could start.
    LeaseExpired,
}

/// Holds one slot of the in-flight gauge until dropped, so an aborted run
/// releases its slot too.
struct InFlight(Arc<RelayerMetrics>);

impl InFlight {
    fn enter(metrics: Arc<RelayerMetrics>) -> Self {
        metrics.executions_in_flight.inc();
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.executions_in_flight.dec();
    }
}

pub struct TaskExecutor {
    task_type: TaskType,
    handler: Arc<dyn BlockchainTask>,
    permits: Arc<Semaphore>,
    in_flight: Mutex<HashMap<ChainKey, JoinHandle<()>>>,
    clock: Arc<dyn Clock>,
    metrics: Arc<RelayerMetrics>,
}

impl TaskExecutor {
    pub fn new(
        task_type: TaskType,
        handler: Arc<dyn BlockchainTask>,
        pool_size: usize,
        clock: Arc<dyn Clock>,
        metrics: Arc<RelayerMetrics>,
    ) -> Self {
        Self {
            task_type,
            handler,
            permits: Arc::new(Semaphore::new(pool_size.max(1))),
            in_flight: Mutex::new(HashMap::new()),
            clock,
            metrics,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    /// Submit the run for `task` unless one is in flight or its lease expired.
    /// Must be called from inside a Tokio runtime.
    pub fn execute(&self, task: &DistributedTask) -> ExecuteOutcome {
        let label = self.task_type.code();
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(handle) = in_flight.get(&task.chain) {
            if !handle.is_finished() {
                self.metrics.executor_skipped.with_label_values(&[label]).inc();
                return ExecuteOutcome::StillRunning;
            }
            in_flight.remove(&task.chain);
        }

        if task.is_expired(self.clock.now()) {
            debug!(task = %task.key(), "lease expired, not executing");
            self.metrics.executor_skipped.with_label_values(&[label]).inc();
            return ExecuteOutcome::LeaseExpired;
        }

        let handler = Arc::clone(&self.handler);
        let permits = Arc::clone(&self.permits);
        let metrics = Arc::clone(&self.metrics);
        let chain = task.chain.clone();
        let task_type = self.task_type;
        let span = task_span(task_type, &chain);

        let handle = tokio::spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let _in_flight = InFlight::enter(Arc::clone(&metrics));
                let started = Instant::now();
                let outcome = supervise(task_type.code(), handler.process(&chain)).await;
                metrics
                    .task_duration_ms
                    .observe(started.elapsed().as_secs_f64() * 1_000.0);
                if outcome != Supervised::Completed {
                    metrics
                        .executor_failed
                        .with_label_values(&[task_type.code()])
                        .inc();
                }
            }
            .instrument(span),
        );
        in_flight.insert(task.chain.clone(), handle);
        self.metrics.executor_submitted.with_label_values(&[label]).inc();
        ExecuteOutcome::Submitted
    }

    /// Chains with a run that has not finished yet.
    pub fn running(&self) -> Vec<ChainKey> {
        let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let mut chains: Vec<_> = in_flight
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(chain, _)| chain.clone())
            .collect();
        chains.sort();
        chains
    }

    /// Abort every in-flight run. Used on shutdown.
    pub fn abort_all(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in in_flight.drain() {
            handle.abort();
        }
    }
}

/// The six executors, looked up by task kind.
pub struct TaskExecutors {
    executors: HashMap<TaskType, Arc<TaskExecutor>>,
}

impl TaskExecutors {
    pub fn new(executors: impl IntoIterator<Item = TaskExecutor>) -> Self {
        Self {
            executors: executors
                .into_iter()
                .map(|e| (e.task_type(), Arc::new(e)))
                .collect(),
        }
    }

    pub fn get(&self, task_type: TaskType) -> Option<&Arc<TaskExecutor>> {
        self.executors.get(&task_type)
    }

    pub fn abort_all(&self) {
        for executor in self.executors.values() {
            executor.abort_all();
        }
    }
}
