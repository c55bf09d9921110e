//! `queue` — an in-process, single-machine job queue.
//!
//! Grounded on the teacher's declared-but-empty `queue` crate; rebuilt as
//! a `tokio::sync::mpsc`-backed channel the `worker` CLI subcommand
//! drains, each job invoking [`engine::Engine::run_with_id`]. Explicitly
//! not a distributed scheduler: there is no cross-process coordination,
//! no persistence, and no at-least-once redelivery — a crashed worker
//! simply loses whatever was in flight.

use std::sync::Arc;

use engine::{Engine, Execution, RunContext, Workflow};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Queue capacity before [`JobQueue::submit`] starts applying backpressure.
pub const DEFAULT_CAPACITY: usize = 64;

/// One workflow submitted for execution. `id` doubles as the execution id
/// the worker passes to `Engine::run_with_id`, so a submitter can
/// subscribe to `engine.stream()` for this id before calling `submit`.
pub struct Job {
    pub id: Uuid,
    pub workflow: Workflow,
    pub run_ctx: RunContext,
}

impl Job {
    pub fn new(id: Uuid, workflow: Workflow, run_ctx: RunContext) -> Self {
        Self { id, workflow, run_ctx }
    }
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("no worker is draining this queue")]
    WorkerGone,
}

/// Sending half of the queue. Cheap to clone; every submitter (the API's
/// execute handler, the CLI) holds its own clone.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
}

impl JobQueue {
    /// Create a queue and the receiver a worker loop drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Submit a job, waiting if the queue is momentarily full.
    pub async fn submit(&self, job: Job) -> Result<(), SubmitError> {
        self.tx.send(job).await.map_err(|_| SubmitError::WorkerGone)
    }
}

/// Drain `rx` forever, running each job through `engine` and handing its
/// terminal `Execution` to `on_complete`. Returns once every `JobQueue`
/// clone has been dropped and the channel closes.
pub async fn run_worker<F>(mut rx: mpsc::Receiver<Job>, engine: Arc<Engine>, on_complete: F)
where
    F: Fn(Execution) + Send + Sync + 'static,
{
    info!("worker started, draining in-process job queue");
    while let Some(job) = rx.recv().await {
        let job_id = job.id;
        let execution = engine.run_with_id(job.id, &job.workflow, job.run_ctx).await;
        if execution.status != engine::ExecutionStatus::Completed {
            warn!(job_id = %job_id, status = ?execution.status, "job finished without success");
        }
        on_complete(execution);
    }
    info!("worker stopped, queue sender side dropped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{ExecutionStatus, Node, NodeRegistry, Workflow};
    use nodes::{cancellation_pair, mock::MockNode};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn workflow() -> Workflow {
        Workflow {
            id: "wf".into(),
            nodes: vec![Node { id: "a".into(), node_type: "mock_a".into(), config: Value::Null }],
            edges: vec![],
        }
    }

    #[tokio::test]
    async fn submitted_job_runs_and_reaches_on_complete() {
        let mut registry = NodeRegistry::new();
        registry.register("mock_a", Arc::new(MockNode::returning("a", json!({ "ok": true }))));
        let engine = Arc::new(Engine::new(registry));

        let (queue, rx) = JobQueue::new(DEFAULT_CAPACITY);
        let results: Arc<Mutex<Vec<Execution>>> = Arc::new(Mutex::new(Vec::new()));
        let results_for_worker = results.clone();

        let worker = tokio::spawn(run_worker(rx, engine, move |execution| {
            results_for_worker.lock().unwrap().push(execution);
        }));

        let (_handle, token) = cancellation_pair();
        let job_id = Uuid::new_v4();
        queue.submit(Job::new(job_id, workflow(), RunContext::new(token))).await.unwrap();
        drop(queue);

        worker.await.unwrap();

        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].execution_id, job_id);
        assert_eq!(results[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn dropping_every_queue_handle_stops_the_worker() {
        let registry = NodeRegistry::new();
        let engine = Arc::new(Engine::new(registry));
        let (queue, rx) = JobQueue::new(DEFAULT_CAPACITY);

        let worker = tokio::spawn(run_worker(rx, engine, |_| {}));
        drop(queue);

        tokio::time::timeout(std::time::Duration::from_secs(1), worker)
            .await
            .expect("worker should stop once the queue is dropped")
            .unwrap();
    }
}
