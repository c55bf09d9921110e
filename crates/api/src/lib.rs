//! `api` crate — HTTP REST API layer
//!
//! Exposes:
//!   GET    /api/v1/workflows
//!   POST   /api/v1/workflows
//!   GET    /api/v1/workflows/:id
//!   DELETE /api/v1/workflows/:id
//!   POST   /api/v1/workflows/:id/execute
//!   GET    /api/v1/executions/:id
//!   GET    /api/v1/executions/:id/stream   (SSE relay of `StreamBus` events)
//!   POST   /webhook/:path

pub mod handlers;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    routing::{get, post},
    Router,
};
use db::DbPool;
use engine::{Engine, Execution, NodeRegistry};
use queue::JobQueue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// In-memory table of completed executions, keyed by execution id, so a
/// caller can poll `GET /api/v1/executions/:id` after the queue worker
/// finishes a job. The engine itself never persists this; it's purely
/// an API-layer convenience over the stateless `Engine::run` contract.
pub type ExecutionStore = Arc<Mutex<HashMap<Uuid, Execution>>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub engine: Arc<Engine>,
    pub queue: JobQueue,
    pub executions: ExecutionStore,
}

/// Start the API server, including its in-process queue worker.
///
/// `registry` is the set of node handlers available to every workflow
/// this server executes.
pub async fn serve(bind: &str, pool: DbPool, registry: NodeRegistry) -> Result<(), std::io::Error> {
    let engine = Arc::new(
        Engine::new(registry)
            .with_cost_sink(Box::new(db::PgCostSink::new(pool.clone())))
            .with_span_sink(Box::new(db::PgSpanSink::new(pool.clone()))),
    );
    let (job_queue, rx) = JobQueue::new(queue::DEFAULT_CAPACITY);
    let executions: ExecutionStore = Arc::new(Mutex::new(HashMap::new()));

    let worker_engine = engine.clone();
    let worker_store = executions.clone();
    tokio::spawn(queue::run_worker(rx, worker_engine, move |execution| {
        worker_store.lock().unwrap().insert(execution.execution_id, execution);
    }));

    let state = AppState { pool, engine, queue: job_queue, executions };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_router = Router::new()
        .route("/workflows", get(handlers::workflows::list).post(handlers::workflows::create))
        .route("/workflows/:id", get(handlers::workflows::get).delete(handlers::workflows::delete))
        .route("/workflows/:id/execute", post(handlers::executions::execute))
        .route("/executions/:id", get(handlers::executions::get))
        .route("/executions/:id/stream", get(handlers::executions::stream));

    let app = Router::new()
        .nest("/api/v1", api_router)
        .route("/webhook/:path", post(handlers::webhooks::handle_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await
}
