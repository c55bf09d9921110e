//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models — they carry no domain behaviour.
//! Domain types live in the `engine` crate. The engine's own execution
//! state is in-memory only (an `engine::Execution` lives for the
//! duration of one `Engine::run` call), so there is no
//! workflow_executions/node_executions row here to mirror it; only the
//! tables that actually exist under `migrations/` get a row struct.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow definition row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    /// Full JSON workflow definition (nodes, edges, …), deserializable
    /// into `engine::Workflow`.
    pub definition: serde_json::Value,
    /// Webhook path this workflow is bound to, if any (§4.2 trigger).
    pub trigger_path: Option<String>,
    pub created_at: DateTime<Utc>,
}
