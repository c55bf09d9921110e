//! `engine::CostSink` / `engine::SpanSink` implementations backed by
//! Postgres.
//!
//! Both trait methods are synchronous (the engine never awaits a sink —
//! "a failing sink is logged, not propagated"), but writing to Postgres
//! is inherently async. Each sink owns an unbounded channel and a
//! background task that drains it against the pool, mirroring the
//! `queue` crate's own channel-plus-drain-loop shape. `record`/`start`/
//! `add_attribute`/`end` only need to push onto the channel, which never
//! blocks and never fails unless the background task has already died.

use chrono::Utc;
use engine::{CostRecord, CostSink, SpanDescriptor, SpanSink, SpanStatus};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// Backed by the `cost_records` table.
pub struct PgCostSink {
    tx: mpsc::UnboundedSender<CostRecord>,
}

impl PgCostSink {
    pub fn new(pool: PgPool) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<CostRecord>();

        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let result = sqlx::query!(
                    r#"
                    INSERT INTO cost_records
                        (execution_id, workflow_id, node_id, node_type, cost,
                         tokens_input, tokens_output, tokens_total, provider, model, recorded_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                    "#,
                    record.execution_id,
                    record.workflow_id,
                    record.node_id,
                    record.node_type,
                    record.cost.to_f64(),
                    record.tokens.input as i64,
                    record.tokens.output as i64,
                    record.tokens.total as i64,
                    record.provider,
                    record.model,
                    record.timestamp,
                )
                .execute(&pool)
                .await;

                if let Err(err) = result {
                    warn!(%err, execution_id = %record.execution_id, "failed to persist cost record");
                }
            }
        });

        Self { tx }
    }
}

impl CostSink for PgCostSink {
    fn record(&self, record: CostRecord) -> Result<(), anyhow::Error> {
        self.tx.send(record).map_err(|_| anyhow::anyhow!("cost sink background task has stopped"))
    }
}

enum SpanCommand {
    Start { span_id: Uuid, descriptor: SpanDescriptor, started_at: chrono::DateTime<Utc> },
    Attribute { span_id: Uuid, key: String, value: Value },
    End { span_id: Uuid, status: SpanStatus, ended_at: chrono::DateTime<Utc> },
}

/// Backed by the `trace_spans` table. Attributes accumulate into the
/// row's `attributes` JSONB column via `jsonb_set`; `end` sets `status`
/// and `ended_at`.
pub struct PgSpanSink {
    tx: mpsc::UnboundedSender<SpanCommand>,
}

impl PgSpanSink {
    pub fn new(pool: PgPool) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<SpanCommand>();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                let result = match command {
                    SpanCommand::Start { span_id, descriptor, started_at } => sqlx::query!(
                        r#"
                        INSERT INTO trace_spans (span_id, parent_span_id, name, span_type, started_at)
                        VALUES ($1, $2, $3, $4, $5)
                        "#,
                        span_id,
                        descriptor.parent_span_id,
                        descriptor.name,
                        descriptor.span_type,
                        started_at,
                    )
                    .execute(&pool)
                    .await
                    .map(|_| ()),
                    SpanCommand::Attribute { span_id, key, value } => sqlx::query!(
                        r#"
                        UPDATE trace_spans
                        SET attributes = jsonb_set(attributes, ARRAY[$2], $3, true)
                        WHERE span_id = $1
                        "#,
                        span_id,
                        key,
                        value,
                    )
                    .execute(&pool)
                    .await
                    .map(|_| ()),
                    SpanCommand::End { span_id, status, ended_at } => {
                        let status_str = match status {
                            SpanStatus::Ok => "ok",
                            SpanStatus::Error => "error",
                        };
                        sqlx::query!(
                            r#"UPDATE trace_spans SET status = $2, ended_at = $3 WHERE span_id = $1"#,
                            span_id,
                            status_str,
                            ended_at,
                        )
                        .execute(&pool)
                        .await
                        .map(|_| ())
                    }
                };

                if let Err(err) = result {
                    warn!(%err, "failed to persist trace span update");
                }
            }
        });

        Self { tx }
    }
}

impl SpanSink for PgSpanSink {
    fn start(&self, descriptor: SpanDescriptor) -> Uuid {
        let span_id = Uuid::new_v4();
        let _ = self.tx.send(SpanCommand::Start { span_id, descriptor, started_at: Utc::now() });
        span_id
    }

    fn add_attribute(&self, span_id: Uuid, key: &str, value: Value) {
        let _ = self.tx.send(SpanCommand::Attribute { span_id, key: key.to_string(), value });
    }

    fn end(&self, span_id: Uuid, status: SpanStatus) {
        let _ = self.tx.send(SpanCommand::End { span_id, status, ended_at: Utc::now() });
    }
}
