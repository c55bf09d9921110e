//! Stream Bus (§4.8) — delivers execution lifecycle events to zero or
//! more subscribers in emission order.
//!
//! One `mpsc` channel per subscriber carries both event classes so
//! ordering is never split across channels: lifecycle events are sent
//! with a guaranteed (awaited) send, `node_progress` uses `try_send` and
//! is dropped on backpressure — the only droppable class per spec.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::ExecutionErrorKind;
use crate::models::{Cost, ExecutionStatus};

/// Minimum per-subscriber buffer depth (§4.8: "bounded... ≥16 events").
pub const MIN_SUBSCRIBER_BUFFER: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: String,
        started_at: DateTime<Utc>,
        node_count: usize,
    },
    NodeStarted {
        execution_id: Uuid,
        node_id: String,
        node_type: String,
        started_at: DateTime<Utc>,
        span_id: Uuid,
    },
    NodeProgress {
        execution_id: Uuid,
        node_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fraction: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        partial: Option<serde_json::Value>,
    },
    NodeCompleted {
        execution_id: Uuid,
        node_id: String,
        duration_ms: i64,
        cost: Cost,
        tokens_total: u64,
        output_digest: String,
    },
    NodeFailed {
        execution_id: Uuid,
        node_id: String,
        error_kind: ExecutionErrorKind,
        message: String,
    },
    NodeSkipped {
        execution_id: Uuid,
        node_id: String,
        reason: String,
    },
    ExecutionCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
        total_cost: Cost,
        duration_ms: i64,
    },
}

impl Event {
    fn is_droppable(&self) -> bool {
        matches!(self, Event::NodeProgress { .. })
    }
}

#[derive(Default)]
pub struct StreamBus {
    subscribers: Mutex<HashMap<Uuid, Vec<mpsc::Sender<Event>>>>,
}

impl StreamBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events for one execution. Each call creates an
    /// independent channel; all active subscribers receive every
    /// non-droppable event.
    pub fn subscribe(&self, execution_id: Uuid) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(MIN_SUBSCRIBER_BUFFER);
        self.subscribers.lock().unwrap().entry(execution_id).or_default().push(tx);
        rx
    }

    /// Publish to every subscriber of `execution_id`, in order. Dead
    /// subscribers (receiver dropped) are left for the next `publish` to
    /// notice and aren't removed eagerly, since a send failure due to a
    /// full buffer on a droppable event looks identical at this layer.
    pub async fn publish(&self, execution_id: Uuid, event: Event) {
        let senders: Vec<mpsc::Sender<Event>> = {
            let guard = self.subscribers.lock().unwrap();
            guard.get(&execution_id).cloned().unwrap_or_default()
        };

        let droppable = event.is_droppable();
        for sender in senders {
            if droppable {
                let _ = sender.try_send(event.clone());
            } else {
                let _ = sender.send(event.clone()).await;
            }
        }
    }

    /// Drop all subscriptions for a terminated execution so its senders
    /// (and any backlog) can be reclaimed.
    pub fn close(&self, execution_id: Uuid) {
        self.subscribers.lock().unwrap().remove(&execution_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events_in_emission_order() {
        let bus = StreamBus::new();
        let execution_id = Uuid::new_v4();
        let mut rx = bus.subscribe(execution_id);

        bus.publish(execution_id, Event::NodeStarted {
            execution_id,
            node_id: "a".into(),
            node_type: "embed".into(),
            started_at: Utc::now(),
            span_id: Uuid::new_v4(),
        }).await;
        bus.publish(execution_id, Event::NodeSkipped {
            execution_id,
            node_id: "b".into(),
            reason: "missing_input".into(),
        }).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(first, Event::NodeStarted { .. }));
        assert!(matches!(second, Event::NodeSkipped { .. }));
    }

    #[tokio::test]
    async fn progress_overflow_drops_progress_without_erroring() {
        let bus = StreamBus::new();
        let execution_id = Uuid::new_v4();
        let _rx = bus.subscribe(execution_id);

        for i in 0..(MIN_SUBSCRIBER_BUFFER * 4) {
            bus.publish(execution_id, Event::NodeProgress {
                execution_id,
                node_id: "a".into(),
                fraction: Some(i as f64),
                message: None,
                partial: None,
            }).await;
        }
    }

    #[tokio::test]
    async fn closing_an_execution_drops_its_subscribers() {
        let bus = StreamBus::new();
        let execution_id = Uuid::new_v4();
        let mut rx = bus.subscribe(execution_id);
        bus.close(execution_id);

        bus.publish(execution_id, Event::NodeSkipped {
            execution_id,
            node_id: "a".into(),
            reason: "canceled".into(),
        }).await;

        assert!(rx.recv().await.is_none());
    }
}
