//! Cost Tracker (§4.7) — turns a completed node's cost/token metadata
//! into a durable `CostRecord` via an injected, append-only sink.

use chrono::Utc;
use uuid::Uuid;

use crate::models::{Cost, CostRecord, TokenUsage};

/// Append-only ledger interface (§6 interface 4). The engine never reads
/// this back; a failing sink is logged, not propagated.
pub trait CostSink: Send + Sync {
    fn record(&self, record: CostRecord) -> Result<(), anyhow::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCostSink;

impl CostSink for NoopCostSink {
    fn record(&self, _record: CostRecord) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

pub struct CostTracker<'a> {
    sink: &'a dyn CostSink,
}

impl<'a> CostTracker<'a> {
    pub fn new(sink: &'a dyn CostSink) -> Self {
        Self { sink }
    }

    /// Record cost for a completed node, skipping nodes with no cost
    /// metadata at all (§4.7 "with non-zero cost metadata").
    #[allow(clippy::too_many_arguments)]
    pub fn track(
        &self,
        execution_id: Uuid,
        workflow_id: &str,
        node_id: &str,
        node_type: &str,
        cost: Cost,
        tokens: TokenUsage,
        provider: Option<String>,
        model: Option<String>,
    ) {
        if cost == Cost::ZERO && tokens == TokenUsage::default() {
            return;
        }

        let record = CostRecord {
            execution_id,
            workflow_id: workflow_id.to_string(),
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            cost,
            tokens,
            provider,
            model,
            timestamp: Utc::now(),
        };

        if let Err(err) = self.sink.record(record) {
            tracing::warn!(%execution_id, node_id, %err, "cost sink failed to record cost, continuing execution");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingSink(Mutex<Vec<CostRecord>>);

    impl CostSink for CapturingSink {
        fn record(&self, record: CostRecord) -> Result<(), anyhow::Error> {
            self.0.lock().unwrap().push(record);
            Ok(())
        }
    }

    struct FailingSink;
    impl CostSink for FailingSink {
        fn record(&self, _record: CostRecord) -> Result<(), anyhow::Error> {
            Err(anyhow::anyhow!("ledger unavailable"))
        }
    }

    #[test]
    fn zero_cost_and_tokens_are_not_recorded() {
        let sink = CapturingSink::default();
        let tracker = CostTracker::new(&sink);
        tracker.track(Uuid::new_v4(), "wf", "n1", "generate", Cost::ZERO, TokenUsage::default(), None, None);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn non_zero_cost_is_recorded() {
        let sink = CapturingSink::default();
        let tracker = CostTracker::new(&sink);
        tracker.track(
            Uuid::new_v4(),
            "wf",
            "n1",
            "generate",
            Cost::from_f64(0.02),
            TokenUsage { input: 10, output: 5, total: 15 },
            Some("stub".into()),
            Some("stub-model".into()),
        );
        let recorded = sink.0.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].cost.to_f64(), 0.02);
    }

    #[test]
    fn failing_sink_does_not_panic_or_propagate() {
        let sink = FailingSink;
        let tracker = CostTracker::new(&sink);
        tracker.track(Uuid::new_v4(), "wf", "n1", "generate", Cost::from_f64(1.0), TokenUsage::default(), None, None);
    }
}
