use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Default)]
pub struct QualityMetrics {
    complaints_assessed_total: AtomicU64,
    work_orders_scored_total: AtomicU64,
    degraded_assessments_total: AtomicU64,
    tool_invocations_total: AtomicU64,
    records_skipped_total: AtomicU64,
    briefings_total: AtomicU64,
    total_latency_millis: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub complaints_assessed_total: u64,
    pub work_orders_scored_total: u64,
    pub degraded_assessments_total: u64,
    pub tool_invocations_total: u64,
    pub records_skipped_total: u64,
    pub briefings_total: u64,
    pub avg_briefing_latency_millis: f64,
}

impl QualityMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_complaint_assessed(&self) {
        self.complaints_assessed_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_work_order_scored(&self) {
        self.work_orders_scored_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_degraded(&self) {
        self.degraded_assessments_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tool_invocation(&self) {
        self.tool_invocations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped(&self) {
        self.records_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_briefing(&self) {
        self.briefings_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn observe_briefing_latency(&self, duration: Duration) {
        self.total_latency_millis
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let briefings = self.briefings_total.load(Ordering::Relaxed);
        let latency = self.total_latency_millis.load(Ordering::Relaxed);

        MetricsSnapshot {
            complaints_assessed_total: self.complaints_assessed_total.load(Ordering::Relaxed),
            work_orders_scored_total: self.work_orders_scored_total.load(Ordering::Relaxed),
            degraded_assessments_total: self.degraded_assessments_total.load(Ordering::Relaxed),
            tool_invocations_total: self.tool_invocations_total.load(Ordering::Relaxed),
            records_skipped_total: self.records_skipped_total.load(Ordering::Relaxed),
            briefings_total: briefings,
            avg_briefing_latency_millis: if briefings == 0 {
                0.0
            } else {
                latency as f64 / briefings as f64
            },
        }
    }
}

pub fn init_tracing(service_name: &str) {
    TRACING_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}=info,qguard_briefing=info,qguard_tools=info",
                service_name
            ))
        });

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_span_list(true)
            .init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = QualityMetrics::default();
        metrics.inc_complaint_assessed();
        metrics.inc_complaint_assessed();
        metrics.inc_briefing();
        metrics.observe_briefing_latency(Duration::from_millis(40));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.complaints_assessed_total, 2);
        assert_eq!(snapshot.briefings_total, 1);
        assert_eq!(snapshot.avg_briefing_latency_millis, 40.0);
    }
}
