use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use qguard_briefing::{BriefingComposer, FailureStage};
use qguard_core::{
    BatchWindow, BriefingItemKind, ComplaintRecord, ComplaintStatus, ReworkRiskScorer,
    SignalLexicon, WorkOrderRecord,
};
use qguard_knowledge::{KnowledgeCorpus, ProcedureSnippet};
use qguard_ml::UrgencyClassifier;
use qguard_observability::QualityMetrics;
use qguard_storage::{ContractorHistoryStore, MemoryStore, RecordStore};
use qguard_tools::{KnowledgeLookupTool, ScoreReworkTool, ToolRegistry, UrgencyTool};

fn window() -> BatchWindow {
    BatchWindow {
        since: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
        until: Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
    }
}

fn registry(corpus: KnowledgeCorpus) -> Arc<ToolRegistry> {
    let classifier = Arc::new(UrgencyClassifier::new(SignalLexicon::builtin(), None));

    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(UrgencyTool::new(classifier)))
        .unwrap();
    registry
        .register(Arc::new(ScoreReworkTool::new(ReworkRiskScorer::builtin())))
        .unwrap();
    registry
        .register(Arc::new(KnowledgeLookupTool::new(Arc::new(corpus))))
        .unwrap();
    Arc::new(registry)
}

fn empty_corpus() -> KnowledgeCorpus {
    KnowledgeCorpus::from_snippets("v1-test", Vec::new())
}

fn frozen_pipes_complaint() -> ComplaintRecord {
    ComplaintRecord {
        complaint_id: "C-311-0001".to_string(),
        narrative: "No heat for three days, pipes frozen, risk of burst".to_string(),
        category: "HEAT/HOT WATER".to_string(),
        reported_at: Utc.with_ymd_and_hms(2025, 6, 1, 7, 45, 0).unwrap(),
        location_id: "BLDG-A".to_string(),
        status: ComplaintStatus::Open,
    }
}

fn patched_boiler_order(id: &str, contractor: &str) -> WorkOrderRecord {
    WorkOrderRecord {
        work_order_id: id.to_string(),
        asset_id: "BOILER-07".to_string(),
        asset_age_months: 200,
        resolution_code: "temporary_patch".to_string(),
        contractor_id: contractor.to_string(),
        completed_at: Utc.with_ymd_and_hms(2025, 6, 1, 15, 0, 0).unwrap(),
    }
}

#[tokio::test]
async fn critical_complaint_outranks_high_risk_work_order() {
    let store = MemoryStore::new();
    store.insert_complaint(frozen_pipes_complaint());
    store.insert_work_order(patched_boiler_order("WO-9001", "CTR-ACME"));
    store.set_rework_rate("CTR-ACME", 0.5);

    let composer = BriefingComposer::new(
        registry(empty_corpus()),
        Arc::new(store),
        QualityMetrics::shared(),
    );

    let run = composer.compose(window()).await.unwrap();

    assert!(run.errors.is_empty());
    assert_eq!(run.briefing.items.len(), 2);

    let first = &run.briefing.items[0];
    let second = &run.briefing.items[1];
    assert_eq!(first.kind, BriefingItemKind::UrgentComplaint);
    assert_eq!(first.reference_id, "C-311-0001");
    assert_eq!(second.kind, BriefingItemKind::ReworkRisk);
    assert_eq!(second.reference_id, "WO-9001");
    assert!(first.rank > second.rank);

    // 30 (age cap) + 25 (patch) + 15 (0.5 x 30) = 70 -> HIGH at 0.8 weight.
    assert!((second.rank - 0.56).abs() < 1e-9);
    assert!(second.summary.contains("70"));
}

#[tokio::test]
async fn critical_complaint_pulls_a_knowledge_note() {
    let corpus = KnowledgeCorpus::from_snippets(
        "v1-test",
        vec![ProcedureSnippet {
            snippet_id: "heating-outage.md::0".to_string(),
            title: "Heating outage".to_string(),
            body: "No heat during heating season: frozen pipes are treated as an emergency."
                .to_string(),
            source_path: "heating-outage.md".to_string(),
        }],
    );

    let store = MemoryStore::new();
    store.insert_complaint(frozen_pipes_complaint());

    let composer = BriefingComposer::new(registry(corpus), Arc::new(store), QualityMetrics::shared());
    let run = composer.compose(window()).await.unwrap();

    assert!(run.errors.is_empty());
    assert_eq!(run.briefing.items.len(), 2);
    assert_eq!(run.briefing.items[0].kind, BriefingItemKind::UrgentComplaint);
    assert_eq!(run.briefing.items[1].kind, BriefingItemKind::KnowledgeNote);
    assert!(run.briefing.items[1].summary.contains("Heating outage"));
}

#[tokio::test]
async fn routine_records_produce_no_items() {
    let store = MemoryStore::new();
    store.insert_complaint(ComplaintRecord {
        complaint_id: "C-311-0042".to_string(),
        narrative: "paint peeling near the stairwell".to_string(),
        category: "PAINT/PLASTER".to_string(),
        reported_at: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        location_id: "BLDG-C".to_string(),
        status: ComplaintStatus::Open,
    });
    store.insert_work_order(WorkOrderRecord {
        work_order_id: "WO-9050".to_string(),
        asset_id: "DOOR-12".to_string(),
        asset_age_months: 6,
        resolution_code: "full_replacement".to_string(),
        contractor_id: "CTR-VERT".to_string(),
        completed_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    });
    store.set_rework_rate("CTR-VERT", 0.05);

    let composer = BriefingComposer::new(
        registry(empty_corpus()),
        Arc::new(store),
        QualityMetrics::shared(),
    );
    let run = composer.compose(window()).await.unwrap();

    assert!(run.errors.is_empty());
    assert!(run.briefing.items.is_empty());
}

#[tokio::test]
async fn rebuilding_the_same_batch_is_reproducible() {
    let store = Arc::new(MemoryStore::new());
    store.insert_complaint(frozen_pipes_complaint());
    store.insert_work_order(patched_boiler_order("WO-9001", "CTR-ACME"));
    store.set_rework_rate("CTR-ACME", 0.5);

    let composer = BriefingComposer::new(
        registry(empty_corpus()),
        store,
        QualityMetrics::shared(),
    );

    let first = composer.compose(window()).await.unwrap();
    let second = composer.compose(window()).await.unwrap();

    let strip = |run: &qguard_briefing::BriefingRun| {
        run.briefing
            .items
            .iter()
            .map(|item| (item.kind, item.reference_id.clone(), item.summary.clone(), item.rank))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&first), strip(&second));
}

/// History store whose lookup hangs for one contractor, standing in for an
/// unresponsive collaborator.
struct StallingStore {
    inner: MemoryStore,
    stalled_contractor: String,
}

impl RecordStore for StallingStore {
    async fn open_complaints_in(&self, window: BatchWindow) -> Result<Vec<ComplaintRecord>> {
        self.inner.open_complaints_in(window).await
    }

    async fn closed_work_orders_in(&self, window: BatchWindow) -> Result<Vec<WorkOrderRecord>> {
        self.inner.closed_work_orders_in(window).await
    }
}

impl ContractorHistoryStore for StallingStore {
    async fn rework_rate(&self, contractor_id: &str) -> Result<Option<f64>> {
        if contractor_id == self.stalled_contractor {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.rework_rate(contractor_id).await
    }
}

#[tokio::test]
async fn one_timed_out_lookup_skips_one_record_only() {
    let inner = MemoryStore::new();
    for idx in 0..5 {
        let contractor = if idx == 2 { "CTR-SLOW" } else { "CTR-OK" };
        inner.insert_work_order(patched_boiler_order(&format!("WO-90{idx:02}"), contractor));
    }
    inner.set_rework_rate("CTR-OK", 0.5);
    inner.set_rework_rate("CTR-SLOW", 0.5);

    let store = StallingStore {
        inner,
        stalled_contractor: "CTR-SLOW".to_string(),
    };

    let composer = BriefingComposer::new(
        registry(empty_corpus()),
        Arc::new(store),
        QualityMetrics::shared(),
    )
    .with_lookup_timeout(Duration::from_millis(50));

    let run = composer.compose(window()).await.unwrap();

    assert_eq!(run.briefing.items.len(), 4);
    assert_eq!(run.errors.len(), 1);
    assert_eq!(run.errors[0].record_id, "WO-9002");
    assert_eq!(run.errors[0].stage, FailureStage::HistoryLookup);
}
