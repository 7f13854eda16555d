use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use qguard_core::{
    BatchWindow, Briefing, BriefingItem, BriefingItemKind, ComplaintRecord, ReworkRiskAssessment,
    RiskBand, UrgencyAssessment, UrgencyTier, WorkOrderRecord,
};
use qguard_observability::QualityMetrics;
use qguard_storage::{ContractorHistoryStore, RecordStore};
use qguard_tools::{
    KnowledgeLookupReply, ToolRegistry, KNOWLEDGE_LOOKUP_TOOL, SCORE_REWORK_TOOL, URGENCY_TOOL,
};
use serde::Serialize;
use serde_json::json;
use tokio::time::timeout;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    UrgencyAssessment,
    HistoryLookup,
    ReworkScoring,
    KnowledgeLookup,
}

/// One record that could not be scored. The record is skipped; the batch
/// still completes.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringFailure {
    pub record_id: String,
    pub stage: FailureStage,
    pub message: String,
}

/// Ranking weights applied to normalized component scores. Urgency is
/// deliberately weighted above rework risk.
#[derive(Debug, Clone, Copy)]
pub struct RankWeights {
    pub urgency: f64,
    pub risk: f64,
    pub knowledge: f64,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            urgency: 1.0,
            risk: 0.8,
            knowledge: 0.3,
        }
    }
}

/// Result of one `compose` call: the briefing plus the per-run error
/// accumulator, reported alongside each other.
#[derive(Debug, Clone, Serialize)]
pub struct BriefingRun {
    pub briefing: Briefing,
    pub errors: Vec<ScoringFailure>,
}

struct RankedItem {
    item: BriefingItem,
    // 0 = Critical/High, 1 = Elevated/Medium, 2 = knowledge note.
    class: u8,
    record_at: DateTime<Utc>,
}

pub struct BriefingComposer<S>
where
    S: RecordStore + ContractorHistoryStore,
{
    registry: Arc<ToolRegistry>,
    store: Arc<S>,
    metrics: Arc<QualityMetrics>,
    weights: RankWeights,
    lookup_timeout: Duration,
}

impl<S> BriefingComposer<S>
where
    S: RecordStore + ContractorHistoryStore,
{
    pub fn new(registry: Arc<ToolRegistry>, store: Arc<S>, metrics: Arc<QualityMetrics>) -> Self {
        Self {
            registry,
            store,
            metrics,
            weights: RankWeights::default(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_weights(mut self, weights: RankWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    /// Scores every open complaint and newly closed work order in the
    /// window and assembles the ranked briefing. Per-record failures are
    /// collected, never fatal; a failure loading the batches themselves
    /// means the run is not started.
    #[instrument(skip(self))]
    pub async fn compose(&self, window: BatchWindow) -> Result<BriefingRun> {
        let started = Instant::now();

        let complaints = self.store.open_complaints_in(window).await?;
        let work_orders = self.store.closed_work_orders_in(window).await?;

        let mut errors = Vec::new();
        let mut ranked = Vec::new();

        // Barrier: all per-record scoring completes before ranking.
        let assessments = join_all(
            complaints
                .iter()
                .map(|record| async { self.assess_complaint(record) }),
        )
        .await;
        let scored = join_all(
            work_orders
                .iter()
                .map(|record| self.score_work_order(record)),
        )
        .await;

        let mut critical = Vec::new();
        for outcome in assessments {
            match outcome {
                Ok((record, assessment)) => {
                    self.metrics.inc_complaint_assessed();
                    if assessment.degraded {
                        self.metrics.inc_degraded();
                    }
                    if assessment.tier == UrgencyTier::Critical {
                        critical.push((record.clone(), assessment.clone()));
                    }
                    if let Some(item) = self.complaint_item(record, &assessment) {
                        ranked.push(item);
                    }
                }
                Err(failure) => {
                    self.metrics.inc_skipped();
                    warn!(record_id = %failure.record_id, stage = ?failure.stage, "record skipped");
                    errors.push(failure);
                }
            }
        }

        for outcome in scored {
            match outcome {
                Ok((record, assessment)) => {
                    self.metrics.inc_work_order_scored();
                    if let Some(item) = self.work_order_item(record, &assessment) {
                        ranked.push(item);
                    }
                }
                Err(failure) => {
                    self.metrics.inc_skipped();
                    warn!(record_id = %failure.record_id, stage = ?failure.stage, "record skipped");
                    errors.push(failure);
                }
            }
        }

        for (record, assessment) in &critical {
            match self.knowledge_item(record, assessment) {
                Ok(Some(item)) => ranked.push(item),
                Ok(None) => {}
                Err(failure) => {
                    warn!(record_id = %failure.record_id, stage = ?failure.stage, "knowledge lookup failed");
                    errors.push(failure);
                }
            }
        }

        let items = rank_items(ranked);
        let briefing = Briefing {
            briefing_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            window,
            items,
        };

        self.metrics.inc_briefing();
        self.metrics.observe_briefing_latency(started.elapsed());
        info!(
            briefing_id = %briefing.briefing_id,
            complaints = complaints.len(),
            work_orders = work_orders.len(),
            items = briefing.items.len(),
            skipped = errors.len(),
            "briefing composed"
        );

        Ok(BriefingRun { briefing, errors })
    }

    fn assess_complaint<'a>(
        &self,
        record: &'a ComplaintRecord,
    ) -> Result<(&'a ComplaintRecord, UrgencyAssessment), ScoringFailure> {
        let input = serde_json::to_value(record).map_err(|error| ScoringFailure {
            record_id: record.complaint_id.clone(),
            stage: FailureStage::UrgencyAssessment,
            message: error.to_string(),
        })?;

        self.metrics.inc_tool_invocation();
        let output = self
            .registry
            .invoke(URGENCY_TOOL, input)
            .map_err(|error| ScoringFailure {
                record_id: record.complaint_id.clone(),
                stage: FailureStage::UrgencyAssessment,
                message: error.to_string(),
            })?;

        let assessment =
            serde_json::from_value::<UrgencyAssessment>(output).map_err(|error| ScoringFailure {
                record_id: record.complaint_id.clone(),
                stage: FailureStage::UrgencyAssessment,
                message: error.to_string(),
            })?;

        Ok((record, assessment))
    }

    async fn score_work_order<'a>(
        &self,
        record: &'a WorkOrderRecord,
    ) -> Result<(&'a WorkOrderRecord, ReworkRiskAssessment), ScoringFailure> {
        // A timed-out or failed history lookup skips this record only.
        let rate = timeout(
            self.lookup_timeout,
            self.store.rework_rate(&record.contractor_id),
        )
        .await
        .map_err(|_| ScoringFailure {
            record_id: record.work_order_id.clone(),
            stage: FailureStage::HistoryLookup,
            message: format!(
                "contractor history lookup timed out after {:?}",
                self.lookup_timeout
            ),
        })?
        .map_err(|error| ScoringFailure {
            record_id: record.work_order_id.clone(),
            stage: FailureStage::HistoryLookup,
            message: error.to_string(),
        })?;

        self.metrics.inc_tool_invocation();
        let output = self
            .registry
            .invoke(
                SCORE_REWORK_TOOL,
                json!({ "work_order": record, "contractor_rework_rate": rate }),
            )
            .map_err(|error| ScoringFailure {
                record_id: record.work_order_id.clone(),
                stage: FailureStage::ReworkScoring,
                message: error.to_string(),
            })?;

        let assessment = serde_json::from_value::<ReworkRiskAssessment>(output).map_err(|error| {
            ScoringFailure {
                record_id: record.work_order_id.clone(),
                stage: FailureStage::ReworkScoring,
                message: error.to_string(),
            }
        })?;

        Ok((record, assessment))
    }

    fn complaint_item(
        &self,
        record: &ComplaintRecord,
        assessment: &UrgencyAssessment,
    ) -> Option<RankedItem> {
        let class = match assessment.tier {
            UrgencyTier::Critical => 0,
            UrgencyTier::Elevated => 1,
            UrgencyTier::Routine => return None,
        };

        let signals = if assessment.matched_signals.is_empty() {
            String::new()
        } else {
            format!(": {}", assessment.matched_signals.join(", "))
        };

        Some(RankedItem {
            item: BriefingItem {
                kind: BriefingItemKind::UrgentComplaint,
                reference_id: record.complaint_id.clone(),
                summary: format!(
                    "{} complaint {} ({}) at {}{}",
                    tier_label(assessment.tier),
                    record.complaint_id,
                    record.category,
                    record.location_id,
                    signals
                ),
                rank: self.weights.urgency * assessment.confidence,
            },
            class,
            record_at: record.reported_at,
        })
    }

    fn work_order_item(
        &self,
        record: &WorkOrderRecord,
        assessment: &ReworkRiskAssessment,
    ) -> Option<RankedItem> {
        let class = match assessment.band {
            RiskBand::High => 0,
            RiskBand::Medium => 1,
            RiskBand::Low => return None,
        };

        let top_factor = assessment
            .factors
            .iter()
            .max_by(|a, b| a.points.partial_cmp(&b.points).unwrap_or(std::cmp::Ordering::Equal))
            .map(|factor| factor.name.as_str())
            .unwrap_or("none");

        Some(RankedItem {
            item: BriefingItem {
                kind: BriefingItemKind::ReworkRisk,
                reference_id: record.work_order_id.clone(),
                summary: format!(
                    "{} rework risk {:.0} for work order {} (asset {}, {}): top factor {}",
                    band_label(assessment.band),
                    assessment.score,
                    record.work_order_id,
                    record.asset_id,
                    record.resolution_code,
                    top_factor
                ),
                rank: self.weights.risk * assessment.score / 100.0,
            },
            class,
            record_at: record.completed_at,
        })
    }

    fn knowledge_item(
        &self,
        record: &ComplaintRecord,
        assessment: &UrgencyAssessment,
    ) -> Result<Option<RankedItem>, ScoringFailure> {
        if assessment.matched_signals.is_empty() {
            return Ok(None);
        }

        self.metrics.inc_tool_invocation();
        let output = self
            .registry
            .invoke(
                KNOWLEDGE_LOOKUP_TOOL,
                json!({ "keywords": assessment.matched_signals }),
            )
            .map_err(|error| ScoringFailure {
                record_id: record.complaint_id.clone(),
                stage: FailureStage::KnowledgeLookup,
                message: error.to_string(),
            })?;

        let reply =
            serde_json::from_value::<KnowledgeLookupReply>(output).map_err(|error| {
                ScoringFailure {
                    record_id: record.complaint_id.clone(),
                    stage: FailureStage::KnowledgeLookup,
                    message: error.to_string(),
                }
            })?;

        let Some(best) = reply.matches.first() else {
            return Ok(None);
        };

        let titles = reply
            .matches
            .iter()
            .map(|hit| hit.title.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        Ok(Some(RankedItem {
            item: BriefingItem {
                kind: BriefingItemKind::KnowledgeNote,
                reference_id: record.complaint_id.clone(),
                summary: format!("Procedures for {}: {}", record.complaint_id, titles),
                rank: self.weights.knowledge * best.overlap,
            },
            class: 2,
            record_at: record.reported_at,
        }))
    }
}

fn tier_label(tier: UrgencyTier) -> &'static str {
    match tier {
        UrgencyTier::Critical => "CRITICAL",
        UrgencyTier::Elevated => "ELEVATED",
        UrgencyTier::Routine => "ROUTINE",
    }
}

fn band_label(band: RiskBand) -> &'static str {
    match band {
        RiskBand::High => "HIGH",
        RiskBand::Medium => "MEDIUM",
        RiskBand::Low => "LOW",
    }
}

/// Deduplicates by (kind, reference id), then orders by rank descending;
/// ties fall back to severity class, earlier record timestamp, and
/// reference id so rebuilding the same batch is reproducible.
fn rank_items(mut ranked: Vec<RankedItem>) -> Vec<BriefingItem> {
    ranked.sort_by(|a, b| {
        b.item
            .rank
            .partial_cmp(&a.item.rank)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.class.cmp(&b.class))
            .then_with(|| a.record_at.cmp(&b.record_at))
            .then_with(|| a.item.reference_id.cmp(&b.item.reference_id))
    });

    let mut seen = std::collections::HashSet::new();
    ranked
        .into_iter()
        .filter(|entry| seen.insert((entry.item.kind, entry.item.reference_id.clone())))
        .map(|entry| entry.item)
        .collect()
}
