use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Open,
    Closed,
}

/// A municipal service complaint as delivered by the ingestion collaborator.
/// Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ComplaintRecord {
    pub complaint_id: String,
    pub narrative: String,
    pub category: String,
    pub reported_at: DateTime<Utc>,
    pub location_id: String,
    pub status: ComplaintStatus,
}

/// Token representation of one complaint narrative. Owned by the scoring
/// call that produced it and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub record_id: String,
    pub tokens: Vec<String>,
}

impl NormalizedText {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyTier {
    Critical,
    Elevated,
    Routine,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UrgencyAssessment {
    pub complaint_id: String,
    pub tier: UrgencyTier,
    /// In [0, 1]; monotone in the matched weighted signals.
    pub confidence: f64,
    /// First-occurrence order, deduplicated.
    pub matched_signals: Vec<String>,
    /// True when the statistical backend was unavailable and only
    /// rule-based scoring applied.
    pub degraded: bool,
    pub assessed_at: DateTime<Utc>,
}

/// A completed maintenance work order as delivered by the ingestion
/// collaborator. Immutable once ingested.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkOrderRecord {
    pub work_order_id: String,
    pub asset_id: String,
    pub asset_age_months: u32,
    pub resolution_code: String,
    pub contractor_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_score(score: f64) -> Self {
        if score > 66.0 {
            Self::High
        } else if score >= 34.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RiskFactor {
    pub name: String,
    pub points: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReworkRiskAssessment {
    pub work_order_id: String,
    /// In [0, 100]; equals the sum of factor points exactly.
    pub score: f64,
    pub factors: Vec<RiskFactor>,
    pub band: RiskBand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefingItemKind {
    UrgentComplaint,
    ReworkRisk,
    KnowledgeNote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BriefingItem {
    pub kind: BriefingItemKind,
    pub reference_id: String,
    pub summary: String,
    pub rank: f64,
}

/// Time window a briefing covers. `since` is inclusive, `until` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchWindow {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl BatchWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.since && at < self.until
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Briefing {
    pub briefing_id: String,
    pub generated_at: DateTime<Utc>,
    pub window: BatchWindow,
    pub items: Vec<BriefingItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_thresholds() {
        assert_eq!(RiskBand::from_score(0.0), RiskBand::Low);
        assert_eq!(RiskBand::from_score(33.9), RiskBand::Low);
        assert_eq!(RiskBand::from_score(34.0), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(66.0), RiskBand::Medium);
        assert_eq!(RiskBand::from_score(66.1), RiskBand::High);
        assert_eq!(RiskBand::from_score(100.0), RiskBand::High);
    }

    #[test]
    fn window_bounds_are_half_open() {
        let window = BatchWindow {
            since: "2025-06-01T00:00:00Z".parse().unwrap(),
            until: "2025-06-02T00:00:00Z".parse().unwrap(),
        };
        assert!(window.contains(window.since));
        assert!(!window.contains(window.until));
    }
}
