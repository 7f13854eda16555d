use crate::lexicon::ResolutionTable;
use crate::models::{ReworkRiskAssessment, RiskBand, RiskFactor, WorkOrderRecord};

pub const AGE_FACTOR_CAP: f64 = 30.0;
pub const AGE_CAP_MONTHS: u32 = 180;
pub const RESOLUTION_FACTOR_CAP: f64 = 40.0;
pub const CONTRACTOR_FACTOR_CAP: f64 = 30.0;
pub const NO_HISTORY_POINTS: f64 = 15.0;

/// Rule-based rework risk model. Pure function of the work order plus the
/// already-resolved contractor history; performs no I/O of its own.
#[derive(Debug, Clone)]
pub struct ReworkRiskScorer {
    table: ResolutionTable,
}

impl ReworkRiskScorer {
    pub fn new(table: ResolutionTable) -> Self {
        Self { table }
    }

    pub fn builtin() -> Self {
        Self::new(ResolutionTable::builtin())
    }

    pub fn table(&self) -> &ResolutionTable {
        &self.table
    }

    /// `contractor_rate` is the contractor's historical rework rate in
    /// [0, 1]; `None` means no history and contributes a neutral default
    /// rather than zero, so missing data is not rewarded.
    pub fn score(
        &self,
        order: &WorkOrderRecord,
        contractor_rate: Option<f64>,
    ) -> ReworkRiskAssessment {
        let age_points =
            AGE_FACTOR_CAP * f64::from(order.asset_age_months.min(AGE_CAP_MONTHS)) / f64::from(AGE_CAP_MONTHS);

        let resolution_points = self
            .table
            .points_for(&order.resolution_code)
            .clamp(0.0, RESOLUTION_FACTOR_CAP);

        let contractor_points = match contractor_rate {
            Some(rate) => rate.clamp(0.0, 1.0) * CONTRACTOR_FACTOR_CAP,
            None => NO_HISTORY_POINTS,
        };

        let factors = vec![
            RiskFactor {
                name: "asset_age".to_string(),
                points: age_points,
            },
            RiskFactor {
                name: "resolution_type".to_string(),
                points: resolution_points,
            },
            RiskFactor {
                name: "contractor_history".to_string(),
                points: contractor_points,
            },
        ];

        // Each factor is individually capped, so the sum already sits in
        // [0, 100] and the score equals the factor sum exactly.
        let score: f64 = factors.iter().map(|factor| factor.points).sum();

        ReworkRiskAssessment {
            work_order_id: order.work_order_id.clone(),
            score,
            factors,
            band: RiskBand::from_score(score),
        }
    }
}
