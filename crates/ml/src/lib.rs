mod centroid;
mod fallback;

use std::env;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use qguard_core::urgency::{scan_signals, tier_for, OVERRIDE_CONFIDENCE_FLOOR};
use qguard_core::{normalize, ComplaintRecord, SignalLexicon, UrgencyAssessment};

pub use centroid::CentroidSeverityModel;
pub use fallback::HashEmbedder;

pub const DEFAULT_DATASET_PATH: &str = "kb/training/severity_samples.jsonl";
pub const DATASET_ENV_VAR: &str = "QGUARD_SEVERITY_DATASET";
const EMBEDDING_DIMS: usize = 192;

pub trait EmbeddingModel: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn embed(&self, tokens: &[String]) -> Vec<f32>;
}

#[derive(Debug, Clone)]
pub struct SeverityEstimate {
    /// In [0, 1]; higher means more urgent.
    pub severity: f64,
    pub model: &'static str,
}

/// Optional statistical backend for urgency scoring. Availability is a
/// capability decided at startup, not an error path.
pub trait SeverityModel: Send + Sync {
    fn estimate(&self, tokens: &[String]) -> SeverityEstimate;
}

/// Urgency classifier: rule-based signal scan plus an optional statistical
/// backend. When the backend is unavailable assessments are produced
/// rule-only and flagged as degraded.
#[derive(Clone)]
pub struct UrgencyClassifier {
    lexicon: SignalLexicon,
    model: Option<Arc<dyn SeverityModel>>,
}

impl UrgencyClassifier {
    pub fn new(lexicon: SignalLexicon, model: Option<Arc<dyn SeverityModel>>) -> Self {
        Self { lexicon, model }
    }

    /// Builds the default classifier: builtin lexicon plus the centroid
    /// backend when its training dataset is readable, rule-only otherwise.
    pub fn load_default(lexicon: SignalLexicon) -> Self {
        let dataset_path =
            env::var(DATASET_ENV_VAR).unwrap_or_else(|_| DEFAULT_DATASET_PATH.to_string());

        let model: Option<Arc<dyn SeverityModel>> = if Path::new(&dataset_path).exists() {
            let embedder = Arc::new(HashEmbedder::new(EMBEDDING_DIMS));
            CentroidSeverityModel::from_jsonl(&dataset_path, embedder, "centroid-severity")
                .ok()
                .map(|model| Arc::new(model) as Arc<dyn SeverityModel>)
        } else {
            None
        };

        Self::new(lexicon, model)
    }

    pub fn is_degraded(&self) -> bool {
        self.model.is_none()
    }

    pub fn assess(&self, record: &ComplaintRecord) -> UrgencyAssessment {
        let normalized = normalize(&record.complaint_id, &record.narrative);
        let scan = scan_signals(&normalized, &self.lexicon);

        let mut confidence = scan.confidence;
        let degraded = match &self.model {
            Some(model) => {
                let estimate = model.estimate(&normalized.tokens);
                confidence = confidence.max(estimate.severity.clamp(0.0, 1.0));
                false
            }
            None => true,
        };

        if scan.override_hit {
            confidence = confidence.max(OVERRIDE_CONFIDENCE_FLOOR);
        }

        UrgencyAssessment {
            complaint_id: record.complaint_id.clone(),
            tier: tier_for(confidence, scan.override_hit),
            confidence,
            matched_signals: scan.matched,
            degraded,
            assessed_at: Utc::now(),
        }
    }
}
