use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A weighted urgency signal. Phrases are stored normalized: lowercase,
/// one or two tokens, space separated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedSignal {
    pub phrase: String,
    pub weight: f64,
}

/// Signal lexicon for urgency classification, kept as data so tables can
/// be versioned and swapped without touching scoring logic.
///
/// Override signals force tier Critical regardless of the weighted sum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalLexicon {
    pub version: String,
    pub overrides: Vec<String>,
    pub weighted: Vec<WeightedSignal>,
}

impl SignalLexicon {
    pub fn builtin() -> Self {
        Self {
            version: "v1".to_string(),
            overrides: [
                "gas",
                "gas leak",
                "fire",
                "smoke",
                "carbon monoxide",
                "collapse",
                "ceiling collapse",
                "wall collapse",
                "no heat",
                "frozen",
                "pipes frozen",
                "elevator stuck",
                "exposed wiring",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            weighted: [
                ("hot water", 0.55),
                ("no electricity", 0.55),
                ("flood", 0.50),
                ("mold", 0.45),
                ("infestation", 0.45),
                ("broken lock", 0.45),
                ("leak", 0.40),
                ("water damage", 0.35),
                ("broken window", 0.30),
                ("pest", 0.30),
                ("asbestos", 0.60),
                ("sewage", 0.55),
            ]
            .into_iter()
            .map(|(phrase, weight)| WeightedSignal {
                phrase: phrase.to_string(),
                weight,
            })
            .collect(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed reading signal lexicon at {}", path.as_ref().display()))?;
        serde_json::from_str(&raw).context("invalid signal lexicon json")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionWeight {
    pub code: String,
    pub points: f64,
}

/// Resolution-type factor table for rework scoring. Temporary fixes score
/// high, full replacements low; unknown codes fall back to
/// `default_points` instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionTable {
    pub version: String,
    pub entries: Vec<ResolutionWeight>,
    pub default_points: f64,
}

impl ResolutionTable {
    pub fn builtin() -> Self {
        Self {
            version: "v1".to_string(),
            entries: [
                ("temporary_patch", 25.0),
                ("reset", 20.0),
                ("adjustment", 18.0),
                ("blockage_cleared", 16.0),
                ("partial_repair", 15.0),
                ("component_replace", 8.0),
                ("system_overhaul", 4.0),
                ("full_replacement", 2.0),
            ]
            .into_iter()
            .map(|(code, points)| ResolutionWeight {
                code: code.to_string(),
                points,
            })
            .collect(),
            default_points: 12.0,
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("failed reading resolution table at {}", path.as_ref().display())
        })?;
        serde_json::from_str(&raw).context("invalid resolution table json")
    }

    pub fn points_for(&self, code: &str) -> f64 {
        let needle = code.trim().to_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.code == needle)
            .map(|entry| entry.points)
            .unwrap_or(self.default_points)
    }
}
