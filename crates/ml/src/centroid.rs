use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use qguard_core::{normalize, UrgencyTier};
use serde::Deserialize;

use crate::fallback::l2_normalize;
use crate::{EmbeddingModel, SeverityEstimate, SeverityModel};

#[derive(Debug, Deserialize)]
struct LabeledNarrative {
    text: String,
    tier: String,
}

/// Severity model built from labeled narratives: one embedding centroid
/// per tier, queries scored against the nearest centroid.
#[derive(Clone)]
pub struct CentroidSeverityModel {
    model_name: &'static str,
    centroids: Vec<(UrgencyTier, Vec<f32>)>,
    embedder: Arc<dyn EmbeddingModel>,
}

impl CentroidSeverityModel {
    pub fn from_jsonl(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingModel>,
        model_name: &'static str,
    ) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "failed reading severity training dataset at {}",
                path.as_ref().display()
            )
        })?;

        let mut by_tier: HashMap<UrgencyTier, Vec<Vec<f32>>> = HashMap::new();
        for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
            let example: LabeledNarrative =
                serde_json::from_str(line).context("invalid jsonl training line")?;
            if let Some(tier) = parse_tier(&example.tier) {
                let tokens = normalize("training", &example.text).tokens;
                by_tier.entry(tier).or_default().push(embedder.embed(&tokens));
            }
        }

        let mut centroids = Vec::new();
        for (tier, vectors) in by_tier {
            if !vectors.is_empty() {
                centroids.push((tier, centroid(&vectors)));
            }
        }
        centroids.sort_by_key(|(tier, _)| *tier as u8);

        if centroids.is_empty() {
            anyhow::bail!("training dataset produced zero tier centroids");
        }

        Ok(Self {
            model_name,
            centroids,
            embedder,
        })
    }
}

impl SeverityModel for CentroidSeverityModel {
    fn estimate(&self, tokens: &[String]) -> SeverityEstimate {
        let query = self.embedder.embed(tokens);
        let mut best_tier = UrgencyTier::Routine;
        let mut best_score = -1.0_f32;

        for (tier, center) in &self.centroids {
            let score = cosine_similarity(&query, center);
            if score > best_score {
                best_score = score;
                best_tier = *tier;
            }
        }

        let similarity = f64::from((best_score + 1.0) / 2.0).clamp(0.0, 1.0);
        SeverityEstimate {
            severity: tier_base(best_tier) * similarity,
            model: self.model_name,
        }
    }
}

fn parse_tier(value: &str) -> Option<UrgencyTier> {
    match value.trim().to_lowercase().as_str() {
        "critical" => Some(UrgencyTier::Critical),
        "elevated" => Some(UrgencyTier::Elevated),
        "routine" => Some(UrgencyTier::Routine),
        _ => None,
    }
}

fn tier_base(tier: UrgencyTier) -> f64 {
    match tier {
        UrgencyTier::Critical => 0.95,
        UrgencyTier::Elevated => 0.55,
        UrgencyTier::Routine => 0.15,
    }
}

fn centroid(vectors: &[Vec<f32>]) -> Vec<f32> {
    let dims = vectors.first().map(Vec::len).unwrap_or(0);
    let mut acc = vec![0.0_f32; dims];

    for vector in vectors {
        for (idx, value) in vector.iter().enumerate() {
            acc[idx] += value;
        }
    }

    for value in &mut acc {
        *value /= vectors.len() as f32;
    }
    l2_normalize(&mut acc);
    acc
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut a_norm = 0.0;
    let mut b_norm = 0.0;
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        dot += lhs * rhs;
        a_norm += lhs * lhs;
        b_norm += rhs * rhs;
    }

    if a_norm == 0.0 || b_norm == 0.0 {
        0.0
    } else {
        dot / (a_norm.sqrt() * b_norm.sqrt())
    }
}
