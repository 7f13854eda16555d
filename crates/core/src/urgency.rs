use std::collections::HashMap;

use crate::lexicon::SignalLexicon;
use crate::models::{NormalizedText, UrgencyTier};

pub const CRITICAL_THRESHOLD: f64 = 0.75;
pub const ELEVATED_THRESHOLD: f64 = 0.40;
pub const OVERRIDE_CONFIDENCE_FLOOR: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalClass {
    Override,
    Weighted,
}

/// Result of scanning a normalized narrative against the signal lexicon.
#[derive(Debug, Clone)]
pub struct SignalScan {
    pub override_hit: bool,
    /// Sum of distinct matched weighted-signal weights, clamped to 1.0.
    pub confidence: f64,
    /// Matched phrases in first-occurrence order, deduplicated.
    pub matched: Vec<String>,
}

/// Scan unigrams and bigrams against the lexicon. A bigram match consumes
/// both tokens so its constituents are not counted again.
pub fn scan_signals(text: &NormalizedText, lexicon: &SignalLexicon) -> SignalScan {
    let mut classes: HashMap<&str, (SignalClass, f64)> = HashMap::new();
    for signal in &lexicon.weighted {
        classes.insert(signal.phrase.as_str(), (SignalClass::Weighted, signal.weight));
    }
    for phrase in &lexicon.overrides {
        classes.insert(phrase.as_str(), (SignalClass::Override, 0.0));
    }

    let tokens = &text.tokens;
    let mut matched: Vec<String> = Vec::new();
    let mut override_hit = false;
    let mut weight_sum = 0.0;
    let mut index = 0;

    while index < tokens.len() {
        let bigram = if index + 1 < tokens.len() {
            Some(format!("{} {}", tokens[index], tokens[index + 1]))
        } else {
            None
        };

        let (phrase, advance) = match bigram {
            Some(candidate) if classes.contains_key(candidate.as_str()) => (candidate, 2),
            _ => (tokens[index].clone(), 1),
        };

        if let Some(&(class, weight)) = classes.get(phrase.as_str()) {
            if !matched.iter().any(|seen| *seen == phrase) {
                match class {
                    SignalClass::Override => override_hit = true,
                    SignalClass::Weighted => weight_sum += weight,
                }
                matched.push(phrase);
            }
            index += advance;
        } else {
            index += 1;
        }
    }

    SignalScan {
        override_hit,
        confidence: weight_sum.min(1.0),
        matched,
    }
}

/// Tier from effective confidence. Boundary ties round up; an override
/// wins regardless of the confidence arithmetic.
pub fn tier_for(confidence: f64, override_hit: bool) -> UrgencyTier {
    if override_hit || confidence >= CRITICAL_THRESHOLD {
        UrgencyTier::Critical
    } else if confidence >= ELEVATED_THRESHOLD {
        UrgencyTier::Elevated
    } else {
        UrgencyTier::Routine
    }
}
