use std::collections::HashSet;

use once_cell::sync::Lazy;
use unicode_segmentation::UnicodeSegmentation;

use crate::models::NormalizedText;

// Negators ("no", "not") are kept on purpose: signal bigrams like
// "no heat" depend on them.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "had",
        "has", "have", "he", "her", "his", "i", "in", "is", "it", "its", "my", "of", "on", "or",
        "our", "she", "since", "that", "the", "their", "there", "they", "this", "to", "was", "we",
        "were", "with", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Lowercase, strip punctuation at word boundaries, drop stopwords.
/// Total over any string input; the empty string yields no tokens.
pub fn normalize(record_id: &str, text: &str) -> NormalizedText {
    let tokens = text
        .unicode_words()
        .map(str::to_lowercase)
        .filter(|token| !STOPWORDS.contains(token.as_str()))
        .collect();

    NormalizedText {
        record_id: record_id.to_string(),
        tokens,
    }
}
