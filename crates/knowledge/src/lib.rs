mod chunking;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use qguard_core::normalize;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

pub use chunking::chunk_procedure;

pub const DEFAULT_MATCH_LIMIT: usize = 3;
const SNIPPET_MAX_CHARS: usize = 420;
const EXCERPT_MAX_CHARS: usize = 220;

/// One operating-procedure snippet of the fixed corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcedureSnippet {
    pub snippet_id: String,
    pub title: String,
    pub body: String,
    pub source_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeMatch {
    pub snippet_id: String,
    pub title: String,
    pub excerpt: String,
    pub source_path: String,
    /// Fraction of the query keywords found in the snippet, in (0, 1].
    pub overlap: f64,
}

#[derive(Debug, Clone)]
struct IndexedSnippet {
    snippet: ProcedureSnippet,
    tokens: HashSet<String>,
    body_lower: String,
}

/// Fixed, versioned corpus of operating-procedure snippets. Loaded once at
/// startup; lookups are read-only and side-effect free.
#[derive(Debug, Clone)]
pub struct KnowledgeCorpus {
    version: String,
    snippets: Vec<IndexedSnippet>,
}

impl KnowledgeCorpus {
    /// Loads every markdown document under `root`, in path order so corpus
    /// insertion order (the tie-breaker) is stable across runs.
    pub fn from_dir(root: impl AsRef<Path>, version: &str) -> Result<Self> {
        let heading_regex = Regex::new(r"(?m)^#\s+(.+)$").expect("valid heading regex");
        let root = root.as_ref();

        let mut snippets = Vec::new();
        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("md"))
        {
            let path = entry.path();
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("failed reading procedure document: {}", path.display()))?;

            let rel_path = path
                .strip_prefix(root)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| path.to_string_lossy().to_string());

            let title = heading_regex
                .captures(&body)
                .and_then(|captures| captures.get(1).map(|m| m.as_str().trim().to_string()))
                .unwrap_or_else(|| {
                    path.file_stem()
                        .and_then(|stem| stem.to_str())
                        .unwrap_or("untitled")
                        .replace('-', " ")
                });

            for (idx, chunk) in chunk_procedure(&body, SNIPPET_MAX_CHARS).into_iter().enumerate() {
                snippets.push(ProcedureSnippet {
                    snippet_id: format!("{}::{}", rel_path.replace('/', "::"), idx),
                    title: title.clone(),
                    body: chunk,
                    source_path: rel_path.clone(),
                });
            }
        }

        Ok(Self::from_snippets(version, snippets))
    }

    pub fn from_snippets(version: &str, snippets: Vec<ProcedureSnippet>) -> Self {
        let indexed = snippets
            .into_iter()
            .map(|snippet| {
                let tokens = normalize(&snippet.snippet_id, &snippet.body)
                    .tokens
                    .into_iter()
                    .collect::<HashSet<_>>();
                let body_lower = snippet.body.to_lowercase();
                IndexedSnippet {
                    snippet,
                    tokens,
                    body_lower,
                }
            })
            .collect();

        Self {
            version: version.to_string(),
            snippets: indexed,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Exact-token and substring matching of keywords against the corpus.
    /// Returns at most `limit` highest-overlap matches; ties keep corpus
    /// insertion order. An empty keyword set returns an empty result.
    pub fn lookup(&self, keywords: &[String], limit: usize) -> Vec<KnowledgeMatch> {
        let needles = keywords
            .iter()
            .map(|keyword| keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect::<Vec<_>>();
        if needles.is_empty() {
            return Vec::new();
        }

        let mut scored = self
            .snippets
            .iter()
            .map(|indexed| {
                let hits = needles
                    .iter()
                    .filter(|needle| {
                        indexed.tokens.contains(needle.as_str())
                            || indexed.body_lower.contains(needle.as_str())
                    })
                    .count();
                (hits as f64 / needles.len() as f64, indexed)
            })
            .filter(|(overlap, _)| *overlap > 0.0)
            .collect::<Vec<_>>();

        // Stable sort keeps insertion order for equal overlap.
        scored.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(limit)
            .map(|(overlap, indexed)| KnowledgeMatch {
                snippet_id: indexed.snippet.snippet_id.clone(),
                title: indexed.snippet.title.clone(),
                excerpt: excerpt(&indexed.snippet.body, EXCERPT_MAX_CHARS),
                source_path: indexed.snippet.source_path.clone(),
                overlap,
            })
            .collect()
    }
}

fn excerpt(input: &str, max_chars: usize) -> String {
    let compact = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= max_chars {
        compact
    } else {
        compact.chars().take(max_chars).collect::<String>() + "..."
    }
}
