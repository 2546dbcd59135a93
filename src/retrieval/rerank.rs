//! Reranking, span deduplication and budget packing

use std::collections::HashSet;

use crate::context::models::RetrievedChunk;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "him", "his", "how", "its", "who", "did", "does", "what", "when",
    "where", "which", "why", "with", "this", "that", "these", "those", "from", "they", "them",
    "then", "than", "there", "their", "into", "about", "would", "could", "should", "have",
    "been", "were", "will", "your", "she",
];

/// Lowercased content terms: alphanumeric runs longer than two characters,
/// stopwords removed
pub fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Share of query terms that occur verbatim in `text`, in [0, 1]
pub fn lexical_overlap(query_terms: &HashSet<String>, text: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let text_terms = terms(text);
    let matched = query_terms.iter().filter(|t| text_terms.contains(*t)).count();
    matched as f32 / query_terms.len() as f32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RerankWeights {
    pub semantic: f32,
    pub lexical: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            semantic: 0.85,
            lexical: 0.15,
        }
    }
}

/// Rescore by semantic similarity plus lexical boost and sort best first.
///
/// `relevance_score` on input is the raw similarity; on output it is the
/// combined score. Ties break on source and position so order is stable.
pub fn rerank(query: &str, mut chunks: Vec<RetrievedChunk>, weights: RerankWeights) -> Vec<RetrievedChunk> {
    let query_terms = terms(query);

    for chunk in &mut chunks {
        let similarity = if chunk.relevance_score.is_finite() {
            chunk.relevance_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        chunk.relevance_score =
            weights.semantic * similarity + weights.lexical * lexical_overlap(&query_terms, &chunk.text);
    }

    chunks.sort_by(|a, b| {
        b.relevance_score
            .total_cmp(&a.relevance_score)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.position.cmp(&b.position))
    });
    chunks
}

/// Drop chunks that overlap a better-ranked chunk of the same source, or
/// repeat its text exactly
pub fn dedupe(chunks: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
    let mut kept: Vec<RetrievedChunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let duplicate = kept
            .iter()
            .any(|k| k.overlaps(&chunk) || k.text.trim() == chunk.text.trim());
        if !duplicate {
            kept.push(chunk);
        }
    }
    kept
}

/// Take chunks in rank order until the next one would exceed `budget`.
///
/// Chunks are never split here. Returns the packed chunks and how many were
/// left out.
pub fn pack_within_budget(chunks: Vec<RetrievedChunk>, budget: usize) -> (Vec<RetrievedChunk>, usize) {
    let total = chunks.len();
    let mut used = 0;
    let mut packed = Vec::new();

    for chunk in chunks {
        if used + chunk.token_count > budget {
            break;
        }
        used += chunk.token_count;
        packed.push(chunk);
    }

    let dropped = total - packed.len();
    (packed, dropped)
}
