//! Query complexity classification
//!
//! Pure heuristic scoring: word count, analytical vocabulary, multi-part
//! questions and clause density push a query up; an attached selection
//! pulls it down because it narrows the scope of the answer.

use serde::{Deserialize, Serialize};

use super::models::{ComplexityClass, Query};

const ANALYTICAL_TERMS: &[&str] = &[
    "analyze",
    "analyse",
    "analysis",
    "compare",
    "comparison",
    "contrast",
    "differ",
    "difference",
    "versus",
    "relationship",
    "significance",
    "evolve",
    "evolution",
    "interpret",
    "implication",
    "influence",
    "impact",
    "symbolism",
    "motivation",
    "why",
    "explain",
    "evaluate",
];

const CLAUSE_MARKERS: &[&str] = &[
    "and",
    "but",
    "while",
    "whereas",
    "however",
    "because",
    "although",
    "though",
    "whether",
    "than",
];

/// Classifier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Word counts at or below which the length signal scores 0, 1, 2
    pub word_thresholds: [usize; 3],
    /// Highest score still classified `simple`
    pub simple_max_score: u32,
    /// Highest score still classified `moderate`
    pub moderate_max_score: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            word_thresholds: [8, 20, 40],
            simple_max_score: 1,
            moderate_max_score: 3,
        }
    }
}

/// Signals extracted from a query, kept for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexitySignals {
    pub word_count: usize,
    pub analytical_terms: usize,
    pub question_marks: usize,
    pub clause_markers: usize,
    pub has_selection: bool,
    pub score: u32,
}

#[derive(Debug, Clone, Default)]
pub struct ComplexityClassifier {
    config: ClassifierConfig,
}

impl ComplexityClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Total and deterministic: never fails, no hidden state
    pub fn classify(&self, query: &Query) -> ComplexityClass {
        let signals = self.signals(query);
        if signals.score <= self.config.simple_max_score {
            ComplexityClass::Simple
        } else if signals.score <= self.config.moderate_max_score {
            ComplexityClass::Moderate
        } else {
            ComplexityClass::Complex
        }
    }

    pub fn signals(&self, query: &Query) -> ComplexitySignals {
        let words: Vec<String> = query
            .text
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();

        let word_count = words.len();
        let analytical_terms = words
            .iter()
            .filter(|w| ANALYTICAL_TERMS.iter().any(|t| w.starts_with(t)))
            .count();
        let clause_markers = words
            .iter()
            .filter(|w| CLAUSE_MARKERS.contains(&w.as_str()))
            .count()
            + query.text.matches(';').count();
        let question_marks = query.text.matches('?').count();
        let has_selection = query.selection().is_some();

        let [short, medium, long] = self.config.word_thresholds;
        let mut score: u32 = if word_count <= short {
            0
        } else if word_count <= medium {
            1
        } else if word_count <= long {
            2
        } else {
            3
        };
        score += analytical_terms.min(2) as u32;
        if question_marks > 1 {
            score += 1;
        }
        if clause_markers >= 2 {
            score += 1;
        }
        if has_selection {
            score = score.saturating_sub(1);
        }

        ComplexitySignals {
            word_count,
            analytical_terms,
            question_marks,
            clause_markers,
            has_selection,
            score,
        }
    }
}
