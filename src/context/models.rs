//! Data models for context budgeting

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ContextError, Result};

/// Longest message accepted for a single chat turn
pub const MAX_QUERY_CHARS: usize = 4_000;

/// A single chat turn against a book
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_text: Option<String>,
    pub book_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_idx: Option<u32>,
}

impl Query {
    pub fn new(text: impl Into<String>, book_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selection_text: None,
            book_id: book_id.into(),
            chapter_idx: None,
        }
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        let selection = selection.into();
        self.selection_text = if selection.trim().is_empty() {
            None
        } else {
            Some(selection)
        };
        self
    }

    pub fn with_chapter(mut self, chapter_idx: u32) -> Self {
        self.chapter_idx = Some(chapter_idx);
        self
    }

    /// Selection text if present and not blank
    pub fn selection(&self) -> Option<&str> {
        self.selection_text
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    /// Reject malformed queries instead of coercing them
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(ContextError::Validation("Message cannot be empty".to_string()));
        }
        if self.text.chars().count() > MAX_QUERY_CHARS {
            return Err(ContextError::Validation(format!(
                "Message exceeds {} characters",
                MAX_QUERY_CHARS
            )));
        }
        if self.book_id.trim().is_empty() {
            return Err(ContextError::Validation("Book id cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Linguistic complexity bucket of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityClass {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl fmt::Display for ComplexityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named policy trading context for cost savings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetStrategy {
    Conservative,
    Balanced,
    Aggressive,
    Adaptive,
}

impl Default for BudgetStrategy {
    fn default() -> Self {
        Self::Balanced
    }
}

impl BudgetStrategy {
    /// Concrete strategies, least to most aggressive
    pub const CONCRETE: [BudgetStrategy; 3] = [Self::Conservative, Self::Balanced, Self::Aggressive];

    /// Every strategy, in report order
    pub const ALL: [BudgetStrategy; 4] = [
        Self::Conservative,
        Self::Balanced,
        Self::Aggressive,
        Self::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conservative => "conservative",
            Self::Balanced => "balanced",
            Self::Aggressive => "aggressive",
            Self::Adaptive => "adaptive",
        }
    }

    /// Resolve `adaptive` against a complexity class; concrete strategies map to themselves.
    ///
    /// Aggressive allocation is only safe where quality headroom is largest.
    pub fn resolve(self, complexity: ComplexityClass) -> BudgetStrategy {
        match self {
            Self::Adaptive => match complexity {
                ComplexityClass::Simple => Self::Aggressive,
                ComplexityClass::Moderate => Self::Balanced,
                ComplexityClass::Complex => Self::Conservative,
            },
            concrete => concrete,
        }
    }
}

impl fmt::Display for BudgetStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BudgetStrategy {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(Self::Conservative),
            "balanced" => Ok(Self::Balanced),
            "aggressive" => Ok(Self::Aggressive),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(ContextError::InvalidStrategy(s.to_string())),
        }
    }
}

/// Token split between model input context and response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Budget {
    pub context_tokens: usize,
    pub response_tokens: usize,
}

impl Budget {
    pub fn new(context_tokens: usize, response_tokens: usize) -> Self {
        Self {
            context_tokens,
            response_tokens,
        }
    }

    pub fn total(&self) -> usize {
        self.context_tokens + self.response_tokens
    }

    /// Clamp so that context + response never exceeds the model ceiling.
    ///
    /// The response share is kept first; context absorbs the cut.
    pub fn clamped(self, model_max_tokens: usize) -> Self {
        let response_tokens = self.response_tokens.min(model_max_tokens);
        let context_tokens = self
            .context_tokens
            .min(model_max_tokens - response_tokens);
        Self {
            context_tokens,
            response_tokens,
        }
    }
}

/// Go/no-go decision attached to a computed budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    /// Apply the budget
    Proceed,
    /// Apply the budget and monitor closely
    Reduce,
    /// Fall back to the unconstrained baseline context
    Skip,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proceed => "proceed",
            Self::Reduce => "reduce",
            Self::Skip => "skip",
        }
    }

    pub fn applies_budget(&self) -> bool {
        !matches!(self, Self::Skip)
    }
}

/// Outcome of one budget calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetOptimizationResult {
    pub budget: Budget,
    pub recommendation: Recommendation,
    /// Predicted relative quality degradation in [0, 1]
    pub quality_impact: f64,
    /// Concrete strategy applied (never `adaptive`)
    pub strategy_used: BudgetStrategy,
    pub complexity: ComplexityClass,
}

/// Passage returned by retrieval, ranked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub source_id: String,
    pub text: String,
    pub relevance_score: f32,
    /// Character offset of the passage within its source
    pub position: usize,
    pub token_count: usize,
}

impl RetrievedChunk {
    /// Character span `[position, position + len)` within the source.
    /// `position` comes from the index unchecked, so the end saturates.
    pub fn span(&self) -> (usize, usize) {
        (self.position, self.position.saturating_add(self.text.chars().count()))
    }

    /// Same source and intersecting spans
    pub fn overlaps(&self, other: &RetrievedChunk) -> bool {
        if self.source_id != other.source_id {
            return false;
        }
        let (a_start, a_end) = self.span();
        let (b_start, b_end) = other.span();
        a_start < b_end && b_start < a_end
    }
}

/// Kind of a section in the assembled context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Selection,
    Passage,
    History,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextSection {
    pub kind: SectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub text: String,
    pub token_count: usize,
    /// Cut at a sentence boundary to fit
    pub truncated: bool,
}

/// Bounded prompt context handed to the language model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssembledContext {
    pub text: String,
    pub token_count: usize,
    pub sections: Vec<ContextSection>,
    /// Context budget actually enforced; wider than requested on overrun
    pub budget_tokens: usize,
    /// Selection alone exceeded the requested budget
    pub overrun: bool,
    pub dropped_chunks: usize,
}

impl AssembledContext {
    pub fn contains_selection(&self, selection: &str) -> bool {
        self.sections
            .iter()
            .any(|s| s.kind == SectionKind::Selection && s.text == selection)
    }

    pub fn passage_count(&self) -> usize {
        self.sections
            .iter()
            .filter(|s| s.kind == SectionKind::Passage)
            .count()
    }
}
