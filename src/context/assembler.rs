//! Bounded context assembly
//!
//! Section order is selection, passages in rank order, then history summary.
//! The selection is never cut; passages and history are elastic.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::{AssembledContext, Budget, ContextSection, RetrievedChunk, SectionKind};
use super::token_estimator::TokenEstimator;
use crate::metrics::METRICS;

const SECTION_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Largest share of the context budget the history summary may take
    pub history_share: f64,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self { history_share: 0.2 }
    }
}

/// Byte offsets just past each sentence terminator in `text`
fn sentence_ends(text: &str) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let mut end = idx + c.len_utf8();
        // Swallow runs like "?!" and closing quotes or brackets
        while let Some(&(next_idx, next)) = chars.peek() {
            if matches!(next, '.' | '!' | '?' | '"' | '\'' | ')' | '\u{201d}' | '\u{2019}') {
                end = next_idx + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        match chars.peek() {
            None => ends.push(end),
            Some(&(_, next)) if next.is_whitespace() => ends.push(end),
            _ => {}
        }
    }

    ends
}

/// Longest prefix of `text` that ends on a sentence boundary and fits in
/// `max_tokens`. `None` when not even the first sentence fits.
pub fn cut_at_sentence_boundary(
    text: &str,
    max_tokens: usize,
    estimator: &dyn TokenEstimator,
) -> Option<String> {
    if max_tokens == 0 {
        return None;
    }

    sentence_ends(text)
        .into_iter()
        .rev()
        .map(|end| text[..end].trim())
        .find(|prefix| !prefix.is_empty() && estimator.estimate(prefix) <= max_tokens)
        .map(str::to_string)
}

/// Merges selection, passages and history into one bounded context
pub struct ContextAssembler {
    config: AssemblerConfig,
    estimator: Arc<dyn TokenEstimator>,
}

impl ContextAssembler {
    pub fn new(config: AssemblerConfig, estimator: Arc<dyn TokenEstimator>) -> Self {
        Self { config, estimator }
    }

    /// Token cap for the history summary under `budget`
    pub fn history_cap(&self, budget: &Budget) -> usize {
        let share = self.config.history_share.clamp(0.0, 1.0);
        (budget.context_tokens as f64 * share).floor() as usize
    }

    pub fn assemble(
        &self,
        selection: Option<&str>,
        chunks: &[RetrievedChunk],
        history_summary: Option<&str>,
        budget: &Budget,
    ) -> AssembledContext {
        let selection = selection.filter(|s| !s.trim().is_empty());
        let requested = budget.context_tokens;

        let mut sections = Vec::new();
        let mut used = 0;

        if let Some(selection) = selection {
            let tokens = self.estimator.estimate(selection);
            if tokens > requested {
                warn!(
                    selection_tokens = tokens,
                    budget_tokens = requested,
                    "Selection exceeds context budget, widening"
                );
                sections.push(ContextSection {
                    kind: SectionKind::Selection,
                    source_id: None,
                    text: selection.to_string(),
                    token_count: tokens,
                    truncated: false,
                });
                return self.finish(sections, tokens, true, chunks.len());
            }
            used = tokens;
            sections.push(ContextSection {
                kind: SectionKind::Selection,
                source_id: None,
                text: selection.to_string(),
                token_count: tokens,
                truncated: false,
            });
        }

        // Reserve room for history before filling passages
        let history = history_summary
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .and_then(|h| {
                let cap = self.history_cap(budget).min(requested - used);
                self.fit(h, cap)
            });
        let history_tokens = history.as_ref().map_or(0, |s| s.token_count);

        let mut remaining = requested - used - history_tokens;
        let mut dropped = 0;

        for (idx, chunk) in chunks.iter().enumerate() {
            let tokens = self.estimator.estimate(&chunk.text);
            if tokens <= remaining {
                remaining -= tokens;
                sections.push(ContextSection {
                    kind: SectionKind::Passage,
                    source_id: Some(chunk.source_id.clone()),
                    text: chunk.text.clone(),
                    token_count: tokens,
                    truncated: false,
                });
                continue;
            }

            // First passage that does not fit: keep whole leading sentences
            if let Some(partial) = self.fit(&chunk.text, remaining) {
                sections.push(ContextSection {
                    source_id: Some(chunk.source_id.clone()),
                    kind: SectionKind::Passage,
                    ..partial
                });
                dropped = chunks.len() - idx - 1;
            } else {
                dropped = chunks.len() - idx;
            }
            break;
        }

        if let Some(history) = history {
            sections.push(history);
        }

        self.finish(sections, requested, false, dropped)
    }

    /// Section holding as much of `text` as fits in `max_tokens`
    fn fit(&self, text: &str, max_tokens: usize) -> Option<ContextSection> {
        let tokens = self.estimator.estimate(text);
        if tokens <= max_tokens {
            return Some(ContextSection {
                kind: SectionKind::History,
                source_id: None,
                text: text.to_string(),
                token_count: tokens,
                truncated: false,
            });
        }

        cut_at_sentence_boundary(text, max_tokens, self.estimator.as_ref()).map(|cut| {
            ContextSection {
                kind: SectionKind::History,
                source_id: None,
                token_count: self.estimator.estimate(&cut),
                text: cut,
                truncated: true,
            }
        })
    }

    /// Join sections and enforce the budget on the joined text
    fn finish(
        &self,
        mut sections: Vec<ContextSection>,
        budget_tokens: usize,
        overrun: bool,
        mut dropped_chunks: usize,
    ) -> AssembledContext {
        let mut text = join_sections(&sections);
        let mut token_count = self.estimator.estimate(&text);

        // Joining can tokenize differently from the parts; shed elastic tail
        while token_count > budget_tokens {
            let Some(pos) = sections.iter().rposition(|s| s.kind != SectionKind::Selection) else {
                break;
            };
            let removed = sections.remove(pos);
            if removed.kind == SectionKind::Passage {
                dropped_chunks += 1;
            }
            text = join_sections(&sections);
            token_count = self.estimator.estimate(&text);
        }

        METRICS.record_assembly(token_count, dropped_chunks, overrun);
        debug!(
            token_count,
            budget_tokens,
            sections = sections.len(),
            dropped_chunks,
            overrun,
            "Assembled context"
        );

        AssembledContext {
            text,
            token_count,
            sections,
            budget_tokens,
            overrun,
            dropped_chunks,
        }
    }
}

fn join_sections(sections: &[ContextSection]) -> String {
    sections
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::token_estimator::{TiktokenEstimator, WordBasedEstimator};

    /// Charges heavily for section separators so joined text outgrows its parts
    struct SeparatorHeavyEstimator;

    impl TokenEstimator for SeparatorHeavyEstimator {
        fn estimate(&self, text: &str) -> usize {
            text.split_whitespace().count() + 10 * text.matches(SECTION_SEPARATOR).count()
        }
    }

    fn assembler() -> ContextAssembler {
        ContextAssembler::new(
            AssemblerConfig::default(),
            Arc::new(WordBasedEstimator::default()),
        )
    }

    fn chunk(id: &str, text: &str, position: usize) -> RetrievedChunk {
        RetrievedChunk {
            source_id: id.to_string(),
            text: text.to_string(),
            relevance_score: 1.0,
            position,
            token_count: WordBasedEstimator::default().estimate(text),
        }
    }

    /// `n` words -> ceil(n * 1.3) tokens
    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_sentence_ends() {
        let text = "One. \"Two?\" Three... e.g.x four";
        let ends = sentence_ends(text);
        assert_eq!(&text[..ends[0]], "One.");
        assert_eq!(&text[..ends[1]], "One. \"Two?\"");
        assert_eq!(&text[..ends[2]], "One. \"Two?\" Three...");
        assert_eq!(ends.len(), 3);
    }

    #[test]
    fn test_cut_never_mid_sentence() {
        let estimator = WordBasedEstimator::default();
        let text = "First sentence here. Second sentence is longer than the first.";
        assert_eq!(
            cut_at_sentence_boundary(text, 6, &estimator).as_deref(),
            Some("First sentence here.")
        );
        assert_eq!(cut_at_sentence_boundary(text, 3, &estimator), None);
        assert_eq!(cut_at_sentence_boundary("no terminator", 100, &estimator), None);
    }

    #[test]
    fn test_selection_kept_verbatim() {
        let selection = "Call me Ishmael. Some years ago, never mind how long precisely, having little money in my purse.";
        assert!(selection.len() >= 90);
        let chunks = vec![chunk("c1", &words(20), 0), chunk("c2", &words(20), 500)];

        let context = assembler().assemble(Some(selection), &chunks, None, &Budget::new(3200, 850));

        assert!(context.contains_selection(selection));
        assert!(context.text.starts_with(selection));
        assert_eq!(context.passage_count(), 2);
        assert!(!context.overrun);
        assert!(context.token_count <= 3200);
    }

    #[test]
    fn test_lowest_ranked_chunks_dropped_first() {
        // 10 words -> 13 tokens each
        let chunks = vec![
            chunk("a", &words(10), 0),
            chunk("b", &words(10), 100),
            chunk("c", &words(10), 200),
        ];
        let context = assembler().assemble(None, &chunks, None, &Budget::new(30, 100));

        assert_eq!(context.passage_count(), 2);
        assert_eq!(context.sections[0].source_id.as_deref(), Some("a"));
        assert_eq!(context.sections[1].source_id.as_deref(), Some("b"));
        assert_eq!(context.dropped_chunks, 1);
        assert!(context.token_count <= 30);
    }

    #[test]
    fn test_partial_chunk_cut_at_sentence() {
        let chunks = vec![
            chunk("a", &words(10), 0),
            chunk("b", "Short one here. Then a much longer sentence follows it all the way.", 100),
        ];
        // 13 tokens for "a", 8 left: "Short one here." is 3 words -> 4 tokens
        let context = assembler().assemble(None, &chunks, None, &Budget::new(21, 100));

        assert_eq!(context.passage_count(), 2);
        let last = &context.sections[1];
        assert_eq!(last.text, "Short one here.");
        assert!(last.truncated);
        assert_eq!(context.dropped_chunks, 0);
    }

    #[test]
    fn test_selection_overrun_widens_budget() {
        let selection = words(40); // 52 tokens
        let chunks = vec![chunk("a", &words(5), 0)];
        let context =
            assembler().assemble(Some(&selection), &chunks, Some("Earlier we talked."), &Budget::new(20, 100));

        assert!(context.overrun);
        assert_eq!(context.token_count, 52);
        assert_eq!(context.budget_tokens, 52);
        assert_eq!(context.sections.len(), 1);
        assert_eq!(context.dropped_chunks, 1);
        assert_eq!(context.text, selection);
    }

    #[test]
    fn test_history_capped_by_share() {
        let history = "The reader asked about the whale. Then about the captain and his leg and the ship.";
        let chunks = vec![chunk("a", &words(50), 0)];
        // Cap is floor(100 * 0.2) = 20; whole history is 16 words -> 21 tokens
        let context = assembler().assemble(None, &chunks, Some(history), &Budget::new(100, 100));

        let last = context.sections.last().unwrap();
        assert_eq!(last.kind, SectionKind::History);
        assert_eq!(last.text, "The reader asked about the whale.");
        assert!(last.truncated);
        assert!(context.token_count <= 100);
    }

    #[test]
    fn test_invariant_over_many_budgets() {
        let assembler = assembler();
        let chunks: Vec<_> = (0..8)
            .map(|i| chunk(&format!("c{}", i), &format!("{}. {}.", words(3 + i), words(7)), i * 100))
            .collect();
        for budget in [0, 1, 5, 13, 40, 77, 150, 400] {
            let context = assembler.assemble(
                Some("A short selection."),
                &chunks,
                Some("History. More history here."),
                &Budget::new(budget, 0),
            );
            if context.overrun {
                assert_eq!(context.token_count, 4);
            } else {
                assert!(context.token_count <= budget, "budget {}", budget);
            }
        }
    }

    #[test]
    fn test_invariant_over_many_budgets_tiktoken() {
        let estimator: Arc<dyn TokenEstimator> = Arc::new(TiktokenEstimator::new().unwrap());
        let assembler = ContextAssembler::new(AssemblerConfig::default(), Arc::clone(&estimator));
        let selection = "\"Call me Ishmael,\" he said.";
        let chunks: Vec<_> = (0..8)
            .map(|i| {
                let text = format!(
                    "Passage {}: the whale's naïve wake; foam, spray! {}. Ahab's log, day {}?",
                    i,
                    words(2 + i),
                    i * 7
                );
                RetrievedChunk {
                    source_id: format!("c{}", i),
                    token_count: estimator.estimate(&text),
                    text,
                    relevance_score: 1.0,
                    position: i * 100,
                }
            })
            .collect();

        for budget in (0..=240).step_by(3) {
            let context = assembler.assemble(
                Some(selection),
                &chunks,
                Some("They spoke of the sea.\nThen of the ship's crew."),
                &Budget::new(budget, 0),
            );
            if context.overrun {
                assert_eq!(context.text, selection);
                assert_eq!(context.token_count, estimator.estimate(selection));
            } else {
                assert!(context.token_count <= budget, "budget {}", budget);
                assert_eq!(context.token_count, estimator.estimate(&context.text));
            }
        }
    }

    #[test]
    fn test_joined_overrun_sheds_tail_sections() {
        let assembler = ContextAssembler::new(AssemblerConfig::default(), Arc::new(SeparatorHeavyEstimator));
        let chunks = vec![chunk("a", &words(5), 0), chunk("b", &words(5), 100)];

        // Parts fit (2 + 5 + 5), but each separator costs 10 once joined
        let context = assembler.assemble(Some("Alpha beta."), &chunks, None, &Budget::new(20, 0));

        assert!(!context.overrun);
        assert_eq!(context.passage_count(), 1);
        assert_eq!(context.sections[1].source_id.as_deref(), Some("a"));
        assert_eq!(context.dropped_chunks, 1);
        assert_eq!(context.token_count, 17);
    }

    #[test]
    fn test_empty_inputs() {
        let context = assembler().assemble(None, &[], None, &Budget::new(100, 0));
        assert!(context.text.is_empty());
        assert_eq!(context.token_count, 0);
        assert!(context.sections.is_empty());
    }
}
