//! Named benchmark scenarios

use serde::{Deserialize, Serialize};

use crate::context::models::Query;

/// Runs per (scenario, strategy) cell
pub const SCENARIO_RUNS: usize = 5;

pub const BENCHMARK_BOOK_ID: &str = "benchmark-book";

/// 120-character passage used by the selection scenario
pub const SELECTION_PASSAGE: &str = "Call me Ishmael. Some years ago, never mind how long precisely, \
having little money in my purse, I thought I would sail.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkScenario {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub selection: Option<String>,
    #[serde(default)]
    pub chapter_idx: Option<u32>,
}

impl BenchmarkScenario {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
            selection: None,
            chapter_idx: None,
        }
    }

    pub fn with_selection(mut self, selection: &str) -> Self {
        self.selection = Some(selection.to_string());
        self
    }

    pub fn with_chapter(mut self, chapter_idx: u32) -> Self {
        self.chapter_idx = Some(chapter_idx);
        self
    }

    pub fn query(&self) -> Query {
        let mut query = Query::new(self.message.clone(), BENCHMARK_BOOK_ID);
        if let Some(selection) = &self.selection {
            query = query.with_selection(selection.clone());
        }
        if let Some(chapter_idx) = self.chapter_idx {
            query = query.with_chapter(chapter_idx);
        }
        query
    }
}

/// Fixed scenario set the rollout report is computed from
pub fn default_scenarios() -> Vec<BenchmarkScenario> {
    vec![
        BenchmarkScenario::new("main_theme", "What is the main theme?"),
        BenchmarkScenario::new("narrator", "Who is the narrator here?").with_chapter(1),
        BenchmarkScenario::new(
            "sister_relationship",
            "How does the relationship between the two sisters change over the novel?",
        ),
        BenchmarkScenario::new(
            "weather_imagery",
            "Compare how the author uses weather imagery in the opening chapters with the final \
             chapters, and explain why the tone shifts so sharply; what does this contrast suggest \
             about the narrator's reliability, and how should a reader interpret the ending in \
             light of it?",
        ),
        BenchmarkScenario::new("selected_passage", "What does the narrator mean here?")
            .with_selection(SELECTION_PASSAGE)
            .with_chapter(1),
    ]
}
