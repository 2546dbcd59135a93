//! Running optimization statistics

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::metrics::METRICS;

/// Source label for scores predicted at budget time
pub const PREDICTED: &str = "predicted";
/// Source label for scores measured after the answer was produced
pub const MEASURED: &str = "measured";

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub total_queries: u64,
    pub avg_quality: f64,
}

/// Body of `GET /api/v1/stats`: one stream per score source
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    /// One entry per completed budget calculation
    #[serde(flatten)]
    pub predicted: OptimizationStats,
    /// Retrospective scores from the external scorer
    pub outcomes: OptimizationStats,
}

/// Online mean of quality scores.
///
/// Count and mean move together inside one critical section so concurrent
/// `record` calls never lose an increment.
#[derive(Debug)]
pub struct OptimizationStatsRecorder {
    source: &'static str,
    state: Mutex<OptimizationStats>,
}

impl Default for OptimizationStatsRecorder {
    fn default() -> Self {
        Self::for_source(PREDICTED)
    }
}

impl OptimizationStatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_source(source: &'static str) -> Self {
        Self {
            source,
            state: Mutex::new(OptimizationStats::default()),
        }
    }

    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Non-finite scores are ignored; others are clamped to [0, 1]
    pub fn record(&self, quality_score: f64) -> OptimizationStats {
        if !quality_score.is_finite() {
            return self.snapshot();
        }
        let score = quality_score.clamp(0.0, 1.0);

        let updated = {
            let mut state = self.state.lock();
            state.total_queries += 1;
            state.avg_quality += (score - state.avg_quality) / state.total_queries as f64;
            *state
        };

        METRICS.record_quality_score(self.source, updated.avg_quality);
        updated
    }

    pub fn snapshot(&self) -> OptimizationStats {
        *self.state.lock()
    }
}
