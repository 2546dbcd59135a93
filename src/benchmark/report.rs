//! Comparison report and its output sinks

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

use crate::context::models::ComplexityClass;
use crate::error::{ContextError, Result};
use crate::quality::{QualitySummary, ScenarioAggregate, StrategyAggregate};

/// Identity of one benchmark invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
}

impl RunInfo {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
        }
    }
}

impl Default for RunInfo {
    fn default() -> Self {
        Self::new()
    }
}

/// Baseline vs optimized comparison across the scenario × strategy matrix.
///
/// Everything but `run` is a function of the seed and the code, so two
/// unstamped reports from the same seed serialize byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Set by `stamped`; absent from seeded output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunInfo>,
    pub seed: u64,
    pub runs_per_scenario: usize,
    /// Scenario name to classified complexity, in scenario order
    pub scenarios: IndexMap<String, ComplexityClass>,
    /// One row per (strategy, scenario)
    pub cells: Vec<ScenarioAggregate>,
    /// Keyed by strategy name, in strategy order
    pub strategies: IndexMap<String, StrategyAggregate>,
    pub summary: QualitySummary,
}

impl ComparisonReport {
    /// Attach a fresh run id and timestamp
    pub fn stamped(mut self) -> Self {
        self.run = Some(RunInfo::new());
        self
    }

    pub fn cell(&self, scenario: &str, strategy: &str) -> Option<&ScenarioAggregate> {
        self.cells
            .iter()
            .find(|c| c.scenario == scenario && c.strategy.as_str() == strategy)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| ContextError::Report(e.to_string()))
    }

    /// Plain-text table for terminals
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<14} {:<22} {:>10} {:>10} {:>10}",
            "strategy", "scenario", "tokens %", "quality %", "latency %"
        );
        for cell in &self.cells {
            let _ = writeln!(
                out,
                "{:<14} {:<22} {:>10.2} {:>10.2} {:>10.2}",
                cell.strategy.as_str(),
                cell.scenario,
                -cell.token_reduction_pct,
                -cell.quality_impact_pct,
                cell.latency_change_pct
            );
        }
        let _ = writeln!(out);
        for (name, agg) in &self.strategies {
            let _ = writeln!(
                out,
                "{:<14} {:<22} {:>10.2} {:>10.2} {:>10.2}",
                name, "(average)", -agg.token_reduction_pct, -agg.quality_impact_pct, agg.latency_change_pct
            );
        }

        let s = &self.summary;
        let verdict = |passed: bool| if passed { "PASS" } else { "FAIL" };
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "token reduction {:.2}% (>= {:.0}%): {}",
            s.token_reduction_pct,
            s.thresholds.min_token_reduction_pct,
            verdict(s.token_reduction_passed)
        );
        let _ = writeln!(
            out,
            "quality impact  {:.2}% (<= {:.0}%): {}",
            s.quality_impact_pct,
            s.thresholds.max_quality_impact_pct,
            verdict(s.quality_impact_passed)
        );
        let _ = writeln!(
            out,
            "latency change  {:.2}% (within {:.0}%): {}",
            s.latency_change_pct,
            s.thresholds.max_latency_change_pct,
            verdict(s.latency_change_passed)
        );
        let _ = writeln!(out, "overall: {}", verdict(s.passed));
        out
    }
}

/// Destination for comparison reports
pub trait ReportSink: Send + Sync {
    fn write_report(&self, report: &ComparisonReport) -> Result<()>;
}

/// Writes pretty JSON to a file, creating parent directories
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportSink for FileSink {
    fn write_report(&self, report: &ComparisonReport) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ContextError::Report(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(&self.path, report.to_json_pretty()?)
            .map_err(|e| ContextError::Report(format!("{}: {}", self.path.display(), e)))?;

        info!(
            path = %self.path.display(),
            run_id = ?report.run.as_ref().map(|r| r.run_id),
            "Comparison report written"
        );
        Ok(())
    }
}

/// Writes pretty JSON to any writer (stdout, a buffer, ...)
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> ReportSink for WriterSink<W> {
    fn write_report(&self, report: &ComparisonReport) -> Result<()> {
        let json = report.to_json_pretty()?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)
            .and_then(|_| writer.flush())
            .map_err(|e| ContextError::Report(e.to_string()))
    }
}

/// Keeps reports in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<ComparisonReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ComparisonReport> {
        self.reports.lock().clone()
    }
}

impl ReportSink for MemorySink {
    fn write_report(&self, report: &ComparisonReport) -> Result<()> {
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::models::BudgetStrategy;
    use crate::quality::{aggregate_scenario, aggregate_strategy, summarize, AcceptanceThresholds, RunSample};

    fn report() -> ComparisonReport {
        let sample = RunSample {
            baseline_tokens: 5000,
            optimized_tokens: 4050,
            baseline_quality: 0.85,
            optimized_quality: 0.83,
            baseline_latency_ms: 2200.0,
            optimized_latency_ms: 2170.0,
        };
        let cells = vec![aggregate_scenario("main_theme", BudgetStrategy::Balanced, &[sample])];
        let balanced = aggregate_strategy(BudgetStrategy::Balanced, &cells);
        let summary = summarize(&[balanced.clone()], AcceptanceThresholds::default());

        let mut scenarios = IndexMap::new();
        scenarios.insert("main_theme".to_string(), ComplexityClass::Simple);
        let mut strategies = IndexMap::new();
        strategies.insert("balanced".to_string(), balanced);

        ComparisonReport {
            run: None,
            seed: 7,
            runs_per_scenario: 1,
            scenarios,
            cells,
            strategies,
            summary,
        }
    }

    #[test]
    fn test_writer_sink_emits_json() {
        let sink = WriterSink::new(Vec::new());
        sink.write_report(&report()).unwrap();
        let written = String::from_utf8(sink.into_inner()).unwrap();

        let parsed: ComparisonReport = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(parsed.seed, 7);
        assert_eq!(parsed.cells.len(), 1);
        assert!(written.contains("\"token_reduction_pct\""));
    }

    #[test]
    fn test_stamp_only_in_stamped_output() {
        let plain = report().to_json_pretty().unwrap();
        assert!(!plain.contains("run_id"));
        assert!(!plain.contains("generated_at"));

        let stamped = report().stamped();
        let json = stamped.to_json_pretty().unwrap();
        assert!(json.contains("run_id"));
        let parsed: ComparisonReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.run, stamped.run);
    }

    #[test]
    fn test_memory_sink_collects() {
        let sink = MemorySink::new();
        sink.write_report(&report()).unwrap();
        sink.write_report(&report()).unwrap();
        assert_eq!(sink.reports().len(), 2);
    }

    #[test]
    fn test_file_sink_creates_parents() {
        let dir = std::env::temp_dir().join(format!("context-budget-{}", Uuid::new_v4()));
        let path = dir.join("nested").join("report.json");
        let sink = FileSink::new(&path);

        sink.write_report(&report()).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("main_theme"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_table_has_verdict() {
        let table = report().render_table();
        assert!(table.contains("main_theme"));
        assert!(table.contains("overall: PASS"));
        assert!(report().cell("main_theme", "balanced").is_some());
    }
}
