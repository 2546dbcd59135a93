//! Baseline vs optimized comparison over the fixed scenario set
//!
//! Usage: budget-benchmark [output-path]
//!
//! Writes the JSON report, stamped with a run id, to `output-path` (or
//! stdout) and the summary table to stderr. Exits non-zero when the acceptance thresholds are not met.

use anyhow::Context as _;
use std::sync::Arc;

use context_budget::app;
use context_budget::benchmark::{
    default_scenarios, BenchmarkConfig, BenchmarkHarness, FileSink, ReportSink, WriterSink,
};
use context_budget::config::Config;
use context_budget::context::WordBasedEstimator;
use context_budget::logging;

fn main() -> anyhow::Result<()> {
    let mut config = Config::load(None).context("failed to load configuration")?;
    logging::init_tracing(&config.logging)?;

    // Every strategy in the matrix is requested explicitly; aggressive mode
    // is enabled so adaptive may resolve to it as well
    config.toggles.enable_aggressive_mode = true;
    config.toggles.enable_context_budget = true;
    config.toggles.enable_quality_monitoring = false;

    let optimizer = app::build_optimizer(&config, Arc::new(WordBasedEstimator::default()))?;
    let harness = BenchmarkHarness::new(Arc::new(optimizer), default_scenarios(), BenchmarkConfig::default());

    let sink: Box<dyn ReportSink> = match std::env::args().nth(1) {
        Some(path) => Box::new(FileSink::new(path)),
        None => Box::new(WriterSink::new(std::io::stdout())),
    };
    let report = harness.run()?.stamped();
    sink.write_report(&report)?;

    eprintln!("{}", report.render_table());
    anyhow::ensure!(report.summary.passed, "acceptance thresholds not met");
    Ok(())
}
