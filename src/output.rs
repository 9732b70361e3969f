use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::bench::{RunOutcome, RunReport};
use crate::transport::RunConfig;

/// Log the run configuration before any worker starts.
pub fn print_config_summary(config: &RunConfig) {
	info!("Run dnsload with the following configuration");
	info!("Address: {}", config.address);
	info!("Connections count: {}", config.connections);
	info!("Query: {}", config.queries.describe());
	info!("Queries to send: {}", config.budget);
	info!("Query timeout: {} seconds", config.timeout.as_secs());
	if config.skip_verify {
		info!("TLS certificate verification is disabled");
	}
}

fn outcome_label(outcome: &RunOutcome) -> &'static str {
	match outcome {
		RunOutcome::Finished => "finished",
		RunOutcome::Interrupted => "interrupted",
		RunOutcome::Aborted(_) => "aborted",
	}
}

fn format_avg(avg: Option<Duration>) -> String {
	avg.map_or_else(|| "n/a".to_string(), |d| format!("{:?}", d))
}

/// Log the final report, one line per metric.
pub fn print_report(report: &RunReport) {
	let s = &report.snapshot;
	info!("The test results are:");
	info!("Elapsed: {:?}", s.elapsed);
	info!("Average QPS: {:.3}", s.qps);
	info!("Processed queries: {}", s.processed);
	info!("Average per query: {}", format_avg(s.avg_per_query));
	info!("Errors count: {}", s.errors);
	if !matches!(report.outcome, RunOutcome::Finished) {
		info!("Run {} with {} of {} queries never sent",
			outcome_label(&report.outcome),
			report.unclaimed,
			report.budget
		);
	}
}

/// Write the final report as a single CSV row.
pub fn write_csv(path: &Path, report: &RunReport) -> Result<()> {
	let mut writer = csv::Writer::from_path(path)?;

	writer.write_record([
		"outcome", "budget", "elapsed_secs", "qps",
		"processed", "errors", "avg_per_query_ms",
	])?;

	let s = &report.snapshot;
	writer.write_record([
		outcome_label(&report.outcome).to_string(),
		report.budget.to_string(),
		format!("{:.3}", s.elapsed.as_secs_f64()),
		format!("{:.3}", s.qps),
		s.processed.to_string(),
		s.errors.to_string(),
		s.avg_per_query
			.map(|d| format!("{:.3}", d.as_secs_f64() * 1000.0))
			.unwrap_or_default(),
	])?;

	writer.flush()?;
	info!("Report written to: {}", path.display());
	Ok(())
}
