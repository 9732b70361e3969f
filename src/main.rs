mod bench;
mod cli;
mod dns;
mod domains;
mod error;
mod logging;
mod output;
mod rate;
mod resolver;
mod shutdown;
mod stats;
mod transport;
mod upstream;

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use crate::cli::Cli;
use crate::domains::QuerySource;
use crate::transport::RunConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	logging::init_logging(cli.verbose, cli.output.as_deref())
		.context("cannot create a log file")?;

	let queries = match &cli.queries_file {
		Some(path) => QuerySource::from_file(path)?,
		None => QuerySource::single(&cli.query)?,
	};

	let config = RunConfig {
		address: cli.address.clone(),
		connections: cli.parallel,
		queries,
		timeout: Duration::from_secs(cli.timeout),
		budget: cli.count,
		rate: cli.rate,
		skip_verify: cli.insecure,
	};

	output::print_config_summary(&config);

	let report = bench::run(&config, shutdown::wait_for_signal())
		.await
		.with_context(|| format!("The server address {} is invalid", config.address))?;

	output::print_report(&report);

	if let Some(path) = &cli.csv {
		output::write_csv(path, &report)?;
	}

	report.outcome.into_result().context("the test has been aborted")?;
	Ok(())
}
