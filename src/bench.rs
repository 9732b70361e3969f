use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::domains::QuerySource;
use crate::error::{BenchError, UpstreamError};
use crate::rate::RateLimiter;
use crate::stats::{RunSnapshot, RunState};
use crate::transport::RunConfig;
use crate::upstream::{self, Connector, Upstream};

/// Consecutive failed reconnects before a worker gives up
const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Delay before the second reconnect attempt; doubles after each failure
const RECONNECT_BACKOFF: Duration = Duration::from_millis(100);
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
	/// Every worker reached Done
	Finished,
	/// The external cancellation signal fired first
	Interrupted,
	/// A worker could not make its initial connection.
	///
	/// The report is still produced, but the upstream never became
	/// reachable, so this counts as a setup failure and the process exits
	/// non-zero just like an invalid address.
	Aborted(BenchError),
}

impl RunOutcome {
	/// Process result for this outcome: finished and interrupted runs
	/// succeed, an aborted run fails with its cause.
	pub fn into_result(self) -> Result<(), BenchError> {
		match self {
			RunOutcome::Finished | RunOutcome::Interrupted => Ok(()),
			RunOutcome::Aborted(err) => Err(err),
		}
	}
}

/// Final state of a run, read once after it ends
#[derive(Debug)]
pub struct RunReport {
	pub outcome: RunOutcome,
	pub budget: u64,
	/// Budget never claimed by any worker
	pub unclaimed: u64,
	pub snapshot: RunSnapshot,
}

/// Per-worker totals, logged when the worker exits
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerSummary {
	pub worker: usize,
	pub queries: u64,
	pub reconnects: u64,
}

enum Phase {
	Connecting,
	Querying(Box<dyn Upstream>),
	Recovering { attempt: u32 },
	Done,
}

/// One concurrent unit driving one upstream connection
struct Worker {
	id: usize,
	connector: Arc<dyn Connector>,
	state: Arc<RunState>,
	limiter: Arc<RateLimiter>,
	queries: QuerySource,
}

impl Worker {
	async fn run(mut self) -> Result<WorkerSummary, BenchError> {
		let mut summary = WorkerSummary {
			worker: self.id,
			..WorkerSummary::default()
		};
		let mut phase = Phase::Connecting;

		loop {
			phase = match phase {
				Phase::Connecting => match self.connector.connect().await {
					Ok(upstream) => Phase::Querying(upstream),
					Err(source) => {
						return Err(BenchError::InitialConnect {
							worker: self.id,
							source,
						});
					}
				},
				Phase::Querying(upstream) => self.query_once(upstream, &mut summary).await,
				Phase::Recovering { attempt } => match self.connector.connect().await {
					Ok(upstream) => {
						summary.reconnects += 1;
						Phase::Querying(upstream)
					}
					Err(e) => self.reconnect_failed(attempt + 1, &e).await,
				},
				Phase::Done => return Ok(summary),
			};
		}
	}

	async fn query_once(&mut self, mut upstream: Box<dyn Upstream>, summary: &mut WorkerSummary) -> Phase {
		if self.state.claim_one().is_none() {
			return Phase::Done;
		}

		self.limiter.acquire().await;
		let name = self.queries.next_name();
		summary.queries += 1;

		match upstream.exchange(name).await {
			Ok(response) => {
				trace!(
					worker = self.id,
					rcode = %response.rcode,
					answers = response.answer_count,
					"response received"
				);
				self.state.record_success();
				Phase::Querying(upstream)
			}
			Err(e) => {
				self.state.record_error();
				debug!(worker = self.id, error = %e, "error occurred");
				// The failed handle is dropped here and replaced
				Phase::Recovering { attempt: 0 }
			}
		}
	}

	async fn reconnect_failed(&self, attempt: u32, err: &UpstreamError) -> Phase {
		if attempt >= MAX_RECONNECT_ATTEMPTS {
			warn!(worker = self.id, attempts = attempt, error = %err, "giving up on reconnecting");
			return Phase::Done;
		}
		let delay = reconnect_backoff(attempt);
		warn!(worker = self.id, attempt, error = %err, "reconnect failed, retrying in {:?}", delay);
		tokio::time::sleep(delay).await;
		Phase::Recovering { attempt }
	}
}

fn reconnect_backoff(attempt: u32) -> Duration {
	let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
	RECONNECT_BACKOFF.saturating_mul(factor).min(MAX_RECONNECT_BACKOFF)
}

/// Pre-flight the upstream address, then run the benchmark against it.
///
/// Fails only when the address cannot be turned into a connector; every
/// other ending, including interruption, produces a report.
pub async fn run<F>(config: &RunConfig, shutdown: F) -> Result<RunReport, UpstreamError>
where
	F: Future<Output = ()>,
{
	let connector = upstream::resolve(&config.address, config.upstream_options())?;
	debug!(upstream = %connector.addr(), protocol = %connector.addr().protocol, "upstream resolved");
	Ok(run_with_connector(config, Arc::new(connector), shutdown).await)
}

/// Spawn one worker per connection and wait for all of them, or for
/// `shutdown`, whichever comes first.
///
/// On interruption or abort the remaining workers are detached and keep
/// running until they finish or the process exits.
pub async fn run_with_connector<F>(
	config: &RunConfig,
	connector: Arc<dyn Connector>,
	shutdown: F,
) -> RunReport
where
	F: Future<Output = ()>,
{
	let state = Arc::new(RunState::new(config.budget));
	let limiter = Arc::new(RateLimiter::new(config.rate));
	if limiter.is_limited() {
		info!("Rate limit: {} queries per second", config.rate);
	}

	info!(
		"Starting the test and running {} connections in parallel",
		config.connections
	);

	let mut workers = JoinSet::new();
	for id in 0..config.connections {
		let worker = Worker {
			id,
			connector: Arc::clone(&connector),
			state: Arc::clone(&state),
			limiter: Arc::clone(&limiter),
			queries: config.queries.for_worker(id),
		};
		workers.spawn(worker.run());
	}

	let outcome = tokio::select! {
		outcome = join_workers(&mut workers) => outcome,
		() = shutdown => RunOutcome::Interrupted,
	};

	match &outcome {
		RunOutcome::Finished => info!("The test has finished."),
		RunOutcome::Interrupted => info!("The test has been interrupted."),
		RunOutcome::Aborted(e) => error!("The test has been aborted: {}", e),
	}
	workers.detach_all();

	RunReport {
		outcome,
		budget: state.budget(),
		unclaimed: state.remaining(),
		snapshot: state.snapshot(),
	}
}

async fn join_workers(workers: &mut JoinSet<Result<WorkerSummary, BenchError>>) -> RunOutcome {
	while let Some(joined) = workers.join_next().await {
		match joined {
			Ok(Ok(summary)) => {
				debug!(
					worker = summary.worker,
					queries = summary.queries,
					reconnects = summary.reconnects,
					"worker finished"
				);
			}
			Ok(Err(e)) => return RunOutcome::Aborted(e),
			Err(e) => warn!("worker task failed: {}", e),
		}
	}
	info!("Finished running all connections");
	RunOutcome::Finished
}
