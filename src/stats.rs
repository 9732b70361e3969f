use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

/// Emit a progress report every this many recorded outcomes
pub const REPORT_EVERY: u64 = 100;

/// Counters guarded by the RunState mutex
#[derive(Debug)]
struct Counters {
	remaining: u64,
	processed: u64,
	errors: u64,
	last_report_at: Instant,
	last_report_processed: u64,
	last_report_errors: u64,
}

/// Rolling progress computed over the window since the previous report
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
	pub processed: u64,
	pub errors: u64,
	/// Outcomes recorded in this window
	pub window_queries: u64,
	pub window_elapsed: Duration,
	/// Window queries divided by window elapsed time
	pub qps: f64,
}

/// Aggregate view of the run at one point in time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSnapshot {
	pub elapsed: Duration,
	pub processed: u64,
	pub errors: u64,
	/// Elapsed time divided by processed queries, None before the first success
	pub avg_per_query: Option<Duration>,
	/// All outcomes divided by elapsed seconds
	pub qps: f64,
}

/// Shared run state: remaining budget, outcome counters, and the last
/// progress report. Every operation takes the same lock, so readers
/// always see a consistent snapshot.
#[derive(Debug)]
pub struct RunState {
	started_at: Instant,
	budget: u64,
	counters: Mutex<Counters>,
}

impl RunState {
	pub fn new(budget: u64) -> Self {
		let started_at = Instant::now();
		Self {
			started_at,
			budget,
			counters: Mutex::new(Counters {
				remaining: budget,
				processed: 0,
				errors: 0,
				last_report_at: started_at,
				last_report_processed: 0,
				last_report_errors: 0,
			}),
		}
	}

	pub const fn budget(&self) -> u64 {
		self.budget
	}

	fn lock(&self) -> MutexGuard<'_, Counters> {
		self.counters.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Reserve one unit of budget.
	///
	/// Returns the remaining budget after the claim, or None when nothing
	/// is left, in which case the caller must not send a query.
	pub fn claim_one(&self) -> Option<u64> {
		let mut counters = self.lock();
		if counters.remaining == 0 {
			return None;
		}
		counters.remaining -= 1;
		Some(counters.remaining)
	}

	pub fn remaining(&self) -> u64 {
		self.lock().remaining
	}

	/// Record a completed round trip. Returns the progress report if this
	/// outcome closed a reporting window.
	pub fn record_success(&self) -> Option<Progress> {
		let mut counters = self.lock();
		counters.processed += 1;
		maybe_report(&mut counters)
	}

	/// Record a failed query. Returns the progress report if this outcome
	/// closed a reporting window.
	pub fn record_error(&self) -> Option<Progress> {
		let mut counters = self.lock();
		counters.errors += 1;
		maybe_report(&mut counters)
	}

	pub fn snapshot(&self) -> RunSnapshot {
		let counters = self.lock();
		let elapsed = self.started_at.elapsed();
		let total = counters.processed + counters.errors;
		let secs = elapsed.as_secs_f64();
		let qps = if secs > 0.0 { total as f64 / secs } else { 0.0 };
		let avg_per_query = average_per_query(elapsed, counters.processed);

		RunSnapshot {
			elapsed,
			processed: counters.processed,
			errors: counters.errors,
			avg_per_query,
			qps,
		}
	}
}

/// Elapsed time divided by `processed`, or None when nothing succeeded.
pub fn average_per_query(elapsed: Duration, processed: u64) -> Option<Duration> {
	if processed == 0 {
		return None;
	}
	let nanos = elapsed.as_nanos() / u128::from(processed);
	Some(Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX)))
}

/// Close the reporting window if enough outcomes arrived since the last
/// one. Must be called with the counters lock held.
fn maybe_report(counters: &mut Counters) -> Option<Progress> {
	let window_queries = (counters.processed + counters.errors)
		- (counters.last_report_processed + counters.last_report_errors);
	if window_queries < REPORT_EVERY {
		return None;
	}

	let now = Instant::now();
	let window_elapsed = now.duration_since(counters.last_report_at);
	let secs = window_elapsed.as_secs_f64();
	let qps = if secs > 0.0 { window_queries as f64 / secs } else { 0.0 };

	let progress = Progress {
		processed: counters.processed,
		errors: counters.errors,
		window_queries,
		window_elapsed,
		qps,
	};
	info!("Processed {} queries, errors: {}", progress.processed, progress.errors);
	info!("Queries per second: {:.3}", progress.qps);
	debug!(window = progress.window_queries, elapsed = ?progress.window_elapsed, "progress window closed");

	counters.last_report_at = now;
	counters.last_report_processed = counters.processed;
	counters.last_report_errors = counters.errors;

	Some(progress)
}
