use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Refill ticks per second; permits are spread across them
const TICKS_PER_SECOND: u64 = 100;

/// Splits a per-second rate into per-tick permit counts, carrying the
/// fractional remainder so that every second hands out exactly `rate`.
#[derive(Debug, Clone)]
pub(crate) struct TokenSchedule {
	rate: u64,
	remainder: u64,
}

impl TokenSchedule {
	pub(crate) const fn new(rate: u64) -> Self {
		Self { rate, remainder: 0 }
	}

	pub(crate) fn next_tokens(&mut self) -> usize {
		let (base, rem) = div_mod_u64(self.rate, TICKS_PER_SECOND);
		let (carry, new_rem) = div_mod_u64(self.remainder.saturating_add(rem), TICKS_PER_SECOND);
		self.remainder = new_rem;
		let tokens = base.saturating_add(carry);
		usize::try_from(tokens).unwrap_or(usize::MAX)
	}
}

/// Admits query attempts at a fixed ceiling shared by all workers.
///
/// Waiters queue on a FIFO semaphore, so no worker is starved. A zero
/// rate means unlimited and `acquire` never blocks.
pub struct RateLimiter {
	permits: Option<Arc<Semaphore>>,
	refill: Option<JoinHandle<()>>,
}

impl RateLimiter {
	/// Build a limiter for `rate` queries per second.
	///
	/// Must be called from within a tokio runtime when `rate > 0`.
	pub fn new(rate: u32) -> Self {
		if rate == 0 {
			return Self::unlimited();
		}
		let permits = Arc::new(Semaphore::new(0));
		let refill = spawn_refill(Arc::clone(&permits), u64::from(rate));
		Self {
			permits: Some(permits),
			refill: Some(refill),
		}
	}

	pub const fn unlimited() -> Self {
		Self {
			permits: None,
			refill: None,
		}
	}

	pub const fn is_limited(&self) -> bool {
		self.permits.is_some()
	}

	/// Wait until one more query may be sent.
	pub async fn acquire(&self) {
		let Some(permits) = &self.permits else {
			return;
		};
		// The semaphore is never closed while the limiter is alive
		if let Ok(permit) = permits.acquire().await {
			permit.forget();
		}
	}
}

impl Drop for RateLimiter {
	fn drop(&mut self) {
		if let Some(refill) = self.refill.take() {
			refill.abort();
		}
	}
}

fn spawn_refill(permits: Arc<Semaphore>, rate: u64) -> JoinHandle<()> {
	tokio::spawn(async move {
		let mut schedule = TokenSchedule::new(rate);
		let tick_len = Duration::from_secs(1) / TICKS_PER_SECOND as u32;
		let mut rate_tick = interval(tick_len);
		loop {
			rate_tick.tick().await;
			// Top up rather than add, so idle capacity is not banked
			let target = schedule.next_tokens();
			let available = permits.available_permits();
			if available < target {
				permits.add_permits(target.saturating_sub(available));
			}
		}
	})
}

fn div_mod_u64(value: u64, divisor: u64) -> (u64, u64) {
	if divisor == 0 {
		return (0, 0);
	}
	let div = value.checked_div(divisor).unwrap_or(0);
	let rem = value.checked_rem(divisor).unwrap_or(0);
	(div, rem)
}
