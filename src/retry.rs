//! Retry policy with exponential backoff
//!
//! Transient remote failures are retried under a policy: exponential
//! delays with jitter, capped attempts, and an explicit set of error
//! classes that qualify. A `RateLimited` response carrying a server
//! delay overrides the computed backoff.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::CancelToken;
use crate::error::{ErrorClass, SyncError};

/// Jitter applied to computed delays (fraction of the delay)
const JITTER_FRACTION: f64 = 0.2;

/// Backoff and attempt configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetryPolicy {
	/// Total attempts, the first one included
	pub max_attempts: u32,

	pub initial_delay_ms: u64,

	pub max_delay_ms: u64,

	pub multiplier: f64,

	/// Error classes that qualify for a retry
	pub retryable: Vec<ErrorClass>,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		RetryPolicy {
			max_attempts: 3,
			initial_delay_ms: 1000,
			max_delay_ms: 30_000,
			multiplier: 2.0,
			retryable: vec![
				ErrorClass::Transport,
				ErrorClass::RateLimited,
				ErrorClass::ServiceUnavailable,
			],
		}
	}
}

impl RetryPolicy {
	/// Whether the policy retries this error at all.
	pub fn retries(&self, error: &SyncError) -> bool {
		match error.class() {
			Some(class) => self.retryable.contains(&class),
			None => false,
		}
	}

	/// Backoff before retrying after the n-th failure (1-indexed),
	/// without jitter: `min(initial * multiplier^(n-1), max)`.
	pub fn delay_for(&self, failure: u32) -> Duration {
		let exp = self.multiplier.powi(failure.saturating_sub(1) as i32);
		let ms = (self.initial_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
		Duration::from_millis(ms as u64)
	}

	/// `delay_for` with +/-20% jitter applied.
	pub fn delay_with_jitter(&self, failure: u32) -> Duration {
		let base = self.delay_for(failure).as_millis() as f64;
		let factor = rand::thread_rng().gen_range(1.0 - JITTER_FRACTION..=1.0 + JITTER_FRACTION);
		Duration::from_millis((base * factor) as u64)
	}

	/// Run an async operation under this policy.
	///
	/// The closure is re-invoked for every attempt so it can rebuild any
	/// consumed streams. Non-retryable errors and the final failure are
	/// returned as-is; cancellation is honoured between attempts.
	pub async fn run<T, F, Fut>(&self, cancel: &CancelToken, mut op: F) -> Result<T, SyncError>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, SyncError>>,
	{
		let mut attempt: u32 = 1;
		loop {
			cancel.check()?;
			match op().await {
				Ok(value) => return Ok(value),
				Err(error) => {
					if !self.retries(&error) || attempt >= self.max_attempts.max(1) {
						return Err(error);
					}
					let delay = match error.retry_after_ms() {
						Some(ms) => Duration::from_millis(ms),
						None => self.delay_with_jitter(attempt),
					};
					warn!(
						attempt,
						max_attempts = self.max_attempts,
						delay_ms = delay.as_millis() as u64,
						error = %error,
						"retrying after transient failure"
					);
					tokio::time::sleep(delay).await;
					cancel.check()?;
					attempt += 1;
					debug!(attempt, "starting retry attempt");
				}
			}
		}
	}
}


// vim: ts=4
