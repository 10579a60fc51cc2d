//! Bounded polling with cancellation.

use std::future::Future;
use std::time::Duration;

use meetbot_protocol::Target;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BotError, Result};

/// Attempt budget of a bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub attempts: u32,
	pub interval: Duration,
}

impl RetryPolicy {
	pub fn new(attempts: u32, interval: Duration) -> Self {
		Self { attempts, interval }
	}

	/// The budget carried by `target`.
	pub fn for_target(target: &Target) -> Self {
		Self::new(target.attempts, target.interval())
	}

	/// A single lookup with no pause.
	pub fn once() -> Self {
		Self::new(1, Duration::ZERO)
	}
}

/// Sleeps for `duration` unless `cancel` fires first.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
	tokio::select! {
		_ = cancel.cancelled() => Err(BotError::Cancelled),
		_ = tokio::time::sleep(duration) => Ok(()),
	}
}

/// Calls `attempt` until it yields a value or the budget runs out.
///
/// `Ok(None)` counts as a miss, as do soft and backend errors, which are
/// usually a page mid-navigation. Cancellation and surface loss end the wait
/// immediately. An attempt that is already running is never interrupted:
/// cancellation is observed before each attempt and during the pause between
/// attempts. No pause follows the final miss.
pub async fn poll_until<T, F, Fut>(what: &str, policy: RetryPolicy, cancel: &CancellationToken, mut attempt: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<T>>>,
{
	let attempts = policy.attempts.max(1);
	for n in 1..=attempts {
		if cancel.is_cancelled() {
			return Err(BotError::Cancelled);
		}

		match attempt().await {
			Ok(Some(value)) => return Ok(value),
			Ok(None) => {}
			Err(err) if err.is_terminal() => return Err(err),
			Err(err) => debug!(target = "meetbot.session", target_name = what, attempt = n, error = %err, "lookup attempt failed"),
		}

		if n < attempts {
			sleep_or_cancel(policy.interval, cancel).await?;
		}
	}

	Err(BotError::TimedOut {
		target: what.to_string(),
		attempts,
	})
}
