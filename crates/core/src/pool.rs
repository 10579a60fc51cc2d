//! Bounded worker pool for locator calls.
//!
//! Each call runs on its own task once a permit is available, so a slow
//! backend never stalls the caller's scheduler thread. A caller that stops
//! waiting does not abort the job: it runs to completion and then releases
//! its permit.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use crate::error::{BotError, Result};

/// Default number of concurrent locator calls per session.
pub const DEFAULT_WORKERS: usize = 2;

#[derive(Clone, Debug)]
pub struct WorkerPool {
	permits: Arc<Semaphore>,
	size: usize,
}

impl WorkerPool {
	pub fn new(size: usize) -> Self {
		let size = size.max(1);
		Self {
			permits: Arc::new(Semaphore::new(size)),
			size,
		}
	}

	pub fn size(&self) -> usize {
		self.size
	}

	/// Permits not currently held by a running job.
	pub fn available(&self) -> usize {
		self.permits.available_permits()
	}

	/// Runs `job` on the pool and waits for its result.
	pub async fn run<F, T>(&self, job: F) -> Result<T>
	where
		F: Future<Output = Result<T>> + Send + 'static,
		T: Send + 'static,
	{
		let permit = Arc::clone(&self.permits)
			.acquire_owned()
			.await
			.map_err(|_| BotError::Backend("worker pool closed".into()))?;

		let task = tokio::spawn(async move {
			let _permit = permit;
			job.await
		});

		match task.await {
			Ok(result) => result,
			Err(err) if err.is_panic() => {
				warn!(target = "meetbot.session", "locator task panicked");
				Err(BotError::Backend("locator task panicked".into()))
			}
			Err(_) => Err(BotError::Cancelled),
		}
	}
}

impl Default for WorkerPool {
	fn default() -> Self {
		Self::new(DEFAULT_WORKERS)
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use super::*;

	#[tokio::test]
	async fn zero_sized_pool_still_runs_jobs() {
		let pool = WorkerPool::new(0);
		assert_eq!(pool.size(), 1);
		assert_eq!(pool.run(async { Ok(7) }).await.unwrap(), 7);
	}

	#[tokio::test]
	async fn job_errors_pass_through() {
		let pool = WorkerPool::default();
		let err = pool
			.run(async { Err::<(), _>(BotError::Backend("boom".into())) })
			.await
			.unwrap_err();
		assert!(matches!(err, BotError::Backend(msg) if msg == "boom"));
	}

	#[tokio::test]
	async fn panics_become_backend_errors() {
		let pool = WorkerPool::default();
		let crash = std::hint::black_box(true);
		let err = pool
			.run(async move {
				if crash {
					panic!("driver crashed");
				}
				Ok(())
			})
			.await
			.unwrap_err();
		assert!(matches!(err, BotError::Backend(_)));
		assert_eq!(pool.available(), pool.size());
	}

	#[tokio::test(start_paused = true)]
	async fn dropped_caller_lets_job_finish_before_releasing_permit() {
		let pool = WorkerPool::new(1);
		let slow = pool.run(async {
			tokio::time::sleep(Duration::from_secs(5)).await;
			Ok(())
		});
		let _ = tokio::time::timeout(Duration::from_secs(1), slow).await;
		assert_eq!(pool.available(), 0);

		tokio::time::sleep(Duration::from_secs(5)).await;
		assert_eq!(pool.available(), 1);
	}
}
