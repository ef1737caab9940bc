//!
//! # Scheduler
//!
//! Small named pools that run self-rescheduling background tasks.
//!
//! Each scheduled task waits a delay, runs once, then waits again, so two runs of the same task
//! never overlap and the number of pending timers equals the number of scheduled tasks. A pool
//! bounds how many task runs execute at the same time with a fixed amount of workers.
//!
//! Every task gets its own [`TaskHandle`]. Canceling it lets an in-flight run finish but stops
//! the task from rescheduling itself. Shutting down the pool stops everything, in-flight runs
//! included.
//!
//! ## Basic example
//!
//! ```
//! use registry_scheduler::{Repeat, Scheduler};
//! use std::{
//! 	sync::{
//! 		atomic::{AtomicUsize, Ordering},
//! 		Arc,
//! 	},
//! 	time::Duration,
//! };
//!
//! struct Tick(Arc<AtomicUsize>);
//!
//! #[async_trait::async_trait]
//! impl Repeat for Tick {
//! 	async fn run(&self) {
//! 		self.0.fetch_add(1, Ordering::Relaxed);
//! 	}
//! }
//!
//! #[tokio::main]
//! async fn main() {
//! 	let scheduler = Scheduler::new("example", 1);
//! 	let ticks = Arc::new(AtomicUsize::new(0));
//!
//! 	let handle = scheduler
//! 		.schedule_with_fixed_delay(
//! 			Duration::ZERO,
//! 			Duration::from_millis(10),
//! 			Tick(Arc::clone(&ticks)),
//! 		)
//! 		.expect("scheduler is running");
//!
//! 	tokio::time::sleep(Duration::from_millis(25)).await;
//! 	handle.cancel();
//!
//! 	scheduler.shutdown().await;
//! 	assert!(ticks.load(Ordering::Relaxed) >= 1);
//! }
//! ```

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::{fmt, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use thiserror::Error;
use tokio::{
	sync::Semaphore,
	time::{sleep, timeout},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, instrument, trace};

const ONE_MINUTE: Duration = Duration::from_secs(60);

/// A unit of background work that runs again and again until canceled.
#[async_trait::async_trait]
pub trait Repeat: Send + Sync + 'static {
	async fn run(&self);
}

#[derive(Debug, Error)]
pub enum Error {
	#[error("scheduler <name='{0}'> is shut down")]
	Shutdown(&'static str),
}

struct Inner {
	name: &'static str,
	workers: Semaphore,
	shutdown: CancellationToken,
	tracker: TaskTracker,
}

/// A named pool of self-rescheduling tasks, cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
	inner: Arc<Inner>,
}

impl fmt::Debug for Scheduler {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Scheduler")
			.field("name", &self.inner.name)
			.field("tasks", &self.inner.tracker.len())
			.field("is_shutdown", &self.is_shutdown())
			.finish()
	}
}

impl Scheduler {
	/// Creates a pool allowing at most `workers` task runs at the same time, at least one.
	#[must_use]
	pub fn new(name: &'static str, workers: usize) -> Self {
		Self {
			inner: Arc::new(Inner {
				name,
				workers: Semaphore::new(workers.max(1)),
				shutdown: CancellationToken::new(),
				tracker: TaskTracker::new(),
			}),
		}
	}

	#[must_use]
	pub fn name(&self) -> &'static str {
		self.inner.name
	}

	/// Schedules `task` to first run after `initial_delay`, and then `delay` after each run
	/// finishes.
	///
	/// Must be called from within a tokio runtime.
	#[instrument(skip(self, task), fields(scheduler = self.inner.name))]
	pub fn schedule_with_fixed_delay(
		&self,
		initial_delay: Duration,
		delay: Duration,
		task: impl Repeat,
	) -> Result<TaskHandle, Error> {
		if self.is_shutdown() {
			return Err(Error::Shutdown(self.inner.name));
		}

		let token = self.inner.shutdown.child_token();

		self.inner.tracker.spawn(run_repeating(
			Arc::clone(&self.inner),
			task,
			token.clone(),
			initial_delay,
			delay,
		));

		Ok(TaskHandle { token })
	}

	/// Amount of tasks still alive in this pool, including canceled ones finishing a run.
	#[must_use]
	pub fn active_tasks(&self) -> usize {
		self.inner.tracker.len()
	}

	#[must_use]
	pub fn is_shutdown(&self) -> bool {
		self.inner.shutdown.is_cancelled()
	}

	/// Stops every task of this pool and waits for them to finish.
	#[instrument(skip(self), fields(scheduler = self.inner.name))]
	pub async fn shutdown(&self) {
		self.inner.shutdown.cancel();
		self.inner.workers.close();
		self.inner.tracker.close();

		if timeout(ONE_MINUTE, self.inner.tracker.wait()).await.is_err() {
			error!("Scheduler failed to gracefully stop in the allotted time;");
		}
	}
}

/// Cancellation handle of a single scheduled task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
	token: CancellationToken,
}

impl TaskHandle {
	/// Stops the task from rescheduling itself; a run already in flight completes.
	pub fn cancel(&self) {
		self.token.cancel();
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}
}

async fn run_repeating(
	inner: Arc<Inner>,
	task: impl Repeat,
	token: CancellationToken,
	initial_delay: Duration,
	delay: Duration,
) {
	let mut next_delay = initial_delay;

	loop {
		tokio::select! {
			() = token.cancelled() => break,
			() = sleep(next_delay) => {}
		}

		next_delay = delay;

		// Closed on shutdown
		let Ok(_permit) = inner.workers.acquire().await else {
			break;
		};

		if token.is_cancelled() {
			break;
		}

		tokio::select! {
			biased;

			() = inner.shutdown.cancelled() => break,

			res = AssertUnwindSafe(task.run()).catch_unwind() => {
				if res.is_err() {
					error!(scheduler = inner.name, "Scheduled task unexpectedly panicked;");
				}
			}
		}
	}

	trace!(scheduler = inner.name, "Scheduled task stopped");
}
