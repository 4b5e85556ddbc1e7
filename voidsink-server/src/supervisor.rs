use std::sync::Arc;
use std::time::Duration;

use actix_web::rt;
use log::{error, info, warn};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;

use crate::error::TrapError;
use crate::trap::Lifecycle;

/// Extra time, past the shutdown deadline, granted to service tasks to return
/// before they are aborted.
const JOIN_GRACE: Duration = Duration::from_secs(1);

/// Outcome of `Supervisor::shutdown`.
#[derive(Debug)]
pub struct ShutdownReport {
	/// One entry per service, in registration order.
	pub outcomes: Vec<(String, Result<(), TrapError>)>,
	/// Service tasks that had to be aborted.
	pub abandoned: usize,
	pub elapsed: Duration,
}

impl ShutdownReport {
	pub fn is_clean(&self) -> bool {
		self.abandoned == 0 && self.outcomes.iter().all(|(_, r)| r.is_ok())
	}

	pub fn failures(&self) -> impl Iterator<Item = (&str, &TrapError)> {
		self.outcomes.iter().filter_map(|(name, r)| r.as_ref().err().map(|e| (name.as_str(), e)))
	}
}

/// Runs a set of services and stops them together.
///
/// # Responsibilities
/// - Start every service concurrently, each on its own task
/// - Keep running when one service fails early; the failure is only logged
/// - Stop everything within a bounded time, whatever the services do
///
/// # Notes
/// Tasks are spawned on the current actix system, so a `Supervisor` must be
/// driven from inside `#[actix_web::main]` or `#[actix_web::test]`.
pub struct Supervisor<S: Lifecycle> {
	services: Vec<Arc<S>>,
	cancel: CancellationToken,
	deadline: Duration,
	tasks: Vec<JoinHandle<()>>,
	live: Arc<watch::Sender<usize>>,
}

impl<S: Lifecycle> Supervisor<S> {
	pub fn new(services: Vec<S>, deadline: Duration) -> Self {
		let (live, _) = watch::channel(0);
		Self {
			services: services.into_iter().map(Arc::new).collect(),
			cancel: CancellationToken::new(),
			deadline,
			tasks: Vec::new(),
			live: Arc::new(live),
		}
	}

	/// Token fired by `shutdown`; cancelling it directly stops the services
	/// without waiting.
	pub fn cancel_token(&self) -> CancellationToken {
		self.cancel.clone()
	}

	pub fn services(&self) -> &[Arc<S>] {
		&self.services
	}

	/// Spawns every service's `start`.
	///
	/// Calling it more than once does nothing.
	pub fn start(&mut self) {
		if !self.tasks.is_empty() {
			return;
		}

		self.live.send_replace(self.services.len());
		for service in &self.services {
			let service = Arc::clone(service);
			let cancel = self.cancel.clone();
			let live = Arc::clone(&self.live);
			self.tasks.push(rt::spawn(async move {
				match service.start(cancel).await {
					Ok(()) => info!("{} stopped", service.name()),
					Err(e) => error!("{e}"),
				}
				live.send_modify(|n| *n = n.saturating_sub(1));
			}));
		}
	}

	/// Resolves once every service task has returned.
	///
	/// Returns immediately if nothing was started.
	pub async fn closed(&self) {
		let mut rx = self.live.subscribe();
		// The sender lives in `self`, so this cannot fail while borrowed
		let _ = rx.wait_for(|n| *n == 0).await;
	}

	/// Cancels every service and waits for them, bounded in time.
	///
	/// Each service gets `deadline` to run its own shutdown; the service tasks
	/// then get a short grace period before being aborted. Failures end up in
	/// the report.
	pub async fn shutdown(self) -> ShutdownReport {
		let started = Instant::now();
		let deadline = self.deadline;
		self.cancel.cancel();

		let mut set = JoinSet::new();
		for (index, service) in self.services.iter().enumerate() {
			let service = Arc::clone(service);
			set.spawn_local(async move {
				let outcome = match timeout(deadline, service.shutdown(deadline)).await {
					Ok(outcome) => outcome,
					Err(_) => Err(TrapError::ShutdownTimeout { name: service.name().to_owned(), deadline }),
				};
				(index, service.name().to_owned(), outcome)
			});
		}

		let mut outcomes = Vec::with_capacity(self.services.len());
		while let Some(joined) = set.join_next().await {
			match joined {
				Ok(outcome) => outcomes.push(outcome),
				Err(e) => error!("shutdown task failed: {e}"),
			}
		}
		outcomes.sort_by_key(|(index, _, _)| *index);

		let join_by = started + deadline + JOIN_GRACE;
		let mut abandoned = 0;
		for task in self.tasks {
			let abort = task.abort_handle();
			if timeout_at(join_by, task).await.is_err() {
				abort.abort();
				abandoned += 1;
			}
		}
		if abandoned > 0 {
			warn!("{abandoned} service task(s) did not return in time and were aborted");
		}

		ShutdownReport {
			outcomes: outcomes.into_iter().map(|(_, name, outcome)| (name, outcome)).collect(),
			abandoned,
			elapsed: started.elapsed(),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::future::pending;
	use std::io;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	enum Behavior {
		/// Serves until cancelled, stops quickly.
		Polite,
		/// Fails right away.
		Broken,
		/// Ignores cancellation and never finishes shutting down.
		Stubborn,
	}

	struct Mock {
		name: String,
		behavior: Behavior,
		shutdowns: AtomicUsize,
	}

	fn mock(name: &str, behavior: Behavior) -> Mock {
		Mock { name: name.to_owned(), behavior, shutdowns: AtomicUsize::new(0) }
	}

	impl Lifecycle for Mock {
		fn name(&self) -> &str {
			&self.name
		}

		async fn start(&self, cancel: CancellationToken) -> Result<(), TrapError> {
			match self.behavior {
				Behavior::Polite => {
					cancel.cancelled().await;
					Ok(())
				}
				Behavior::Broken => Err(TrapError::Listener {
					name: self.name.clone(),
					source: io::Error::other("boom"),
				}),
				Behavior::Stubborn => pending().await,
			}
		}

		async fn shutdown(&self, _deadline: Duration) -> Result<(), TrapError> {
			self.shutdowns.fetch_add(1, Ordering::SeqCst);
			match self.behavior {
				Behavior::Stubborn => pending().await,
				_ => {
					tokio::time::sleep(Duration::from_millis(20)).await;
					Ok(())
				}
			}
		}
	}

	#[actix_web::test]
	async fn early_failure_does_not_stop_the_others() {
		let mut supervisor = Supervisor::new(vec![mock("a", Behavior::Polite), mock("b", Behavior::Broken)], Duration::from_secs(1));
		supervisor.start();
		tokio::time::sleep(Duration::from_millis(50)).await;
		assert_eq!(*supervisor.live.borrow(), 1);

		let report = supervisor.shutdown().await;
		assert!(report.is_clean());
		assert_eq!(report.outcomes.len(), 2);
		assert_eq!(report.outcomes[0].0, "a");
	}

	#[actix_web::test]
	async fn stubborn_service_is_bounded_and_reported() {
		let deadline = Duration::from_millis(200);
		let mut supervisor = Supervisor::new(vec![mock("polite", Behavior::Polite), mock("stubborn", Behavior::Stubborn)], deadline);
		supervisor.start();

		let report = supervisor.shutdown().await;
		assert!(report.elapsed < deadline + JOIN_GRACE + Duration::from_millis(500));
		assert_eq!(report.abandoned, 1);
		assert!(!report.is_clean());
		let failures: Vec<&str> = report.failures().map(|(name, _)| name).collect();
		assert_eq!(failures, vec!["stubborn"]);
		assert!(matches!(report.outcomes[1].1, Err(TrapError::ShutdownTimeout { .. })));
	}

	#[actix_web::test]
	async fn closed_resolves_when_every_task_returned() {
		let mut supervisor = Supervisor::new(vec![mock("x", Behavior::Broken), mock("y", Behavior::Broken)], Duration::from_secs(1));
		supervisor.start();
		timeout(Duration::from_secs(1), supervisor.closed()).await.expect("all services failed, closed should resolve");

		let report = supervisor.shutdown().await;
		assert_eq!(report.abandoned, 0);
		for service in report.outcomes {
			assert!(service.1.is_ok());
		}
	}

	#[actix_web::test]
	async fn every_service_gets_a_shutdown_call() {
		let mut supervisor = Supervisor::new(vec![mock("a", Behavior::Polite), mock("b", Behavior::Polite)], Duration::from_secs(1));
		supervisor.start();
		supervisor.start();
		let services: Vec<Arc<Mock>> = supervisor.services().to_vec();

		let report = supervisor.shutdown().await;
		assert!(report.is_clean());
		for service in services {
			assert_eq!(service.shutdowns.load(Ordering::SeqCst), 1);
		}
	}
}
