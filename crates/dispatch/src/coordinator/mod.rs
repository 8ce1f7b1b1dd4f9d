//! Host-wide registry of dispatchers, one per language runtime.
//!
//! Entries are added while the host starts and removed only by
//! [`DispatcherCoordinator::terminate_all`] during host disposal.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fnhost_worker::{TaskClass, WorkerJoinSet};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::dispatcher::{FunctionDispatcher, ShutdownReport};
use crate::error::{DispatchError, Result};
use crate::invocation::RuntimeId;


/// Lifecycle surface the coordinator drives.
#[async_trait]
pub trait ManagedDispatcher: Send + Sync + 'static {
	fn runtime(&self) -> &RuntimeId;

	/// Graceful drain, returning within roughly `timeout`.
	async fn shutdown(&self, timeout: Duration) -> ShutdownReport;

	/// Unconditional teardown. Idempotent.
	async fn terminate(&self);
}

/// Outcome of a coordinated graceful stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopReport {
	/// Runtimes whose dispatchers drained before the deadline.
	pub completed: Vec<RuntimeId>,
	/// Runtimes still draining, or abandoned, when the deadline passed.
	pub timed_out: Vec<RuntimeId>,
}

impl StopReport {
	pub fn all_completed(&self) -> bool {
		self.timed_out.is_empty()
	}
}

/// Owns every dispatcher in the host.
pub struct DispatcherCoordinator<D: ManagedDispatcher = FunctionDispatcher> {
	dispatchers: RwLock<BTreeMap<RuntimeId, Arc<D>>>,
}

impl<D: ManagedDispatcher> Default for DispatcherCoordinator<D> {
	fn default() -> Self {
		Self {
			dispatchers: RwLock::new(BTreeMap::new()),
		}
	}
}

impl<D: ManagedDispatcher> DispatcherCoordinator<D> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a dispatcher. One per runtime.
	pub fn register(&self, dispatcher: Arc<D>) -> Result<()> {
		let runtime = dispatcher.runtime().clone();
		let mut dispatchers = self.dispatchers.write();
		if dispatchers.contains_key(&runtime) {
			return Err(DispatchError::DuplicateRuntime(runtime));
		}
		info!(%runtime, "coordinator.register");
		dispatchers.insert(runtime, dispatcher);
		Ok(())
	}

	pub fn get(&self, runtime: &RuntimeId) -> Option<Arc<D>> {
		self.dispatchers.read().get(runtime).cloned()
	}

	/// Like [`Self::get`], but failing with [`DispatchError::UnknownRuntime`].
	pub fn require(&self, runtime: &RuntimeId) -> Result<Arc<D>> {
		self.get(runtime).ok_or_else(|| DispatchError::UnknownRuntime(runtime.clone()))
	}

	pub fn runtimes(&self) -> Vec<RuntimeId> {
		self.dispatchers.read().keys().cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.dispatchers.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.dispatchers.read().is_empty()
	}

	fn snapshot(&self) -> Vec<Arc<D>> {
		self.dispatchers.read().values().cloned().collect()
	}

	/// Shuts every dispatcher down concurrently under one budget.
	///
	/// Each dispatcher's shutdown runs on a detached task. The call returns
	/// once all have finished or the budget elapses, whichever comes first;
	/// stragglers are left running and reported as timed out. Registrations
	/// are kept so [`Self::terminate_all`] can follow.
	pub async fn stop(&self, budget: Duration) -> StopReport {
		let deadline = Instant::now() + budget;
		let dispatchers = self.snapshot();
		info!(dispatchers = dispatchers.len(), ?budget, "coordinator.stop");

		let handles: Vec<_> = dispatchers
			.into_iter()
			.map(|dispatcher| {
				let runtime = dispatcher.runtime().clone();
				let handle = fnhost_worker::spawn(TaskClass::Shutdown, async move {
					let remaining = deadline.saturating_duration_since(Instant::now());
					dispatcher.shutdown(remaining).await
				});
				(runtime, handle)
			})
			.collect();

		let mut report = StopReport::default();
		for (runtime, mut handle) in handles {
			match tokio::time::timeout_at(deadline, &mut handle).await {
				Ok(Ok(shutdown)) if shutdown.completed() => report.completed.push(runtime),
				Ok(Ok(_)) => report.timed_out.push(runtime),
				Ok(Err(join_error)) => {
					warn!(%runtime, %join_error, "coordinator.stop.dispatcher_failed");
					report.timed_out.push(runtime);
				}
				Err(_) => report.timed_out.push(runtime),
			}
		}

		if !report.all_completed() {
			let runtimes: Vec<&str> = report.timed_out.iter().map(RuntimeId::as_str).collect();
			warn!(?budget, timed_out = ?runtimes, "coordinator.stop.timeout");
		}
		report
	}

	/// Terminates every dispatcher concurrently, waits for all of them, then
	/// clears the registry. Each dispatcher is terminated exactly once per call.
	pub async fn terminate_all(&self) {
		let dispatchers = self.snapshot();
		info!(dispatchers = dispatchers.len(), "coordinator.terminate_all");

		let mut set = WorkerJoinSet::new(TaskClass::Shutdown);
		for dispatcher in dispatchers {
			set.spawn(async move { dispatcher.terminate().await });
		}
		set.join_all().await;

		self.dispatchers.write().clear();
	}
}

impl<D: ManagedDispatcher> fmt::Debug for DispatcherCoordinator<D> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("DispatcherCoordinator").field("runtimes", &self.runtimes()).finish()
	}
}
