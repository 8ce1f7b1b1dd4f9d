use std::future::Future;

use tokio::task::{JoinError, JoinSet};

use crate::TaskClass;

/// Runtime-safe wrapper for a Tokio [`JoinSet`].
///
/// Tasks are spawned on the handle returned by the crate's runtime lookup, so
/// a set created on a plain thread still lands on a live runtime. Dropping the
/// set aborts every task still in it; use [`crate::spawn`] for work that must
/// outlive its caller.
#[derive(Debug)]
pub struct WorkerJoinSet<T> {
	class: TaskClass,
	inner: JoinSet<T>,
}

impl<T> WorkerJoinSet<T>
where
	T: Send + 'static,
{
	/// Creates an empty join set for the given task class.
	pub fn new(class: TaskClass) -> Self {
		Self { class, inner: JoinSet::new() }
	}

	/// Returns the number of tasks currently in the set.
	pub fn len(&self) -> usize {
		self.inner.len()
	}

	/// Returns `true` if the set is empty.
	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	/// Spawns a future into the set.
	#[allow(clippy::disallowed_methods)]
	pub fn spawn<F>(&mut self, fut: F)
	where
		F: Future<Output = T> + Send + 'static,
	{
		tracing::trace!(task_class = self.class.as_str(), pending = self.inner.len(), "worker.join_set.spawn");
		let handle = crate::spawn::runtime_handle();
		self.inner.spawn_on(fut, &handle);
	}

	/// Waits for the next completed task.
	pub async fn join_next(&mut self) -> Option<Result<T, JoinError>> {
		self.inner.join_next().await
	}

	/// Waits for every task and returns the successful outputs in completion order.
	///
	/// Tasks that panicked or were aborted are logged and skipped.
	pub async fn join_all(mut self) -> Vec<T> {
		let mut out = Vec::with_capacity(self.inner.len());
		while let Some(res) = self.inner.join_next().await {
			match res {
				Ok(value) => out.push(value),
				Err(error) => tracing::warn!(task_class = self.class.as_str(), %error, "worker.join_set.task_failed"),
			}
		}
		out
	}
}
