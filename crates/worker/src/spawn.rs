use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::TaskClass;

/// Returns the ambient runtime handle, falling back to a process-wide runtime
/// for callers on plain threads (file watcher callbacks, FFI hosts).
pub(crate) fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("fnhost-worker-global")
			.build()
			.expect("failed to build fnhost-worker global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task tagged with `class`.
///
/// Dropping the returned handle detaches the task; it is never cancelled
/// implicitly.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

/// Runs blocking work on the runtime's blocking pool, tagged with `class`.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "worker.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}
