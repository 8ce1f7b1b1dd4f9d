//! Dispatch error taxonomy.
//!
//! Startup and invocation failures propagate to the caller. Shutdown never
//! fails; a missed deadline is reported through [`crate::ShutdownReport`] and
//! a `warn!` event.

use std::time::Duration;

use thiserror::Error;

use crate::channel::ChannelId;
use crate::dispatcher::DispatcherState;
use crate::invocation::RuntimeId;

/// Failure reported by a worker channel transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
	#[error("worker failed to start: {0}")]
	Start(String),
	#[error("transport error: {0}")]
	Transport(String),
	#[error("channel closed")]
	Closed,
}

/// Errors surfaced by dispatchers and the coordinator.
#[derive(Debug, Error)]
pub enum DispatchError {
	/// No worker channel reached ready within the startup deadline.
	#[error("no worker for runtime '{runtime}' became ready within {deadline:?} ({} failed)", failures.len())]
	WorkerStartup {
		runtime: RuntimeId,
		deadline: Duration,
		failures: Vec<ChannelError>,
	},

	/// No healthy channel at invoke time. The caller may retry.
	#[error("no healthy worker channel available for runtime '{runtime}'")]
	DispatchUnavailable { runtime: RuntimeId },

	/// The dispatcher is not in a state that accepts the operation.
	#[error("dispatcher for runtime '{runtime}' is {state}")]
	NotReady { runtime: RuntimeId, state: DispatcherState },

	/// The selected channel failed the invocation.
	#[error("invocation failed on {channel}: {source}")]
	Invocation {
		channel: ChannelId,
		#[source]
		source: ChannelError,
	},

	#[error("a dispatcher is already registered for runtime '{0}'")]
	DuplicateRuntime(RuntimeId),

	#[error("no dispatcher registered for runtime '{0}'")]
	UnknownRuntime(RuntimeId),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
