//! Worker channel seam.
//!
//! A channel is one worker process plus the transport to it. The dispatcher
//! only talks to channels through [`WorkerChannel`], so tests substitute mocks
//! that hang, fail, or count calls.

pub(crate) mod local;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::WorkerConfig;
use crate::error::ChannelError;
use crate::invocation::{InvocationOutput, InvocationRequest, RuntimeId};

/// Dispatcher-assigned channel identifier, unique per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "worker#{}", self.0)
	}
}

/// Liveness of a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelHealth {
	Starting,
	Ready,
	Draining,
	Dead,
}

impl ChannelHealth {
	pub const fn is_ready(self) -> bool {
		matches!(self, Self::Ready)
	}
}

/// Transport to one worker process.
#[async_trait]
pub trait WorkerChannel: Send + Sync + 'static {
	fn id(&self) -> ChannelId;

	fn health(&self) -> ChannelHealth;

	/// Launches the worker and waits for its ready handshake.
	async fn start(&self) -> Result<(), ChannelError>;

	async fn send(&self, request: InvocationRequest) -> Result<InvocationOutput, ChannelError>;

	/// Graceful drain. May take arbitrarily long, or never resolve.
	async fn shutdown(&self);

	/// Immediate teardown. Must be prompt and tolerate repeated calls.
	async fn terminate(&self);

	/// Round-trip latency to the worker, when the transport can measure it.
	async fn ping(&self) -> Option<Duration> {
		None
	}
}

/// Creates channels for a dispatcher.
pub trait ChannelFactory: Send + Sync + 'static {
	fn create(&self, runtime: &RuntimeId, id: ChannelId, config: &WorkerConfig) -> Arc<dyn WorkerChannel>;
}
