//! In-process worker channel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChannelFactory, ChannelHealth, ChannelId, WorkerChannel};
use crate::config::WorkerConfig;
use crate::error::ChannelError;
use crate::invocation::{BindingValue, InvocationOutput, InvocationRequest, RuntimeId};

/// Function body run by a [`LocalChannel`].
pub type LocalHandler = Arc<dyn Fn(&InvocationRequest) -> Result<InvocationOutput, ChannelError> + Send + Sync>;

/// Handler that returns its inputs as outputs and the function name as the
/// return value.
pub fn echo_handler() -> LocalHandler {
	Arc::new(|request: &InvocationRequest| {
		Ok(InvocationOutput {
			return_value: Some(BindingValue::Text(request.function_id.to_string())),
			outputs: request.inputs.clone(),
		})
	})
}

/// Channel that runs invocations on the calling task.
pub struct LocalChannel {
	id: ChannelId,
	handler: LocalHandler,
	health: Mutex<ChannelHealth>,
}

impl LocalChannel {
	pub fn new(id: ChannelId, handler: LocalHandler) -> Self {
		Self {
			id,
			handler,
			health: Mutex::new(ChannelHealth::Starting),
		}
	}
}

#[async_trait]
impl WorkerChannel for LocalChannel {
	fn id(&self) -> ChannelId {
		self.id
	}

	fn health(&self) -> ChannelHealth {
		*self.health.lock()
	}

	async fn start(&self) -> Result<(), ChannelError> {
		let mut health = self.health.lock();
		match *health {
			ChannelHealth::Starting | ChannelHealth::Ready => {
				*health = ChannelHealth::Ready;
				Ok(())
			}
			ChannelHealth::Draining | ChannelHealth::Dead => Err(ChannelError::Closed),
		}
	}

	async fn send(&self, request: InvocationRequest) -> Result<InvocationOutput, ChannelError> {
		if !self.health().is_ready() {
			return Err(ChannelError::Closed);
		}
		(self.handler)(&request)
	}

	async fn shutdown(&self) {
		*self.health.lock() = ChannelHealth::Draining;
		tracing::debug!(channel = %self.id, "local_channel.drained");
		*self.health.lock() = ChannelHealth::Dead;
	}

	async fn terminate(&self) {
		*self.health.lock() = ChannelHealth::Dead;
	}

	async fn ping(&self) -> Option<Duration> {
		let started = Instant::now();
		self.health().is_ready().then(|| started.elapsed())
	}
}

/// Factory producing [`LocalChannel`]s that share one handler.
#[derive(Clone)]
pub struct LocalChannelFactory {
	handler: LocalHandler,
}

impl LocalChannelFactory {
	pub fn new(handler: LocalHandler) -> Self {
		Self { handler }
	}
}

impl ChannelFactory for LocalChannelFactory {
	fn create(&self, _runtime: &RuntimeId, id: ChannelId, _config: &WorkerConfig) -> Arc<dyn WorkerChannel> {
		Arc::new(LocalChannel::new(id, Arc::clone(&self.handler)))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn echo_round_trip() {
		let channel = LocalChannel::new(ChannelId(1), echo_handler());
		assert!(channel.send(InvocationRequest::new("hello")).await.is_err());

		channel.start().await.unwrap();
		let request = InvocationRequest::new("hello").input("name", BindingValue::Text("fn".into()));
		let output = channel.send(request).await.unwrap();
		assert_eq!(output.return_value, Some(BindingValue::Text("hello".into())));
		assert_eq!(output.outputs.get("name"), Some(&BindingValue::Text("fn".into())));
		assert!(channel.ping().await.is_some());
	}

	#[tokio::test]
	async fn terminated_channel_refuses_work() {
		let channel = LocalChannel::new(ChannelId(2), echo_handler());
		channel.start().await.unwrap();
		channel.terminate().await;
		channel.terminate().await;

		assert_eq!(channel.health(), ChannelHealth::Dead);
		assert_eq!(channel.send(InvocationRequest::new("f")).await, Err(ChannelError::Closed));
		assert_eq!(channel.start().await, Err(ChannelError::Closed));
		assert!(channel.ping().await.is_none());
	}
}
