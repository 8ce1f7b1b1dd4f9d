//! Script host lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use fnhost_cache::{AssemblyPolicyCache, ChangeBus, ChangeEvent, ChangeSubscriber, Environment, ProxyMetadataCache, spawn_change_listener};
use fnhost_dispatch::{
	BindingValue, ChannelFactory, DispatcherCoordinator, FunctionDispatcher, InvocationOutput, InvocationRequest, RuntimeId, StopReport,
};
use fnhost_worker::{TaskClass, WorkerJoinSet};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::error::{HostError, Result};


/// A running function host.
///
/// Lifecycle: [`Self::start`], any number of [`Self::invoke`] calls, then
/// [`Self::stop`] for the graceful path and [`Self::dispose`] for the forced
/// one. `dispose` is safe to call without `stop` and more than once.
pub struct ScriptHost {
	config: HostConfig,
	coordinator: DispatcherCoordinator,
	metadata: Arc<ProxyMetadataCache>,
	assemblies: Arc<AssemblyPolicyCache>,
	changes: ChangeBus,
	cancel: CancellationToken,
	listener: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptHost {
	/// Builds one dispatcher per configured runtime. Nothing is started yet.
	pub fn new(config: HostConfig, env: Arc<dyn Environment>, factory: Arc<dyn ChannelFactory>) -> Result<Self> {
		let coordinator = DispatcherCoordinator::new();
		for (runtime, worker) in &config.workers {
			let dispatcher = FunctionDispatcher::new(runtime.as_str(), worker.clone(), Arc::clone(&factory));
			coordinator.register(Arc::new(dispatcher))?;
		}

		Ok(Self {
			metadata: Arc::new(ProxyMetadataCache::with_file_system(&config.script_root)),
			assemblies: Arc::new(AssemblyPolicyCache::new(config.assembly_dir(), env)),
			coordinator,
			changes: ChangeBus::default(),
			cancel: CancellationToken::new(),
			listener: Mutex::new(None),
			config,
		})
	}

	pub fn config(&self) -> &HostConfig {
		&self.config
	}

	pub fn coordinator(&self) -> &DispatcherCoordinator {
		&self.coordinator
	}

	pub fn metadata(&self) -> &ProxyMetadataCache {
		&self.metadata
	}

	pub fn assemblies(&self) -> &AssemblyPolicyCache {
		&self.assemblies
	}

	/// Publishes a change notification to the caches. Returns the number of
	/// live listeners.
	pub fn notify(&self, event: ChangeEvent) -> usize {
		self.changes.publish(event)
	}

	/// Starts the change listener, loads both caches and initializes every
	/// dispatcher concurrently. The first startup failure is returned.
	pub async fn start(&self) -> Result<()> {
		{
			let mut listener = self.listener.lock();
			if listener.is_none() {
				let subscribers = vec![
					Arc::clone(&self.metadata) as Arc<dyn ChangeSubscriber>,
					Arc::clone(&self.assemblies) as Arc<dyn ChangeSubscriber>,
				];
				*listener = Some(spawn_change_listener(self.changes.subscribe(), subscribers, self.cancel.child_token()));
			}
		}

		// First loads read the file system.
		let metadata = Arc::clone(&self.metadata);
		let assemblies = Arc::clone(&self.assemblies);
		let warmup = fnhost_worker::spawn_blocking(TaskClass::Refresh, move || (metadata.current().functions().count(), assemblies.current().len()));
		match warmup.await {
			Ok((functions, assemblies)) => info!(root = %self.config.script_root.display(), functions, assemblies, "host.metadata.loaded"),
			Err(error) => warn!(%error, "host.metadata.load_failed"),
		}

		let mut set = WorkerJoinSet::new(TaskClass::Startup);
		for runtime in self.coordinator.runtimes() {
			let Some(dispatcher) = self.coordinator.get(&runtime) else {
				continue;
			};
			set.spawn(async move { dispatcher.initialize().await });
		}

		let mut first_error = None;
		for outcome in set.join_all().await {
			if let Err(error) = outcome {
				warn!(%error, "host.dispatcher.start_failed");
				first_error.get_or_insert(error);
			}
		}
		if let Some(error) = first_error {
			return Err(error.into());
		}

		info!(runtimes = self.coordinator.len(), "host.started");
		Ok(())
	}

	/// Invokes a function by name, routing to the dispatcher for the runtime
	/// its script file implies.
	pub async fn invoke(&self, function: &str, inputs: BTreeMap<String, BindingValue>) -> Result<InvocationOutput> {
		let snapshot = self.metadata.current();
		let record = snapshot.function(function).ok_or_else(|| HostError::FunctionNotFound(function.to_string()))?;
		if record.disabled {
			return Err(HostError::FunctionDisabled(record.name.clone()));
		}
		let runtime = record.runtime().ok_or_else(|| HostError::UnsupportedRuntime {
			function: record.name.clone(),
			script_file: record.script_file.clone(),
		})?;

		let dispatcher = self.coordinator.require(&RuntimeId::from(runtime))?;
		let request = InvocationRequest {
			inputs,
			..InvocationRequest::new(record.name.as_str())
		};
		Ok(dispatcher.invoke(request).await?)
	}

	fn stop_listener(&self) -> Option<JoinHandle<()>> {
		self.cancel.cancel();
		self.listener.lock().take()
	}

	/// Graceful path: stops the change listener, then drains every dispatcher
	/// within the configured host budget. Never fails.
	pub async fn stop(&self) -> StopReport {
		if let Some(handle) = self.stop_listener()
			&& let Err(error) = handle.await
		{
			warn!(%error, "host.listener.failed");
		}

		let budget = self.config.shutdown_timeout();
		let report = self.coordinator.stop(budget).await;
		info!(completed = report.completed.len(), timed_out = report.timed_out.len(), "host.stopped");
		report
	}

	/// Forced path: terminates every dispatcher and releases them.
	pub async fn dispose(&self) {
		if let Some(handle) = self.stop_listener() {
			handle.abort();
		}
		self.coordinator.terminate_all().await;
		info!("host.disposed");
	}
}
