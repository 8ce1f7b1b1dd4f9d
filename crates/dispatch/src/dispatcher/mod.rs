//! Per-runtime function dispatcher.
//!
//! Lifecycle: `Uninitialized -> Initializing -> Ready -> Draining -> Terminated`.
//! `terminate` may be entered from any state and is the only way into
//! `Terminated`. A failed `initialize` returns to `Uninitialized` so the host
//! can retry.
//!
//! The channel list sits behind a synchronous lock that is never held across
//! an await. Channel shutdown futures run on detached tasks so a hung worker
//! cannot block the caller past its deadline. Termination also runs detached:
//! once begun it reaches `Terminated` even if the caller is dropped.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fnhost_window::{Clock, SystemClock, TimeWindow};
use fnhost_worker::{GenerationClock, TaskClass, WorkerJoinSet};
use parking_lot::RwLock;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelFactory, ChannelHealth, ChannelId, WorkerChannel};
use crate::config::WorkerConfig;
use crate::coordinator::ManagedDispatcher;
use crate::error::{ChannelError, DispatchError, Result};
use crate::invocation::{InvocationOutput, InvocationRequest, RuntimeId};
use crate::select::{self, ChannelLoad, ChannelSelector};


/// Dispatcher lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatcherState {
	Uninitialized,
	Initializing,
	Ready,
	Draining,
	Terminated,
}

impl DispatcherState {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Uninitialized => "uninitialized",
			Self::Initializing => "initializing",
			Self::Ready => "ready",
			Self::Draining => "draining",
			Self::Terminated => "terminated",
		}
	}
}

impl fmt::Display for DispatcherState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Outcome of a graceful shutdown request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
	completed: bool,
	timed_out: bool,
	pending: Vec<ChannelId>,
	elapsed: Duration,
}

impl ShutdownReport {
	/// Builds a report from the channels still draining at the deadline.
	pub fn new(pending: Vec<ChannelId>, elapsed: Duration) -> Self {
		Self {
			completed: pending.is_empty(),
			timed_out: !pending.is_empty(),
			pending,
			elapsed,
		}
	}

	/// Every channel finished draining before the deadline.
	pub fn completed(&self) -> bool {
		self.completed
	}

	pub fn timed_out(&self) -> bool {
		self.timed_out
	}

	/// Channels still draining when the deadline passed.
	pub fn pending(&self) -> &[ChannelId] {
		&self.pending
	}

	pub fn elapsed(&self) -> Duration {
		self.elapsed
	}
}

/// Result of reporting a worker error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
	/// The failed channel was replaced.
	Restarted { replaced: ChannelId, replacement: ChannelId },
	/// The replacement channel did not become ready.
	ReplacementFailed { replaced: ChannelId },
	/// Too many errors inside the restart window; the channel was dropped.
	BudgetExhausted { errors: usize },
	/// The channel is not owned by this dispatcher.
	UnknownChannel,
	/// The dispatcher is draining or terminated.
	NotRunning,
}

/// Observable state of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStatus {
	pub id: ChannelId,
	pub health: ChannelHealth,
	pub in_flight: usize,
	pub dispatched: u64,
	pub latency: Option<Duration>,
}

#[derive(Debug, Clone)]
struct WorkerErrorRecord {
	channel: ChannelId,
	message: String,
}

struct ChannelSlot {
	channel: Arc<dyn WorkerChannel>,
	in_flight: AtomicUsize,
	dispatched: AtomicU64,
}

impl ChannelSlot {
	fn new(channel: Arc<dyn WorkerChannel>) -> Arc<Self> {
		Arc::new(Self {
			channel,
			in_flight: AtomicUsize::new(0),
			dispatched: AtomicU64::new(0),
		})
	}

	fn load(&self) -> ChannelLoad {
		ChannelLoad {
			id: self.channel.id(),
			in_flight: self.in_flight.load(Ordering::Acquire),
			dispatched: self.dispatched.load(Ordering::Acquire),
		}
	}
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::AcqRel);
	}
}

/// Owns the worker channels of one language runtime.
pub struct FunctionDispatcher {
	runtime: RuntimeId,
	config: WorkerConfig,
	factory: Arc<dyn ChannelFactory>,
	selector: Box<dyn ChannelSelector>,
	state: Arc<watch::Sender<DispatcherState>>,
	channels: RwLock<Vec<Arc<ChannelSlot>>>,
	/// Set under the `channels` write lock; channels started after this is set
	/// are torn down by whoever started them.
	terminating: AtomicBool,
	channel_ids: GenerationClock,
	init_gate: AsyncMutex<()>,
	restart_gate: AsyncMutex<()>,
	errors: TimeWindow<WorkerErrorRecord, Arc<dyn Clock>>,
}

impl FunctionDispatcher {
	pub fn new(runtime: impl Into<RuntimeId>, config: WorkerConfig, factory: Arc<dyn ChannelFactory>) -> Self {
		Self::with_clock(runtime, config, factory, Arc::new(SystemClock))
	}

	/// Creates a dispatcher whose restart window reads time from `clock`.
	pub fn with_clock(runtime: impl Into<RuntimeId>, config: WorkerConfig, factory: Arc<dyn ChannelFactory>, clock: Arc<dyn Clock>) -> Self {
		let (state, _) = watch::channel(DispatcherState::Uninitialized);
		Self {
			runtime: runtime.into(),
			selector: select::for_balancing(config.balancing),
			errors: TimeWindow::with_clock(config.restart_window(), clock),
			config,
			factory,
			state: Arc::new(state),
			channels: RwLock::new(Vec::new()),
			terminating: AtomicBool::new(false),
			channel_ids: GenerationClock::new(),
			init_gate: AsyncMutex::new(()),
			restart_gate: AsyncMutex::new(()),
		}
	}

	pub fn runtime(&self) -> &RuntimeId {
		&self.runtime
	}

	pub fn config(&self) -> &WorkerConfig {
		&self.config
	}

	pub fn state(&self) -> DispatcherState {
		*self.state.borrow()
	}

	/// Subscribes to lifecycle transitions.
	pub fn subscribe_state(&self) -> watch::Receiver<DispatcherState> {
		self.state.subscribe()
	}

	/// Number of channels currently owned.
	pub fn channel_count(&self) -> usize {
		self.channels.read().len()
	}

	fn not_ready(&self) -> DispatchError {
		DispatchError::NotReady {
			runtime: self.runtime.clone(),
			state: self.state(),
		}
	}

	/// Starts `process_count` channels and waits until at least one is ready.
	///
	/// Idempotent once `Ready`. Concurrent callers are serialized; the second
	/// observes the first's result. Fails with [`DispatchError::WorkerStartup`]
	/// when no channel reaches ready within the startup deadline, leaving the
	/// dispatcher `Uninitialized`.
	pub async fn initialize(&self) -> Result<()> {
		let _gate = self.init_gate.lock().await;

		let entered = self.state.send_if_modified(|state| {
			if *state == DispatcherState::Uninitialized {
				*state = DispatcherState::Initializing;
				true
			} else {
				false
			}
		});
		if !entered {
			return match self.state() {
				DispatcherState::Ready => Ok(()),
				_ => Err(self.not_ready()),
			};
		}

		let deadline = self.config.startup_timeout();
		info!(runtime = %self.runtime, processes = self.config.process_count, ?deadline, "dispatcher.initialize");

		let (ready, failures) = self.start_channels(self.config.process_count.max(1), deadline).await;
		if ready.is_empty() {
			self.state.send_if_modified(|state| {
				if *state == DispatcherState::Initializing {
					*state = DispatcherState::Uninitialized;
					true
				} else {
					false
				}
			});
			error!(runtime = %self.runtime, failures = failures.len(), "dispatcher.initialize.failed");
			return Err(DispatchError::WorkerStartup {
				runtime: self.runtime.clone(),
				deadline,
				failures,
			});
		}
		if !failures.is_empty() {
			warn!(runtime = %self.runtime, ready = ready.len(), failed = failures.len(), "dispatcher.initialize.partial");
		}

		let count = ready.len();
		if let Err(orphans) = self.publish(ready) {
			terminate_all(orphans).await;
			return Err(self.not_ready());
		}

		let became_ready = self.state.send_if_modified(|state| {
			if *state == DispatcherState::Initializing {
				*state = DispatcherState::Ready;
				true
			} else {
				false
			}
		});
		if !became_ready {
			// Shutdown began mid-startup. It drains what was just published once
			// `init_gate` is released; terminate already owns it.
			warn!(runtime = %self.runtime, state = %self.state(), channels = count, "dispatcher.initialize.interrupted");
			return Err(self.not_ready());
		}

		info!(runtime = %self.runtime, channels = count, "dispatcher.ready");
		Ok(())
	}

	/// Starts `count` channels concurrently under one deadline. Channels that
	/// fail or miss the deadline are terminated before returning.
	async fn start_channels(&self, count: usize, deadline: Duration) -> (Vec<Arc<dyn WorkerChannel>>, Vec<ChannelError>) {
		let deadline_at = Instant::now() + deadline;
		let mut set = WorkerJoinSet::new(TaskClass::Startup);
		for _ in 0..count {
			let id = ChannelId(self.channel_ids.next());
			let channel = self.factory.create(&self.runtime, id, &self.config);
			set.spawn(async move {
				let outcome = match tokio::time::timeout_at(deadline_at, channel.start()).await {
					Ok(result) => result,
					Err(_) => Err(ChannelError::Start(format!("{id} not ready within {deadline:?}"))),
				};
				(channel, outcome)
			});
		}

		let mut ready = Vec::new();
		let mut failures = Vec::new();
		for (channel, outcome) in set.join_all().await {
			match outcome {
				Ok(()) => ready.push(channel),
				Err(error) => {
					warn!(runtime = %self.runtime, channel = %channel.id(), %error, "dispatcher.channel.start_failed");
					channel.terminate().await;
					failures.push(error);
				}
			}
		}
		ready.sort_by_key(|channel| channel.id());
		(ready, failures)
	}

	/// Adds started channels, unless termination has begun, in which case the
	/// channels are handed back for teardown.
	fn publish(&self, started: Vec<Arc<dyn WorkerChannel>>) -> std::result::Result<(), Vec<Arc<dyn WorkerChannel>>> {
		let mut channels = self.channels.write();
		if self.terminating.load(Ordering::Acquire) {
			return Err(started);
		}
		channels.extend(started.into_iter().map(ChannelSlot::new));
		Ok(())
	}

	/// Routes one invocation to a healthy channel.
	pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationOutput> {
		if self.state() != DispatcherState::Ready {
			return Err(self.not_ready());
		}

		let slot = self.select().ok_or_else(|| DispatchError::DispatchUnavailable { runtime: self.runtime.clone() })?;
		slot.in_flight.fetch_add(1, Ordering::AcqRel);
		slot.dispatched.fetch_add(1, Ordering::AcqRel);
		let _guard = InFlightGuard(&slot.in_flight);

		let channel = slot.channel.id();
		debug!(runtime = %self.runtime, %channel, function = %request.function_id, invocation = %request.invocation_id, "dispatcher.invoke");
		slot.channel
			.send(request)
			.await
			.map_err(|source| DispatchError::Invocation { channel, source })
	}

	fn select(&self) -> Option<Arc<ChannelSlot>> {
		let channels = self.channels.read();
		let healthy: Vec<&Arc<ChannelSlot>> = channels.iter().filter(|slot| slot.channel.health().is_ready()).collect();
		if healthy.is_empty() {
			return None;
		}
		let loads: Vec<ChannelLoad> = healthy.iter().map(|slot| slot.load()).collect();
		let index = self.selector.select(&loads).min(healthy.len() - 1);
		Some(Arc::clone(healthy[index]))
	}

	/// Asks every channel to drain and waits at most `timeout`.
	///
	/// A startup in progress is waited for (within the same deadline) so the
	/// channels it publishes are drained too; if it outlives the deadline the
	/// report is timed out. Channel shutdowns run on detached tasks; any still
	/// running at the deadline are abandoned and listed in the report. Never
	/// blocks past the deadline and never fails. Call [`Self::terminate`]
	/// afterwards to release the channels unconditionally.
	pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
		let started = Instant::now();
		let deadline = started + timeout;

		let previous = self.state();
		let draining = self.state.send_if_modified(|state| match state {
			DispatcherState::Draining | DispatcherState::Terminated => false,
			_ => {
				*state = DispatcherState::Draining;
				true
			}
		});
		if !draining && previous == DispatcherState::Terminated {
			return ShutdownReport::new(Vec::new(), started.elapsed());
		}

		// `initialize` observes `Draining` and returns once its channels are
		// published; holding the gate orders the snapshot after that.
		let Ok(startup) = tokio::time::timeout_at(deadline, self.init_gate.lock()).await else {
			warn!(runtime = %self.runtime, ?timeout, "dispatcher.shutdown.startup_pending");
			return ShutdownReport {
				completed: false,
				timed_out: true,
				pending: Vec::new(),
				elapsed: started.elapsed(),
			};
		};
		let slots = self.channels.read().clone();
		drop(startup);
		info!(runtime = %self.runtime, channels = slots.len(), ?timeout, "dispatcher.shutdown");

		let handles: Vec<_> = slots
			.into_iter()
			.map(|slot| {
				let channel = Arc::clone(&slot.channel);
				let id = channel.id();
				(id, fnhost_worker::spawn(TaskClass::Shutdown, async move { channel.shutdown().await }))
			})
			.collect();

		let mut pending = Vec::new();
		for (id, mut handle) in handles {
			match tokio::time::timeout_at(deadline, &mut handle).await {
				Ok(Ok(())) => {}
				Ok(Err(join_error)) => warn!(runtime = %self.runtime, channel = %id, %join_error, "dispatcher.shutdown.channel_failed"),
				Err(_) => pending.push(id),
			}
		}

		let elapsed = started.elapsed();
		if pending.is_empty() {
			info!(runtime = %self.runtime, ?elapsed, "dispatcher.shutdown.complete");
		} else {
			let pending_ids: Vec<String> = pending.iter().map(ToString::to_string).collect();
			warn!(runtime = %self.runtime, ?timeout, pending = ?pending_ids, "dispatcher.shutdown.timeout");
		}

		ShutdownReport::new(pending, elapsed)
	}

	/// [`Self::shutdown`] with the configured `shutdown_timeout_ms` budget.
	pub async fn shutdown_default(&self) -> ShutdownReport {
		self.shutdown(self.config.shutdown_timeout()).await
	}

	/// Graceful shutdown, then unconditional termination if the deadline was
	/// missed.
	pub async fn shutdown_graceful_or_terminate(&self, timeout: Duration) -> ShutdownReport {
		let report = self.shutdown(timeout).await;
		if report.timed_out() {
			warn!(runtime = %self.runtime, "graceful shutdown timed out; terminating");
			self.terminate().await;
		}
		report
	}

	/// Forcibly tears down every channel and moves to `Terminated`.
	///
	/// Accepted from any state. Repeated or concurrent calls perform the
	/// teardown once; later callers wait for the first to finish. The teardown
	/// runs on a detached task, so dropping the returned future does not stop
	/// it from reaching `Terminated`.
	pub async fn terminate(&self) {
		let owned = {
			let mut channels = self.channels.write();
			if self.terminating.swap(true, Ordering::AcqRel) {
				None
			} else {
				Some(std::mem::take(&mut *channels))
			}
		};

		let Some(slots) = owned else {
			let mut state = self.state.subscribe();
			let _ = state.wait_for(|state| *state == DispatcherState::Terminated).await;
			return;
		};

		info!(runtime = %self.runtime, channels = slots.len(), "dispatcher.terminate");
		self.errors.clear();
		let channels: Vec<_> = slots.into_iter().map(|slot| Arc::clone(&slot.channel)).collect();
		let state = Arc::clone(&self.state);
		let teardown = fnhost_worker::spawn(TaskClass::Shutdown, async move {
			terminate_all(channels).await;
			state.send_replace(DispatcherState::Terminated);
		});
		if let Err(error) = teardown.await {
			warn!(runtime = %self.runtime, %error, "dispatcher.terminate.failed");
			self.state.send_replace(DispatcherState::Terminated);
		}
	}

	/// Reports a failed worker.
	///
	/// The channel is torn down and counted against the restart budget. While
	/// fewer than [`WorkerConfig::error_threshold`] errors fall inside the
	/// restart window, a replacement channel is started.
	pub async fn handle_worker_error(&self, channel: ChannelId, error: ChannelError) -> RestartOutcome {
		let _gate = self.restart_gate.lock().await;
		if self.terminating.load(Ordering::Acquire) || matches!(self.state(), DispatcherState::Draining | DispatcherState::Terminated) {
			return RestartOutcome::NotRunning;
		}

		let removed = {
			let mut channels = self.channels.write();
			channels
				.iter()
				.position(|slot| slot.channel.id() == channel)
				.map(|index| channels.remove(index))
		};
		let Some(slot) = removed else {
			return RestartOutcome::UnknownChannel;
		};

		warn!(runtime = %self.runtime, %channel, %error, "dispatcher.worker_error");
		self.errors.add_event(WorkerErrorRecord {
			channel,
			message: error.to_string(),
		});
		slot.channel.terminate().await;

		let errors = self.errors.count();
		let threshold = self.config.error_threshold();
		if errors >= threshold {
			let recent: Vec<String> = self.errors.events().into_iter().map(|record| format!("{}: {}", record.channel, record.message)).collect();
			error!(runtime = %self.runtime, errors, threshold, ?recent, "dispatcher.restart.budget_exhausted");
			return RestartOutcome::BudgetExhausted { errors };
		}

		let (started, _failures) = self.start_channels(1, self.config.startup_timeout()).await;
		let Some(replacement) = started.first().map(|channel| channel.id()) else {
			return RestartOutcome::ReplacementFailed { replaced: channel };
		};
		if let Err(orphans) = self.publish(started) {
			terminate_all(orphans).await;
			return RestartOutcome::NotRunning;
		}

		info!(runtime = %self.runtime, replaced = %channel, %replacement, errors, "dispatcher.restart");
		RestartOutcome::Restarted { replaced: channel, replacement }
	}

	/// Health and load of every owned channel.
	pub async fn worker_statuses(&self) -> Vec<WorkerStatus> {
		let slots = self.channels.read().clone();
		let mut statuses = Vec::with_capacity(slots.len());
		for slot in slots {
			let load = slot.load();
			statuses.push(WorkerStatus {
				id: load.id,
				health: slot.channel.health(),
				in_flight: load.in_flight,
				dispatched: load.dispatched,
				latency: slot.channel.ping().await,
			});
		}
		statuses
	}
}

impl fmt::Debug for FunctionDispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FunctionDispatcher")
			.field("runtime", &self.runtime)
			.field("state", &self.state())
			.field("channels", &self.channel_count())
			.finish_non_exhaustive()
	}
}

async fn terminate_all(channels: Vec<Arc<dyn WorkerChannel>>) {
	let mut set = WorkerJoinSet::new(TaskClass::Shutdown);
	for channel in channels {
		set.spawn(async move { channel.terminate().await });
	}
	set.join_all().await;
}

#[async_trait]
impl ManagedDispatcher for FunctionDispatcher {
	fn runtime(&self) -> &RuntimeId {
		&self.runtime
	}

	async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
		FunctionDispatcher::shutdown(self, timeout).await
	}

	async fn terminate(&self) {
		FunctionDispatcher::terminate(self).await
	}
}
