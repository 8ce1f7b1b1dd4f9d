//! Per-runtime worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Channel selection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Balancing {
	#[default]
	RoundRobin,
	LeastLoaded,
}

/// Configuration for one language runtime's workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
	/// Channels started by `initialize`.
	pub process_count: usize,
	/// Deadline for at least one channel to become ready.
	pub startup_timeout_ms: u64,
	/// Graceful drain budget used when the caller does not supply one.
	pub shutdown_timeout_ms: u64,
	/// Window over which worker errors count against the restart budget.
	pub restart_window_ms: u64,
	/// Errors tolerated inside the window; defaults to three per process.
	pub max_errors: Option<usize>,
	pub balancing: Balancing,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			process_count: 1,
			startup_timeout_ms: 30_000,
			shutdown_timeout_ms: 10_000,
			restart_window_ms: 60_000,
			max_errors: None,
			balancing: Balancing::default(),
		}
	}
}

impl WorkerConfig {
	pub fn startup_timeout(&self) -> Duration {
		Duration::from_millis(self.startup_timeout_ms)
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_millis(self.shutdown_timeout_ms)
	}

	pub fn restart_window(&self) -> Duration {
		Duration::from_millis(self.restart_window_ms)
	}

	/// Number of errors inside the restart window at which restarts stop.
	pub fn error_threshold(&self) -> usize {
		self.max_errors.unwrap_or(3 * self.process_count.max(1))
	}
}
