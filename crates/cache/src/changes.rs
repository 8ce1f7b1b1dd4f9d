//! Change notifications and the listener that fans them out to caches.
//!
//! Delivery is at-least-once: the same change may arrive several times, and a
//! lagged receiver degrades to [`ChangeEvent::Resync`]. Subscribers must treat
//! every event as an idempotent "you may be stale" hint.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fnhost_worker::TaskClass;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) const HOST_METADATA_FILE: &str = "host.json";
pub(crate) const FUNCTION_METADATA_FILE: &str = "function.json";
pub(crate) const PROXY_METADATA_FILE: &str = "proxies.json";
const APP_OFFLINE_FILE: &str = "app_offline.htm";
const ASSEMBLY_EXTENSIONS: &[&str] = &["dll", "exe"];

/// Kind of filesystem change reported by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
	Created,
	Modified,
	Deleted,
	Renamed,
}

/// External signal that derived state may be out of date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
	/// A file or directory under the script root changed.
	File { path: PathBuf, kind: FileChangeKind },
	/// A feature flag or environment setting changed.
	FeatureFlag { name: String },
	/// Notifications may have been dropped; everything should re-check.
	Resync,
}

/// What part of the host a file change concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeScope {
	HostConfig,
	FunctionMetadata,
	ProxyMetadata,
	/// A loaded assembly changed; only a full host restart picks it up.
	Assembly,
	/// The app-offline marker appeared or disappeared.
	Offline,
	/// A function directory was added, removed or renamed.
	Directory,
	Other,
}

impl ChangeEvent {
	pub fn file(path: impl Into<PathBuf>, kind: FileChangeKind) -> Self {
		Self::File { path: path.into(), kind }
	}

	pub fn feature_flag(name: impl Into<String>) -> Self {
		Self::FeatureFlag { name: name.into() }
	}

	/// Classifies a file event relative to `root`. Non-file events have no scope.
	pub fn scope(&self, root: &Path) -> Option<ChangeScope> {
		match self {
			Self::File { path, kind } => Some(classify(root, path, *kind)),
			Self::FeatureFlag { .. } | Self::Resync => None,
		}
	}
}

fn classify(root: &Path, path: &Path, kind: FileChangeKind) -> ChangeScope {
	let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
	let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

	if ASSEMBLY_EXTENSIONS.iter().any(|ext| extension.eq_ignore_ascii_case(ext)) {
		return ChangeScope::Assembly;
	}
	if file_name.eq_ignore_ascii_case(APP_OFFLINE_FILE) {
		return ChangeScope::Offline;
	}
	if file_name.eq_ignore_ascii_case(HOST_METADATA_FILE) {
		return ChangeScope::HostConfig;
	}
	if file_name.eq_ignore_ascii_case(FUNCTION_METADATA_FILE) {
		return ChangeScope::FunctionMetadata;
	}
	if file_name.eq_ignore_ascii_case(PROXY_METADATA_FILE) {
		return ChangeScope::ProxyMetadata;
	}

	let top_level = path.parent() == Some(root);
	if top_level && (matches!(kind, FileChangeKind::Deleted | FileChangeKind::Renamed) || path.is_dir()) {
		return ChangeScope::Directory;
	}
	ChangeScope::Other
}

/// Something that reacts to change notifications.
///
/// `on_change` runs on the blocking pool and may recompute synchronously.
pub trait ChangeSubscriber: Send + Sync + 'static {
	fn name(&self) -> &str;

	fn on_change(&self, event: &ChangeEvent);
}

/// Broadcast bus carrying [`ChangeEvent`]s from watchers to subscribers.
#[derive(Debug, Clone)]
pub struct ChangeBus {
	tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeBus {
	fn default() -> Self {
		Self::new(256)
	}
}

impl ChangeBus {
	/// Creates a bus retaining up to `capacity` undelivered events per receiver.
	pub fn new(capacity: usize) -> Self {
		let (tx, _) = broadcast::channel(capacity.max(1));
		Self { tx }
	}

	/// Publishes an event; returns how many receivers will see it.
	pub fn publish(&self, event: ChangeEvent) -> usize {
		self.tx.send(event).unwrap_or(0)
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
		self.tx.subscribe()
	}
}

/// Spawns the task that forwards bus events to `subscribers` until `cancel`
/// fires or the bus closes.
///
/// Events are handled one at a time, in arrival order. Each event is handed
/// to every subscriber on the blocking pool.
pub fn spawn_change_listener(
	mut rx: broadcast::Receiver<ChangeEvent>,
	subscribers: Vec<Arc<dyn ChangeSubscriber>>,
	cancel: CancellationToken,
) -> JoinHandle<()> {
	let subscribers: Arc<[Arc<dyn ChangeSubscriber>]> = subscribers.into();
	fnhost_worker::spawn(TaskClass::Refresh, async move {
		loop {
			let event = tokio::select! {
				_ = cancel.cancelled() => break,
				recv = rx.recv() => match recv {
					Ok(event) => event,
					Err(RecvError::Lagged(skipped)) => {
						warn!(skipped, "changes.lagged");
						ChangeEvent::Resync
					}
					Err(RecvError::Closed) => break,
				},
			};

			debug!(?event, subscribers = subscribers.len(), "changes.dispatch");
			let subscribers = Arc::clone(&subscribers);
			let handled = fnhost_worker::spawn_blocking(TaskClass::Refresh, move || {
				for subscriber in subscribers.iter() {
					subscriber.on_change(&event);
				}
			})
			.await;
			if let Err(error) = handled {
				warn!(%error, "changes.subscriber_failed");
			}
		}
		debug!("changes.listener.stopped");
	})
}

#[cfg(test)]
mod tests;
