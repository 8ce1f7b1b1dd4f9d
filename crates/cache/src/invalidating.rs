//! Generic cache-with-invalidation.
//!
//! # Concurrency & ordering
//!
//! * Readers are wait-free once the first snapshot exists (`ArcSwap` load).
//! * The first read with nothing published loads synchronously under the
//!   refresh gate; concurrent first readers wait for that one load. A signal
//!   coalesced onto the first load is applied before that read returns.
//! * Recompute holds the refresh gate, so at most one runs per cache.
//!   A caller that finds the gate taken returns [`RefreshOutcome::Coalesced`];
//!   the gate holder re-checks the stale flag after releasing, so the signal
//!   is never lost.
//! * Generations come from one [`GenerationClock`] and are assigned while the
//!   gate is held, so publication order and generation order agree.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arc_swap::ArcSwapOption;
use fnhost_worker::GenerationClock;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::MetadataRefreshError;
use crate::snapshot::Snapshot;

/// Produces the record sequence for a fresh snapshot.
pub trait SnapshotSource: Send + Sync + 'static {
	type Record: Send + Sync + 'static;

	/// Short name used in log fields.
	fn name(&self) -> &str;

	/// Reads the source. `Ok(None)` means no data source exists yet.
	fn load(&self) -> Result<Option<Vec<Self::Record>>, MetadataRefreshError>;
}

/// Result of one [`InvalidatingCache::reset_if_stale`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
	/// Nothing was stale.
	Fresh,
	/// A new snapshot with this generation was published.
	Refreshed { generation: u64 },
	/// Another recompute was in flight and will pick the signal up.
	Coalesced,
	/// The source failed; the previous snapshot is still published.
	Failed,
}

/// Atomically-swapped immutable snapshot, recomputed only on invalidation.
pub struct InvalidatingCache<S: SnapshotSource> {
	source: S,
	current: ArcSwapOption<Snapshot<S::Record>>,
	stale: AtomicBool,
	refresh_gate: Mutex<()>,
	generations: GenerationClock,
	last_error: Mutex<Option<Arc<MetadataRefreshError>>>,
}

impl<S: SnapshotSource> InvalidatingCache<S> {
	pub fn new(source: S) -> Self {
		Self {
			source,
			current: ArcSwapOption::empty(),
			stale: AtomicBool::new(false),
			refresh_gate: Mutex::new(()),
			generations: GenerationClock::new(),
			last_error: Mutex::new(None),
		}
	}

	pub fn source(&self) -> &S {
		&self.source
	}

	/// Returns the latest published snapshot.
	///
	/// Never recomputes, except for the lazy first load when nothing has been
	/// published yet.
	pub fn current(&self) -> Arc<Snapshot<S::Record>> {
		if let Some(snapshot) = self.current.load_full() {
			return snapshot;
		}
		self.first_load()
	}

	/// Marks the published snapshot as no longer reflecting the source.
	pub fn invalidate(&self) {
		self.stale.store(true, Ordering::Release);
	}

	pub fn is_stale(&self) -> bool {
		self.stale.load(Ordering::Acquire)
	}

	/// Error from the most recent failed recompute, cleared by the next success.
	pub fn last_error(&self) -> Option<Arc<MetadataRefreshError>> {
		self.last_error.lock().clone()
	}

	/// Recomputes and republishes if the cache was invalidated.
	pub fn reset_if_stale(&self) -> RefreshOutcome {
		let mut outcome = RefreshOutcome::Fresh;
		loop {
			let Some(guard) = self.refresh_gate.try_lock() else {
				debug!(cache = self.source.name(), "cache.refresh.coalesced");
				return match outcome {
					RefreshOutcome::Fresh => RefreshOutcome::Coalesced,
					done => done,
				};
			};

			while self.stale.swap(false, Ordering::AcqRel) {
				outcome = self.recompute();
			}
			drop(guard);

			// A signal landing between the last swap and the unlock found the
			// gate taken and returned; pick it up here.
			if !self.is_stale() {
				return outcome;
			}
		}
	}

	fn first_load(&self) -> Arc<Snapshot<S::Record>> {
		{
			let _guard = self.refresh_gate.lock();
			if let Some(snapshot) = self.current.load_full() {
				return snapshot;
			}
			self.recompute();
		}

		// Signals that arrived while the first load held the gate were
		// coalesced onto it.
		if self.is_stale() {
			let _ = self.reset_if_stale();
		}
		self.current.load_full().unwrap_or_else(|| Arc::new(Snapshot::failed(0)))
	}

	/// Must be called with the refresh gate held.
	fn recompute(&self) -> RefreshOutcome {
		match self.source.load() {
			Ok(entries) => {
				let generation = self.generations.next();
				let snapshot = match entries {
					Some(entries) => Snapshot::loaded(generation, entries),
					None => Snapshot::empty(generation),
				};
				debug!(
					cache = self.source.name(),
					generation,
					entries = snapshot.len(),
					empty_source = snapshot.is_empty_source(),
					"cache.refresh.published"
				);
				self.current.store(Some(Arc::new(snapshot)));
				*self.last_error.lock() = None;
				RefreshOutcome::Refreshed { generation }
			}
			Err(error) => {
				warn!(cache = self.source.name(), %error, "cache.refresh.failed");
				if self.current.load().is_none() {
					let generation = self.generations.next();
					self.current.store(Some(Arc::new(Snapshot::failed(generation))));
				}
				*self.last_error.lock() = Some(Arc::new(error));
				RefreshOutcome::Failed
			}
		}
	}
}

impl<S: SnapshotSource + std::fmt::Debug> std::fmt::Debug for InvalidatingCache<S> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InvalidatingCache")
			.field("source", &self.source)
			.field("generation", &self.current.load().as_ref().map(|s| s.generation()))
			.field("stale", &self.is_stale())
			.finish_non_exhaustive()
	}
}
