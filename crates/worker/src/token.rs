use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic generation clock shared by everything that publishes numbered
/// lifecycles: cache snapshots, worker channel ids.
///
/// Clones share the same counter. The first call to [`GenerationClock::next`]
/// returns 1, so 0 is free to mean "never published".
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
	next: Arc<AtomicU64>,
}

impl GenerationClock {
	/// Creates a new generation clock starting at generation 1.
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the next generation ID.
	pub fn next(&self) -> u64 {
		self.next.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
	}
}
