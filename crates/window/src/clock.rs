use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Source of monotonic instants.
pub trait Clock: Send + Sync + 'static {
	fn now(&self) -> Instant;
}

/// Process monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
}

/// Clock that only moves when told to.
///
/// Clones share the same offset, so a test can hand one clone to the code
/// under test and advance the other.
#[derive(Debug, Clone)]
pub struct ManualClock {
	base: Instant,
	offset_nanos: Arc<AtomicU64>,
}

impl Default for ManualClock {
	fn default() -> Self {
		Self::new()
	}
}

impl ManualClock {
	pub fn new() -> Self {
		Self {
			base: Instant::now(),
			offset_nanos: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Moves the clock forward by `by`.
	pub fn advance(&self, by: Duration) {
		let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
		self.offset_nanos.fetch_add(nanos, Ordering::AcqRel);
	}

	/// Total time advanced since construction.
	pub fn elapsed(&self) -> Duration {
		Duration::from_nanos(self.offset_nanos.load(Ordering::Acquire))
	}
}

impl Clock for ManualClock {
	fn now(&self) -> Instant {
		self.base + self.elapsed()
	}
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
	fn now(&self) -> Instant {
		(**self).now()
	}
}
