use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{Clock, SystemClock};

/// One recorded occurrence. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event<T> {
	pub timestamp: Instant,
	pub payload: T,
}

impl<T> Event<T> {
	/// Returns `true` when the event is strictly older than `window` at `now`.
	///
	/// An age exactly equal to `window` is still live.
	pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
		now.saturating_duration_since(self.timestamp) > window
	}
}

/// Bounded-time event buffer.
///
/// Writes never evict. Reads evict every expired event from the front before
/// returning the survivors in insertion order. The timestamp is taken under
/// the same lock as the append, so insertion order and timestamp order agree
/// even with many concurrent producers.
#[derive(Debug)]
pub struct TimeWindow<T, C = SystemClock> {
	duration: Duration,
	clock: C,
	events: Mutex<VecDeque<Event<T>>>,
}

impl<T> TimeWindow<T> {
	/// Creates a window on the process monotonic clock.
	pub fn new(duration: Duration) -> Self {
		Self::with_clock(duration, SystemClock)
	}
}

impl<T, C: Clock> TimeWindow<T, C> {
	pub fn with_clock(duration: Duration, clock: C) -> Self {
		Self {
			duration,
			clock,
			events: Mutex::new(VecDeque::new()),
		}
	}

	pub fn duration(&self) -> Duration {
		self.duration
	}

	/// Appends `item` stamped with the current instant.
	pub fn add_event(&self, item: T) {
		let mut events = self.events.lock();
		let timestamp = self.clock.now();
		events.push_back(Event { timestamp, payload: item });
	}

	/// Whether `event` has aged out of this window right now.
	pub fn is_expired(&self, event: &Event<T>) -> bool {
		event.is_expired(self.clock.now(), self.duration)
	}

	/// Evicts expired events and returns clones of the live payloads, oldest first.
	pub fn events(&self) -> Vec<T>
	where
		T: Clone,
	{
		let mut events = self.events.lock();
		self.evict(&mut events);
		events.iter().map(|e| e.payload.clone()).collect()
	}

	/// Evicts expired events and returns how many remain.
	pub fn count(&self) -> usize {
		let mut events = self.events.lock();
		self.evict(&mut events);
		events.len()
	}

	/// Drops every recorded event.
	pub fn clear(&self) {
		self.events.lock().clear();
	}

	fn evict(&self, events: &mut VecDeque<Event<T>>) {
		let now = self.clock.now();
		while events.front().is_some_and(|e| e.is_expired(now, self.duration)) {
			events.pop_front();
		}
	}
}

#[cfg(test)]
mod tests;
