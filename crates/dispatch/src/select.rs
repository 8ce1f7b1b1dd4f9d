//! Channel selection policies.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::channel::ChannelId;
use crate::config::Balancing;

/// Load snapshot of one healthy channel, as seen by a selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLoad {
	pub id: ChannelId,
	pub in_flight: usize,
	pub dispatched: u64,
}

/// Picks a channel for the next invocation.
///
/// `candidates` is never empty and lists only healthy channels, in the order
/// they were started. Returns an index into `candidates`.
pub trait ChannelSelector: Send + Sync {
	fn select(&self, candidates: &[ChannelLoad]) -> usize;
}

/// Cycles through candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
	next: AtomicUsize,
}

impl ChannelSelector for RoundRobin {
	fn select(&self, candidates: &[ChannelLoad]) -> usize {
		self.next.fetch_add(1, Ordering::Relaxed) % candidates.len().max(1)
	}
}

/// Picks the candidate with the fewest in-flight invocations; ties go to the
/// one that has dispatched the least.
#[derive(Debug, Default)]
pub struct LeastLoaded;

impl ChannelSelector for LeastLoaded {
	fn select(&self, candidates: &[ChannelLoad]) -> usize {
		candidates
			.iter()
			.enumerate()
			.min_by_key(|(_, load)| (load.in_flight, load.dispatched))
			.map_or(0, |(index, _)| index)
	}
}

pub(crate) fn for_balancing(balancing: Balancing) -> Box<dyn ChannelSelector> {
	match balancing {
		Balancing::RoundRobin => Box::new(RoundRobin::default()),
		Balancing::LeastLoaded => Box::new(LeastLoaded),
	}
}
