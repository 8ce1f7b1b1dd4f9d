use std::sync::Arc;
use std::thread;

use rstest::rstest;

use super::*;
use crate::ManualClock;

fn manual_window<T>(duration: Duration) -> (TimeWindow<T, ManualClock>, ManualClock) {
	let clock = ManualClock::new();
	(TimeWindow::with_clock(duration, clock.clone()), clock)
}

#[rstest]
#[case::fresh(0, false)]
#[case::three_minutes(3, false)]
#[case::fourteen_minutes(14, false)]
#[case::exactly_at_window(15, false)]
#[case::sixteen_minutes(16, true)]
#[case::twenty_minutes(20, true)]
fn expiry_boundary(#[case] age_minutes: u64, #[case] expired: bool) {
	let window = Duration::from_secs(15 * 60);
	let (tw, clock) = manual_window::<()>(window);
	let event = Event {
		timestamp: clock.now(),
		payload: (),
	};
	clock.advance(Duration::from_secs(age_minutes * 60));

	assert_eq!(event.is_expired(clock.now(), window), expired);
	assert_eq!(tw.is_expired(&event), expired);
}

#[test]
fn one_nanosecond_past_window_is_expired() {
	let window = Duration::from_secs(1);
	let clock = ManualClock::new();
	let event = Event {
		timestamp: clock.now(),
		payload: (),
	};
	clock.advance(window);
	assert!(!event.is_expired(clock.now(), window));
	clock.advance(Duration::from_nanos(1));
	assert!(event.is_expired(clock.now(), window));
}

#[test]
fn returns_live_events_in_insertion_order() {
	let (tw, clock) = manual_window(Duration::from_secs(1));
	for i in 0..5 {
		tw.add_event(i);
		clock.advance(Duration::from_millis(100));
	}
	assert_eq!(tw.events(), vec![0, 1, 2, 3, 4]);

	clock.advance(Duration::from_millis(1000));
	tw.add_event(5);
	assert_eq!(tw.events(), vec![5]);
}

#[test]
fn eviction_is_destructive() {
	let (tw, clock) = manual_window(Duration::from_secs(10));
	tw.add_event("old");
	clock.advance(Duration::from_secs(11));
	tw.add_event("new");

	assert_eq!(tw.count(), 1);
	assert_eq!(tw.events.lock().len(), 1, "expired event must be removed, not filtered");
	assert_eq!(tw.events(), vec!["new"]);
}

#[test]
fn add_never_evicts() {
	let (tw, clock) = manual_window(Duration::from_secs(1));
	tw.add_event(1);
	clock.advance(Duration::from_secs(5));
	tw.add_event(2);
	assert_eq!(tw.events.lock().len(), 2);
}

#[test]
fn partial_expiry_keeps_suffix() {
	let (tw, clock) = manual_window(Duration::from_millis(250));
	for i in 0..10 {
		tw.add_event(i);
		clock.advance(Duration::from_millis(50));
	}
	// now = 500ms; events at 250ms.. (ages <= 250ms) survive
	assert_eq!(tw.events(), vec![5, 6, 7, 8, 9]);
}

#[test]
fn concurrent_producers_lose_nothing() {
	let tw = Arc::new(TimeWindow::new(Duration::from_secs(60)));
	let mut handles = Vec::new();
	for t in 0..4u32 {
		let tw = Arc::clone(&tw);
		handles.push(thread::spawn(move || {
			for i in 0..250u32 {
				tw.add_event(t * 1000 + i);
				if i % 50 == 0 {
					let _ = tw.events();
				}
			}
		}));
	}
	for h in handles {
		h.join().unwrap();
	}

	let events = tw.events();
	assert_eq!(events.len(), 1000);
	for t in 0..4u32 {
		let mine: Vec<_> = events.iter().copied().filter(|e| e / 1000 == t).collect();
		let expected: Vec<_> = (0..250).map(|i| t * 1000 + i).collect();
		assert_eq!(mine, expected, "per-producer order must be preserved");
	}
}

#[test]
fn timestamps_are_non_decreasing() {
	let tw = TimeWindow::new(Duration::from_secs(60));
	for i in 0..100 {
		tw.add_event(i);
	}
	let events = tw.events.lock();
	assert!(events.iter().zip(events.iter().skip(1)).all(|(a, b)| a.timestamp <= b.timestamp));
}

#[test]
fn clear_forgets_live_events() {
	let (tw, _clock) = manual_window(Duration::from_secs(60));
	tw.add_event(1);
	tw.add_event(2);

	tw.clear();
	assert_eq!(tw.count(), 0);

	tw.add_event(3);
	assert_eq!(tw.events(), vec![3]);
}
