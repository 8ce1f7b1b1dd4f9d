use std::time::Duration;

use parking_lot::Mutex;
use rstest::rstest;

use super::*;

#[rstest]
#[case::host_json("/site/host.json", ChangeScope::HostConfig)]
#[case::function_json("/site/HttpTrigger/function.json", ChangeScope::FunctionMetadata)]
#[case::proxies_json("/site/proxies.json", ChangeScope::ProxyMetadata)]
#[case::proxies_upper("/site/PROXIES.JSON", ChangeScope::ProxyMetadata)]
#[case::assembly_dll("/site/bin/Shared.dll", ChangeScope::Assembly)]
#[case::assembly_exe("/site/bin/tool.EXE", ChangeScope::Assembly)]
#[case::offline("/site/app_offline.htm", ChangeScope::Offline)]
#[case::script("/site/HttpTrigger/index.js", ChangeScope::Other)]
fn classifies_modified_files(#[case] path: &str, #[case] expected: ChangeScope) {
	let event = ChangeEvent::file(path, FileChangeKind::Modified);
	assert_eq!(event.scope(Path::new("/site")), Some(expected));
}

#[test]
fn deleted_top_level_entry_is_directory_change() {
	let event = ChangeEvent::file("/site/OldFunction", FileChangeKind::Deleted);
	assert_eq!(event.scope(Path::new("/site")), Some(ChangeScope::Directory));

	let nested = ChangeEvent::file("/site/OldFunction/data", FileChangeKind::Deleted);
	assert_eq!(nested.scope(Path::new("/site")), Some(ChangeScope::Other));
}

#[test]
fn non_file_events_have_no_scope() {
	assert_eq!(ChangeEvent::Resync.scope(Path::new("/site")), None);
	assert_eq!(ChangeEvent::feature_flag("X").scope(Path::new("/site")), None);
}

#[derive(Default)]
struct Recorder {
	seen: Mutex<Vec<ChangeEvent>>,
}

impl ChangeSubscriber for Recorder {
	fn name(&self) -> &str {
		"recorder"
	}

	fn on_change(&self, event: &ChangeEvent) {
		self.seen.lock().push(event.clone());
	}
}

async fn wait_for(recorder: &Recorder, count: usize) {
	let waited = tokio::time::timeout(Duration::from_secs(2), async {
		while recorder.seen.lock().len() < count {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await;
	assert!(waited.is_ok(), "subscriber did not receive {count} events");
}

#[tokio::test]
async fn listener_forwards_in_order_and_stops_on_cancel() {
	let bus = ChangeBus::new(16);
	let recorder = Arc::new(Recorder::default());
	let cancel = CancellationToken::new();
	let task = spawn_change_listener(bus.subscribe(), vec![recorder.clone() as Arc<dyn ChangeSubscriber>], cancel.clone());

	bus.publish(ChangeEvent::feature_flag("A"));
	bus.publish(ChangeEvent::file("/site/proxies.json", FileChangeKind::Modified));
	wait_for(&recorder, 2).await;

	assert_eq!(
		*recorder.seen.lock(),
		vec![
			ChangeEvent::feature_flag("A"),
			ChangeEvent::file("/site/proxies.json", FileChangeKind::Modified)
		]
	);

	cancel.cancel();
	tokio::time::timeout(Duration::from_secs(2), task)
		.await
		.expect("listener should stop")
		.unwrap();
}

#[tokio::test]
async fn lagged_receiver_degrades_to_resync() {
	let bus = ChangeBus::new(2);
	let rx = bus.subscribe();
	for i in 0..5 {
		bus.publish(ChangeEvent::feature_flag(format!("F{i}")));
	}

	let recorder = Arc::new(Recorder::default());
	let cancel = CancellationToken::new();
	let _task = spawn_change_listener(rx, vec![recorder.clone() as Arc<dyn ChangeSubscriber>], cancel.clone());
	wait_for(&recorder, 3).await;
	cancel.cancel();

	let seen = recorder.seen.lock().clone();
	assert_eq!(seen[0], ChangeEvent::Resync);
	assert_eq!(&seen[1..], &[ChangeEvent::feature_flag("F3"), ChangeEvent::feature_flag("F4")]);
}

#[tokio::test]
async fn listener_exits_when_bus_is_dropped() {
	let bus = ChangeBus::new(4);
	let rx = bus.subscribe();
	let task = spawn_change_listener(rx, Vec::new(), CancellationToken::new());
	drop(bus);
	tokio::time::timeout(Duration::from_secs(2), task)
		.await
		.expect("listener should stop once the bus closes")
		.unwrap();
}
