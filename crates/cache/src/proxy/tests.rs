use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::*;
use crate::changes::FileChangeKind;

fn write_function(root: &Path, name: &str, script: &str) {
	let dir = root.join(name);
	fs::create_dir_all(&dir).unwrap();
	fs::write(
		dir.join("function.json"),
		format!(r#"{{"scriptFile":"{script}","bindings":[{{"type":"httpTrigger","direction":"in","name":"req"}},{{"type":"http","direction":"out","name":"res"}}]}}"#),
	)
	.unwrap();
}

fn write_proxies(root: &Path) {
	fs::write(
		root.join("proxies.json"),
		r#"{
			"$schema": "http://json.schemastore.org/proxies",
			"proxies": {
				"zeta": { "matchCondition": { "route": "/z", "methods": ["GET"] }, "backendUri": "https://z.example" },
				"alpha": { "matchCondition": { "route": "/a/{rest}" } }
			}
		}"#,
	)
	.unwrap();
}

#[test]
fn missing_root_yields_empty_snapshot() {
	let dir = TempDir::new().unwrap();
	let cache = ProxyMetadataCache::with_file_system(dir.path().join("not-there"));
	let snapshot = cache.current();

	assert!(snapshot.is_empty_source());
	assert!(cache.last_error().is_none());
}

#[test]
fn resolves_functions_then_proxies_in_order() {
	let dir = TempDir::new().unwrap();
	write_function(dir.path(), "Beta", "index.js");
	write_function(dir.path(), "Alpha", "run.py");
	fs::create_dir_all(dir.path().join("node_modules")).unwrap();
	write_proxies(dir.path());

	let cache = ProxyMetadataCache::with_file_system(dir.path());
	let snapshot = cache.current();

	let names: Vec<_> = snapshot.iter().map(MetadataRecord::name).collect();
	assert_eq!(names, vec!["Alpha", "Beta", "zeta", "alpha"]);

	let alpha = snapshot.function("alpha").unwrap();
	assert_eq!(alpha.runtime(), Some("python"));
	assert_eq!(alpha.trigger().map(|b| b.name.as_str()), Some("req"));

	let proxies: Vec<_> = snapshot.proxies().cloned().collect();
	assert_eq!(
		proxies,
		vec![
			ProxyRecord {
				name: "zeta".into(),
				route: "/z".into(),
				methods: vec!["GET".into()],
				backend_uri: Some("https://z.example".into()),
			},
			ProxyRecord {
				name: "alpha".into(),
				route: "/a/{rest}".into(),
				methods: Vec::new(),
				backend_uri: None,
			},
		]
	);
}

#[test]
fn reads_are_stable_without_notifications() {
	let dir = TempDir::new().unwrap();
	write_function(dir.path(), "One", "index.js");
	let cache = ProxyMetadataCache::with_file_system(dir.path());

	let first = cache.current();
	write_function(dir.path(), "Two", "index.js");
	let second = cache.current();

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(second.len(), 1);
}

#[test]
fn function_change_notification_republishes() {
	let dir = TempDir::new().unwrap();
	write_function(dir.path(), "One", "index.js");
	let cache = ProxyMetadataCache::with_file_system(dir.path());
	let before = cache.current();

	for name in ["Two", "Three", "Four"] {
		write_function(dir.path(), name, "index.js");
	}
	cache.on_change(&ChangeEvent::file(dir.path().join("Four").join("function.json"), FileChangeKind::Created));

	let after = cache.current();
	assert!(!Arc::ptr_eq(&before, &after));
	assert_eq!(after.len(), 4);
	assert_eq!(after.functions().count(), 4);
}

#[test]
fn irrelevant_changes_are_ignored() {
	let dir = TempDir::new().unwrap();
	write_function(dir.path(), "One", "index.js");
	let cache = ProxyMetadataCache::with_file_system(dir.path());
	let before = cache.current();

	write_proxies(dir.path());
	cache.on_change(&ChangeEvent::file(dir.path().join("One").join("index.js"), FileChangeKind::Modified));
	cache.on_change(&ChangeEvent::file(dir.path().join("host.json"), FileChangeKind::Modified));
	cache.on_change(&ChangeEvent::feature_flag("ANY"));

	assert!(Arc::ptr_eq(&before, &cache.current()));

	cache.on_change(&ChangeEvent::Resync);
	assert_eq!(cache.current().proxies().count(), 2);
}

#[test]
fn bad_metadata_keeps_previous_snapshot() {
	let dir = TempDir::new().unwrap();
	write_proxies(dir.path());
	let cache = ProxyMetadataCache::with_file_system(dir.path());
	let before = cache.current();
	assert_eq!(before.len(), 2);

	fs::write(dir.path().join("proxies.json"), "{ not json").unwrap();
	cache.on_change(&ChangeEvent::file(dir.path().join("proxies.json"), FileChangeKind::Modified));

	assert!(Arc::ptr_eq(&before, &cache.current()));
	assert!(matches!(cache.last_error().as_deref(), Some(MetadataRefreshError::Parse { .. })));
}

#[test]
fn relative_proxy_route_is_rejected() {
	let dir = TempDir::new().unwrap();
	fs::write(
		dir.path().join("proxies.json"),
		r#"{ "proxies": { "p": { "matchCondition": { "route": "nope" } } } }"#,
	)
	.unwrap();
	let cache = ProxyMetadataCache::with_file_system(dir.path());

	let snapshot = cache.current();
	assert!(snapshot.is_empty());
	assert!(snapshot.is_load_failed());
	assert!(matches!(cache.last_error().as_deref(), Some(MetadataRefreshError::Invalid(_))));
}

struct FixedResolver(usize);

impl MetadataResolver for FixedResolver {
	fn resolve(&self, _root: &Path) -> Result<Option<Vec<MetadataRecord>>> {
		Ok(Some(
			(0..self.0)
				.map(|i| {
					MetadataRecord::Proxy(ProxyRecord {
						name: format!("p{i}"),
						route: format!("/p{i}"),
						methods: Vec::new(),
						backend_uri: None,
					})
				})
				.collect(),
		))
	}
}

#[test]
fn custom_resolver_is_used() {
	let cache = ProxyMetadataCache::new("/unused", Arc::new(FixedResolver(3)));
	let snapshot = cache.current();
	assert_eq!(snapshot.len(), 3);
	assert!(!snapshot.is_empty_source());
}
