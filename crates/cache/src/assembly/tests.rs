use std::fs;

use tempfile::TempDir;

use super::*;
use crate::env::MapEnvironment;

fn write_manifests(dir: &Path) {
	fs::write(
		dir.join(STRICT_MANIFEST),
		r#"{"runtimeAssemblies":[
			{"name":"Newtonsoft.Json","resolutionPolicy":"runtimeVersion"},
			{"name":"System.Memory","resolutionPolicy":"minorMatchOrLower"}
		]}"#,
	)
	.unwrap();
	fs::write(
		dir.join(RELAXED_MANIFEST),
		r#"{"runtimeAssemblies":[
			{"name":"Newtonsoft.Json","resolutionPolicy":"private"},
			{"name":"System.Memory","resolutionPolicy":"minorMatchOrLower"},
			{"name":"System.Text.Json","resolutionPolicy":"private"}
		]}"#,
	)
	.unwrap();
}

fn cache_with_env(dir: &Path) -> (AssemblyPolicyCache, Arc<MapEnvironment>) {
	let env = Arc::new(MapEnvironment::new());
	(AssemblyPolicyCache::new(dir, env.clone()), env)
}

#[test]
fn strict_manifest_by_default() {
	let dir = TempDir::new().unwrap();
	write_manifests(dir.path());
	let (cache, _env) = cache_with_env(dir.path());

	assert_eq!(cache.current().len(), 2);
	assert_eq!(cache.policy_for("newtonsoft.json"), Some(ResolutionPolicy::RuntimeVersion));
	assert_eq!(cache.policy_for("Unknown.Assembly"), None);
}

#[test]
fn missing_manifest_is_empty_source() {
	let dir = TempDir::new().unwrap();
	let (cache, _env) = cache_with_env(dir.path());

	let snapshot = cache.current();
	assert!(snapshot.is_empty_source());
	assert!(cache.last_error().is_none());
}

#[test]
fn reset_without_flag_change_keeps_snapshot() {
	let dir = TempDir::new().unwrap();
	write_manifests(dir.path());
	let (cache, _env) = cache_with_env(dir.path());
	let before = cache.current();

	assert_eq!(cache.reset_if_stale(), RefreshOutcome::Fresh);
	cache.on_change(&ChangeEvent::feature_flag(COMPATIBILITY_MODE_FLAG));
	assert!(Arc::ptr_eq(&before, &cache.current()));
}

#[test]
fn flag_flip_switches_manifest() {
	let dir = TempDir::new().unwrap();
	write_manifests(dir.path());
	let (cache, env) = cache_with_env(dir.path());
	let strict = cache.current();

	env.set(COMPATIBILITY_MODE_FLAG, "true");
	cache.on_change(&ChangeEvent::feature_flag(COMPATIBILITY_MODE_FLAG));

	let relaxed = cache.current();
	assert!(!Arc::ptr_eq(&strict, &relaxed));
	assert_eq!(relaxed.len(), 3);
	assert_eq!(cache.policy_for("Newtonsoft.Json"), Some(ResolutionPolicy::Private));

	env.remove(COMPATIBILITY_MODE_FLAG);
	assert!(matches!(cache.reset_if_stale(), RefreshOutcome::Refreshed { .. }));
	assert_eq!(cache.current().len(), 2);
}

#[test]
fn unrelated_flag_is_ignored() {
	let dir = TempDir::new().unwrap();
	write_manifests(dir.path());
	let (cache, env) = cache_with_env(dir.path());
	let before = cache.current();

	env.set(COMPATIBILITY_MODE_FLAG, "1");
	cache.on_change(&ChangeEvent::feature_flag("SOME_OTHER_FLAG"));
	assert!(Arc::ptr_eq(&before, &cache.current()));
}

#[test]
fn malformed_manifest_keeps_previous_policy() {
	let dir = TempDir::new().unwrap();
	write_manifests(dir.path());
	let (cache, env) = cache_with_env(dir.path());
	let before = cache.current();

	fs::write(dir.path().join(RELAXED_MANIFEST), r#"{"runtimeAssemblies":[{"name":"X","resolutionPolicy":"bogus"}]}"#).unwrap();
	env.set(COMPATIBILITY_MODE_FLAG, "1");
	assert_eq!(cache.reset_if_stale(), RefreshOutcome::Failed);
	assert!(Arc::ptr_eq(&before, &cache.current()));
	assert!(cache.last_error().is_some());

	// The flag is still out of sync, so the next signal retries.
	write_manifests(dir.path());
	assert!(matches!(cache.reset_if_stale(), RefreshOutcome::Refreshed { .. }));
	assert_eq!(cache.current().len(), 3);
}
