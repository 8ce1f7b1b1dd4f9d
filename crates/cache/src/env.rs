//! Injected access to environment settings.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Read-only view of host settings and feature flags.
///
/// Components take an `Arc<dyn Environment>` at construction instead of
/// reading the process environment, so tests can flip flags without touching
/// global state.
pub trait Environment: Send + Sync + 'static {
	fn var(&self, name: &str) -> Option<String>;

	/// Interprets `name` as a boolean flag. `1` and `true` (any case) are set;
	/// anything else, including absence, is unset.
	fn flag(&self, name: &str) -> bool {
		self.var(name)
			.is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
	}
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
	#[allow(clippy::disallowed_methods)]
	fn var(&self, name: &str) -> Option<String> {
		std::env::var(name).ok()
	}
}

/// In-memory environment.
#[derive(Debug, Default)]
pub struct MapEnvironment {
	vars: RwLock<HashMap<String, String>>,
}

impl MapEnvironment {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
		self.vars.write().insert(name.into(), value.into());
	}

	pub fn remove(&self, name: &str) {
		self.vars.write().remove(name);
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnvironment {
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		Self {
			vars: RwLock::new(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect()),
		}
	}
}

impl Environment for MapEnvironment {
	fn var(&self, name: &str) -> Option<String> {
		self.vars.read().get(name).cloned()
	}
}
