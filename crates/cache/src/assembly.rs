//! Runtime assembly resolution policy.
//!
//! The policy manifest lives next to the host binaries. Which manifest applies
//! depends on the [`COMPATIBILITY_MODE_FLAG`] setting: the relaxed manifest
//! when the flag is set, the strict one otherwise. The cache remembers which
//! flag value its snapshot was built from and only recomputes when the
//! environment disagrees.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::changes::{ChangeEvent, ChangeSubscriber};
use crate::env::Environment;
use crate::error::{MetadataRefreshError, Result};
use crate::invalidating::{InvalidatingCache, RefreshOutcome, SnapshotSource};
use crate::snapshot::Snapshot;

/// Environment flag selecting the relaxed assembly manifest.
pub const COMPATIBILITY_MODE_FLAG: &str = "FUNCTIONS_V2_COMPATIBILITY_MODE";

const STRICT_MANIFEST: &str = "runtimeassemblies.json";
const RELAXED_MANIFEST: &str = "runtimeassemblies-relaxed.json";

/// How a function's reference to a runtime assembly is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionPolicy {
	/// Always use the host's copy.
	RuntimeVersion,
	/// Use the host's copy when the requested minor version is not newer.
	MinorMatchOrLower,
	/// Let the function load its own copy.
	Private,
}

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeAssembly {
	pub name: String,
	pub resolution_policy: ResolutionPolicy,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
	runtime_assemblies: Vec<RuntimeAssembly>,
}

/// Reads the manifest selected by the current compatibility flag.
pub struct AssemblyPolicySource {
	dir: PathBuf,
	env: Arc<dyn Environment>,
	built_with: Mutex<Option<bool>>,
}

impl std::fmt::Debug for AssemblyPolicySource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AssemblyPolicySource")
			.field("dir", &self.dir)
			.field("built_with", &*self.built_with.lock())
			.finish_non_exhaustive()
	}
}

impl AssemblyPolicySource {
	fn relaxed(&self) -> bool {
		self.env.flag(COMPATIBILITY_MODE_FLAG)
	}

	/// `true` when the environment no longer matches the published snapshot.
	fn flag_changed(&self) -> bool {
		*self.built_with.lock() != Some(self.relaxed())
	}

	fn manifest_path(&self, relaxed: bool) -> PathBuf {
		self.dir.join(if relaxed { RELAXED_MANIFEST } else { STRICT_MANIFEST })
	}
}

impl SnapshotSource for AssemblyPolicySource {
	type Record = RuntimeAssembly;

	fn name(&self) -> &str {
		"assembly_policy"
	}

	fn load(&self) -> Result<Option<Vec<RuntimeAssembly>>> {
		let relaxed = self.relaxed();
		let path = self.manifest_path(relaxed);
		let text = match std::fs::read_to_string(&path) {
			Ok(text) => Some(text),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
			Err(e) => return Err(MetadataRefreshError::io(&path, e)),
		};

		let entries = match text {
			Some(text) => {
				let manifest: Manifest = serde_json::from_str(&text).map_err(|e| MetadataRefreshError::parse(&path, e))?;
				Some(manifest.runtime_assemblies)
			}
			None => None,
		};
		*self.built_with.lock() = Some(relaxed);
		Ok(entries)
	}
}

/// Assembly resolution policy keyed on the compatibility flag.
#[derive(Debug)]
pub struct AssemblyPolicyCache {
	inner: InvalidatingCache<AssemblyPolicySource>,
}

impl AssemblyPolicyCache {
	/// Cache reading manifests from `dir`, with the flag taken from `env`.
	pub fn new(dir: impl Into<PathBuf>, env: Arc<dyn Environment>) -> Self {
		Self {
			inner: InvalidatingCache::new(AssemblyPolicySource {
				dir: dir.into(),
				env,
				built_with: Mutex::new(None),
			}),
		}
	}

	pub fn dir(&self) -> &Path {
		&self.inner.source().dir
	}

	pub fn current(&self) -> Arc<Snapshot<RuntimeAssembly>> {
		self.inner.current()
	}

	/// Policy for an assembly by simple name; `None` means not a runtime assembly.
	pub fn policy_for(&self, assembly: &str) -> Option<ResolutionPolicy> {
		self.current()
			.iter()
			.find(|a| a.name.eq_ignore_ascii_case(assembly))
			.map(|a| a.resolution_policy)
	}

	pub fn last_error(&self) -> Option<Arc<MetadataRefreshError>> {
		self.inner.last_error()
	}

	/// Recomputes if the compatibility flag differs from the one the current
	/// snapshot was built from. Duplicate calls with no flag change are free.
	pub fn reset_if_stale(&self) -> RefreshOutcome {
		if self.inner.source().flag_changed() {
			info!(relaxed = self.inner.source().relaxed(), "assembly_policy.flag_changed");
			self.inner.invalidate();
		}
		self.inner.reset_if_stale()
	}
}

impl ChangeSubscriber for AssemblyPolicyCache {
	fn name(&self) -> &str {
		"assembly_policy"
	}

	fn on_change(&self, event: &ChangeEvent) {
		let outcome = match event {
			ChangeEvent::FeatureFlag { name } if name == COMPATIBILITY_MODE_FLAG => self.reset_if_stale(),
			ChangeEvent::Resync => {
				self.inner.invalidate();
				self.inner.reset_if_stale()
			}
			_ => return,
		};
		debug!(?outcome, ?event, "assembly_policy.change");
	}
}

#[cfg(test)]
mod tests;
