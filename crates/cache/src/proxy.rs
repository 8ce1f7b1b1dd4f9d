//! Function and proxy metadata cache.
//!
//! The snapshot holds one [`MetadataRecord::Function`] per function directory
//! (`<root>/<name>/function.json`, directories in name order) followed by one
//! [`MetadataRecord::Proxy`] per entry of `<root>/proxies.json`, in
//! declaration order. A missing root publishes the empty snapshot.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::changes::{ChangeEvent, ChangeScope, ChangeSubscriber, FUNCTION_METADATA_FILE, PROXY_METADATA_FILE};
use crate::error::{MetadataRefreshError, Result};
use crate::invalidating::{InvalidatingCache, RefreshOutcome, SnapshotSource};
use crate::snapshot::Snapshot;

/// One binding declared in `function.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BindingRecord {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub direction: Option<String>,
	pub name: String,
}

/// A function definition resolved from its directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRecord {
	pub name: String,
	pub script_file: Option<String>,
	pub entry_point: Option<String>,
	pub bindings: Vec<BindingRecord>,
	pub disabled: bool,
}

impl FunctionRecord {
	/// Language runtime implied by the script file extension.
	pub fn runtime(&self) -> Option<&'static str> {
		let ext = Path::new(self.script_file.as_deref()?).extension()?.to_str()?;
		match ext.to_ascii_lowercase().as_str() {
			"js" | "mjs" | "cjs" | "ts" => Some("node"),
			"py" => Some("python"),
			"ps1" | "psm1" => Some("powershell"),
			"jar" => Some("java"),
			"dll" => Some("dotnet-isolated"),
			_ => None,
		}
	}

	/// The binding marked as the trigger, by the `*Trigger` type convention.
	pub fn trigger(&self) -> Option<&BindingRecord> {
		self.bindings.iter().find(|b| b.kind.ends_with("Trigger"))
	}
}

/// A proxy route resolved from `proxies.json`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRecord {
	pub name: String,
	pub route: String,
	pub methods: Vec<String>,
	pub backend_uri: Option<String>,
}

/// One entry of a metadata snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataRecord {
	Function(FunctionRecord),
	Proxy(ProxyRecord),
}

impl MetadataRecord {
	pub fn name(&self) -> &str {
		match self {
			Self::Function(f) => &f.name,
			Self::Proxy(p) => &p.name,
		}
	}
}

impl Snapshot<MetadataRecord> {
	pub fn functions(&self) -> impl Iterator<Item = &FunctionRecord> {
		self.iter().filter_map(|r| match r {
			MetadataRecord::Function(f) => Some(f),
			MetadataRecord::Proxy(_) => None,
		})
	}

	pub fn proxies(&self) -> impl Iterator<Item = &ProxyRecord> {
		self.iter().filter_map(|r| match r {
			MetadataRecord::Proxy(p) => Some(p),
			MetadataRecord::Function(_) => None,
		})
	}

	pub fn function(&self, name: &str) -> Option<&FunctionRecord> {
		self.functions().find(|f| f.name.eq_ignore_ascii_case(name))
	}
}

/// Produces the ordered record sequence for a script root.
pub trait MetadataResolver: Send + Sync + 'static {
	/// `Ok(None)` when the root does not exist yet.
	fn resolve(&self, root: &Path) -> Result<Option<Vec<MetadataRecord>>>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionJson {
	#[serde(default)]
	script_file: Option<String>,
	#[serde(default)]
	entry_point: Option<String>,
	#[serde(default)]
	bindings: Vec<BindingRecord>,
	#[serde(default)]
	disabled: bool,
}

#[derive(Deserialize)]
struct ProxiesJson {
	#[serde(default)]
	proxies: IndexMap<String, ProxyJson>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyJson {
	match_condition: MatchConditionJson,
	#[serde(default)]
	backend_uri: Option<String>,
}

#[derive(Deserialize)]
struct MatchConditionJson {
	route: String,
	#[serde(default)]
	methods: Vec<String>,
}

/// Reads `function.json` files and `proxies.json` from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemResolver;

impl FileSystemResolver {
	fn functions(root: &Path) -> Result<Vec<MetadataRecord>> {
		let entries = std::fs::read_dir(root).map_err(|e| MetadataRefreshError::io(root, e))?;
		let mut dirs = Vec::new();
		for entry in entries {
			let entry = entry.map_err(|e| MetadataRefreshError::io(root, e))?;
			if entry.file_type().map_err(|e| MetadataRefreshError::io(entry.path(), e))?.is_dir() {
				dirs.push(entry.path());
			}
		}
		dirs.sort();

		let mut records = Vec::with_capacity(dirs.len());
		for dir in dirs {
			let path = dir.join(FUNCTION_METADATA_FILE);
			let Some(text) = read_optional(&path)? else {
				continue;
			};
			let json: FunctionJson = serde_json::from_str(&text).map_err(|e| MetadataRefreshError::parse(&path, e))?;
			let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
			records.push(MetadataRecord::Function(FunctionRecord {
				name,
				script_file: json.script_file,
				entry_point: json.entry_point,
				bindings: json.bindings,
				disabled: json.disabled,
			}));
		}
		Ok(records)
	}

	fn proxies(root: &Path) -> Result<Vec<MetadataRecord>> {
		let path = root.join(PROXY_METADATA_FILE);
		let Some(text) = read_optional(&path)? else {
			return Ok(Vec::new());
		};
		let json: ProxiesJson = serde_json::from_str(&text).map_err(|e| MetadataRefreshError::parse(&path, e))?;
		json.proxies
			.into_iter()
			.map(|(name, proxy)| {
				if !proxy.match_condition.route.starts_with('/') {
					return Err(MetadataRefreshError::Invalid(format!("proxy '{name}' route must start with '/'")));
				}
				Ok(MetadataRecord::Proxy(ProxyRecord {
					name,
					route: proxy.match_condition.route,
					methods: proxy.match_condition.methods,
					backend_uri: proxy.backend_uri,
				}))
			})
			.collect()
	}
}

fn read_optional(path: &Path) -> Result<Option<String>> {
	match std::fs::read_to_string(path) {
		Ok(text) => Ok(Some(text)),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(MetadataRefreshError::io(path, e)),
	}
}

impl MetadataResolver for FileSystemResolver {
	fn resolve(&self, root: &Path) -> Result<Option<Vec<MetadataRecord>>> {
		if !root.is_dir() {
			return Ok(None);
		}
		let mut records = Self::functions(root)?;
		records.extend(Self::proxies(root)?);
		Ok(Some(records))
	}
}

/// [`SnapshotSource`] binding a resolver to a script root.
pub struct MetadataSource {
	root: PathBuf,
	resolver: Arc<dyn MetadataResolver>,
}

impl std::fmt::Debug for MetadataSource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("MetadataSource").field("root", &self.root).finish_non_exhaustive()
	}
}

impl SnapshotSource for MetadataSource {
	type Record = MetadataRecord;

	fn name(&self) -> &str {
		"proxy_metadata"
	}

	fn load(&self) -> Result<Option<Vec<MetadataRecord>>> {
		self.resolver.resolve(&self.root)
	}
}

/// Function/proxy metadata, refreshed on file-change notifications.
#[derive(Debug)]
pub struct ProxyMetadataCache {
	inner: InvalidatingCache<MetadataSource>,
}

impl ProxyMetadataCache {
	pub fn new(root: impl Into<PathBuf>, resolver: Arc<dyn MetadataResolver>) -> Self {
		Self {
			inner: InvalidatingCache::new(MetadataSource { root: root.into(), resolver }),
		}
	}

	/// Cache over the on-disk layout under `root`.
	pub fn with_file_system(root: impl Into<PathBuf>) -> Self {
		Self::new(root, Arc::new(FileSystemResolver))
	}

	pub fn root(&self) -> &Path {
		&self.inner.source().root
	}

	pub fn current(&self) -> Arc<Snapshot<MetadataRecord>> {
		self.inner.current()
	}

	pub fn last_error(&self) -> Option<Arc<MetadataRefreshError>> {
		self.inner.last_error()
	}

	fn affects_metadata(&self, event: &ChangeEvent) -> bool {
		match event {
			ChangeEvent::Resync => true,
			ChangeEvent::FeatureFlag { .. } => false,
			ChangeEvent::File { .. } => matches!(
				event.scope(self.root()),
				Some(ChangeScope::FunctionMetadata | ChangeScope::ProxyMetadata | ChangeScope::Directory)
			),
		}
	}

	fn refresh(&self) -> RefreshOutcome {
		self.inner.invalidate();
		self.inner.reset_if_stale()
	}
}

impl ChangeSubscriber for ProxyMetadataCache {
	fn name(&self) -> &str {
		"proxy_metadata"
	}

	fn on_change(&self, event: &ChangeEvent) {
		if !self.affects_metadata(event) {
			return;
		}
		let outcome = self.refresh();
		debug!(?outcome, ?event, "proxy_metadata.change");
	}
}

#[cfg(test)]
mod tests;
