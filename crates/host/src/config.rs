//! Host configuration, loaded from TOML.
//!
//! ```toml
//! script_root = "site/wwwroot"
//! shutdown_timeout_ms = 20000
//!
//! [workers.node]
//! process_count = 2
//! balancing = "least_loaded"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fnhost_dispatch::WorkerConfig;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{HostError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
	/// Directory holding function folders and `proxies.json`.
	pub script_root: PathBuf,
	/// Directory holding runtime assembly manifests; the script root when unset.
	pub assembly_dir: Option<PathBuf>,
	/// Budget for the graceful stop of every dispatcher together.
	pub shutdown_timeout_ms: u64,
	/// Worker settings keyed by runtime identifier, in declaration order.
	pub workers: IndexMap<String, WorkerConfig>,
}

impl Default for HostConfig {
	fn default() -> Self {
		Self {
			script_root: PathBuf::from("."),
			assembly_dir: None,
			shutdown_timeout_ms: 20_000,
			workers: IndexMap::new(),
		}
	}
}

impl HostConfig {
	/// Reads and parses `path`. Relative directories are resolved against the
	/// directory containing the file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		let text = std::fs::read_to_string(path).map_err(|error| HostError::ConfigIo {
			path: path.to_path_buf(),
			error,
		})?;
		let mut config = Self::parse(&text, path)?;
		if let Some(base) = path.parent() {
			config.script_root = base.join(&config.script_root);
			config.assembly_dir = config.assembly_dir.map(|dir| base.join(dir));
		}
		Ok(config)
	}

	/// Parses TOML text. `origin` is only used in error messages.
	pub fn parse(text: &str, origin: &Path) -> Result<Self> {
		toml::from_str(text).map_err(|error| HostError::ConfigParse {
			path: origin.to_path_buf(),
			error,
		})
	}

	pub fn shutdown_timeout(&self) -> Duration {
		Duration::from_millis(self.shutdown_timeout_ms)
	}

	pub fn assembly_dir(&self) -> &Path {
		self.assembly_dir.as_deref().unwrap_or(&self.script_root)
	}
}
