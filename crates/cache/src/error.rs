//! Error types for snapshot recomputation.

use std::path::PathBuf;

use thiserror::Error;

/// A recompute failed. The previously published snapshot stays authoritative.
#[derive(Debug, Error)]
pub enum MetadataRefreshError {
	/// A metadata file or directory could not be read.
	#[error("I/O error reading {path}: {error}")]
	Io {
		path: PathBuf,
		#[source]
		error: std::io::Error,
	},

	/// A metadata file is not valid JSON for its schema.
	#[error("failed to parse {path}: {error}")]
	Parse {
		path: PathBuf,
		#[source]
		error: serde_json::Error,
	},

	/// The data parsed but violates a structural rule.
	#[error("invalid metadata: {0}")]
	Invalid(String),
}

impl MetadataRefreshError {
	pub(crate) fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
		Self::Io { path: path.into(), error }
	}

	pub(crate) fn parse(path: impl Into<PathBuf>, error: serde_json::Error) -> Self {
		Self::Parse { path: path.into(), error }
	}
}

/// Result type for snapshot sources.
pub type Result<T> = std::result::Result<T, MetadataRefreshError>;
