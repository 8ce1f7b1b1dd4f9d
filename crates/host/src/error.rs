use std::path::PathBuf;

use fnhost_dispatch::DispatchError;
use thiserror::Error;

/// Host-level failures.
#[derive(Debug, Error)]
pub enum HostError {
	#[error("failed to read host config {}: {error}", path.display())]
	ConfigIo {
		path: PathBuf,
		#[source]
		error: std::io::Error,
	},

	#[error("invalid host config {}: {error}", path.display())]
	ConfigParse {
		path: PathBuf,
		#[source]
		error: toml::de::Error,
	},

	#[error(transparent)]
	Dispatch(#[from] DispatchError),

	#[error("function '{0}' not found")]
	FunctionNotFound(String),

	#[error("function '{0}' is disabled")]
	FunctionDisabled(String),

	/// The script file does not map to a known language runtime.
	#[error("function '{function}' has no recognised runtime (script file {script_file:?})")]
	UnsupportedRuntime { function: String, script_file: Option<String> },
}

pub type Result<T> = std::result::Result<T, HostError>;
