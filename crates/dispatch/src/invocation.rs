//! Invocation payloads.
//!
//! Arguments arrive already resolved by the binding layer, as a map from
//! binding name to a [`BindingValue`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Language runtime identifier (`node`, `python`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuntimeId(Arc<str>);

impl RuntimeId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RuntimeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for RuntimeId {
	fn from(value: &str) -> Self {
		Self(Arc::from(value.to_ascii_lowercase()))
	}
}

impl From<String> for RuntimeId {
	fn from(value: String) -> Self {
		Self::from(value.as_str())
	}
}

/// Function name as known to the worker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionId(Arc<str>);

impl FunctionId {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for FunctionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for FunctionId {
	fn from(value: &str) -> Self {
		Self(Arc::from(value))
	}
}

impl From<String> for FunctionId {
	fn from(value: String) -> Self {
		Self(Arc::from(value))
	}
}

/// HTTP trigger payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
	pub method: String,
	pub url: String,
	pub headers: BTreeMap<String, String>,
	pub body: Option<Vec<u8>>,
}

/// A bound argument or output value, tagged by binding kind.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingValue {
	Http(HttpRequest),
	Json(serde_json::Value),
	Bytes(Vec<u8>),
	Text(String),
}

/// One function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
	pub invocation_id: Uuid,
	pub function_id: FunctionId,
	pub inputs: BTreeMap<String, BindingValue>,
}

impl InvocationRequest {
	/// Creates a request with a fresh invocation id and no inputs.
	pub fn new(function_id: impl Into<FunctionId>) -> Self {
		Self {
			invocation_id: Uuid::new_v4(),
			function_id: function_id.into(),
			inputs: BTreeMap::new(),
		}
	}

	/// Adds one bound input.
	#[must_use]
	pub fn input(mut self, name: impl Into<String>, value: BindingValue) -> Self {
		self.inputs.insert(name.into(), value);
		self
	}
}

/// Result of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationOutput {
	pub return_value: Option<BindingValue>,
	pub outputs: BTreeMap<String, BindingValue>,
}
