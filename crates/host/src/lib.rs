//! Serverless function host.
//!
//! [`ScriptHost`] wires the pieces together: one
//! [`FunctionDispatcher`](fnhost_dispatch::FunctionDispatcher) per configured
//! language runtime, the function/proxy metadata cache, the assembly policy
//! cache, and the change bus that keeps the caches current.

mod config;
mod error;
mod host;

pub use config::HostConfig;
pub use error::{HostError, Result};
pub use host::ScriptHost;
