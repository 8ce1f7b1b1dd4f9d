//! Function dispatch over out-of-process language workers.
//!
//! A [`FunctionDispatcher`] owns the [`WorkerChannel`]s of one language
//! runtime and routes invocations to a healthy one. A
//! [`DispatcherCoordinator`] owns every dispatcher in the host and drives them
//! through host shutdown, either gracefully under a time budget or by forced
//! termination.
//!
//! The RPC transport behind a channel is not modelled here; channels are
//! produced by a [`ChannelFactory`] supplied by the host. [`LocalChannel`] is
//! an in-process implementation used by the binary and by tests.

mod channel;
mod config;
mod coordinator;
mod dispatcher;
mod error;
mod invocation;
mod select;

pub use channel::local::{LocalChannel, LocalChannelFactory, LocalHandler, echo_handler};
pub use channel::{ChannelFactory, ChannelHealth, ChannelId, WorkerChannel};
pub use config::{Balancing, WorkerConfig};
pub use coordinator::{DispatcherCoordinator, ManagedDispatcher, StopReport};
pub use dispatcher::{DispatcherState, FunctionDispatcher, RestartOutcome, ShutdownReport, WorkerStatus};
pub use error::{ChannelError, DispatchError, Result};
pub use invocation::{BindingValue, FunctionId, HttpRequest, InvocationOutput, InvocationRequest, RuntimeId};
pub use select::{ChannelLoad, ChannelSelector, LeastLoaded, RoundRobin};
